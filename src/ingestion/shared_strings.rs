use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::IngestionResult;

/// The workbook's shared string table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedStrings {
    strings: Vec<String>,
}

impl SharedStrings {
    pub fn from_strings(strings: Vec<String>) -> Self {
        Self { strings }
    }

    /// Parse `xl/sharedStrings.xml`.
    ///
    /// Each `si` item is the concatenation of its text runs; phonetic runs (`rPh`) are skipped.
    pub fn parse<R: BufRead>(source: R) -> IngestionResult<Self> {
        let mut reader = Reader::from_reader(source);
        let mut buf = Vec::new();
        let mut strings = Vec::new();

        let mut current: Option<String> = None;
        let mut in_text = false;
        let mut in_phonetic = false;
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"si" => current = Some(String::new()),
                    b"rPh" => in_phonetic = true,
                    b"t" if !in_phonetic => in_text = true,
                    _ => {}
                },
                Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
                Event::End(e) => match e.local_name().as_ref() {
                    b"si" => strings.push(current.take().unwrap_or_default()),
                    b"rPh" => in_phonetic = false,
                    b"t" => in_text = false,
                    _ => {}
                },
                Event::Text(t) if in_text => {
                    if let Some(s) = current.as_mut() {
                        s.push_str(&t.unescape()?);
                    }
                }
                Event::CData(t) if in_text => {
                    if let Some(s) = current.as_mut() {
                        s.push_str(&String::from_utf8_lossy(&t));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(Self { strings })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
