//! Worksheet XML to structural events.

use std::collections::VecDeque;
use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::IngestionResult;

use super::decode::CellType;
use super::styles::attr;

/// One structural event of a worksheet's `sheetData`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetEvent {
    RowStart {
        /// 1-based row number from the `r` attribute.
        number: Option<usize>,
    },
    CellStart {
        /// `A1`-style reference from the `r` attribute.
        reference: Option<String>,
        cell_type: CellType,
        style: Option<usize>,
    },
    /// Payload text of the current cell (`v`, or `t` of an inline string).
    Text(String),
    CellEnd,
    RowEnd,
}

/// Pull-based tokenizer over a worksheet part.
pub struct SheetEventReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    pending: VecDeque<SheetEvent>,
    in_value: bool,
    in_inline: bool,
    in_phonetic: bool,
}

impl<R: BufRead> SheetEventReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::with_capacity(1024),
            pending: VecDeque::new(),
            in_value: false,
            in_inline: false,
            in_phonetic: false,
        }
    }

    /// The next event, or `None` at the end of the part.
    pub fn next_event(&mut self) -> IngestionResult<Option<SheetEvent>> {
        loop {
            if let Some(ev) = self.pending.pop_front() {
                return Ok(Some(ev));
            }
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"row" => return Ok(Some(row_start(&e)?)),
                    b"c" => return Ok(Some(cell_start(&e)?)),
                    b"v" => self.in_value = true,
                    b"is" => self.in_inline = true,
                    b"rPh" => self.in_phonetic = true,
                    b"t" if self.in_inline && !self.in_phonetic => self.in_value = true,
                    _ => {}
                },
                Event::Empty(e) => match e.local_name().as_ref() {
                    b"row" => {
                        let start = row_start(&e)?;
                        self.pending.push_back(SheetEvent::RowEnd);
                        return Ok(Some(start));
                    }
                    b"c" => {
                        let start = cell_start(&e)?;
                        self.pending.push_back(SheetEvent::CellEnd);
                        return Ok(Some(start));
                    }
                    _ => {}
                },
                Event::End(e) => match e.local_name().as_ref() {
                    b"row" => return Ok(Some(SheetEvent::RowEnd)),
                    b"c" => return Ok(Some(SheetEvent::CellEnd)),
                    b"v" | b"t" => self.in_value = false,
                    b"is" => self.in_inline = false,
                    b"rPh" => self.in_phonetic = false,
                    _ => {}
                },
                Event::Text(t) if self.in_value => {
                    return Ok(Some(SheetEvent::Text(t.unescape()?.into_owned())));
                }
                Event::CData(t) if self.in_value => {
                    return Ok(Some(SheetEvent::Text(String::from_utf8_lossy(&t).into_owned())));
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }
}

fn row_start(e: &BytesStart<'_>) -> IngestionResult<SheetEvent> {
    Ok(SheetEvent::RowStart {
        number: attr(e, b"r")?.and_then(|v| v.trim().parse().ok()),
    })
}

fn cell_start(e: &BytesStart<'_>) -> IngestionResult<SheetEvent> {
    Ok(SheetEvent::CellStart {
        reference: attr(e, b"r")?,
        cell_type: CellType::from_code(attr(e, b"t")?.as_deref()),
        style: attr(e, b"s")?.and_then(|v| v.trim().parse().ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(xml: &str) -> Vec<SheetEvent> {
        let mut r = SheetEventReader::new(xml.as_bytes());
        let mut out = Vec::new();
        while let Some(ev) = r.next_event().unwrap() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn tokenizes_cells_and_skips_formulas() {
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s" s="2"><v>0</v></c><c r="C1"><f>SUM(1,2)</f><v>3</v></c></row>
            <row r="2"/>
            <row r="3"><c r="B3" t="inlineStr"><is><t>a &amp; b</t><rPh><t>x</t></rPh></is></c><c r="C3"/></row>
        </sheetData></worksheet>"#;
        assert_eq!(
            events(xml),
            vec![
                SheetEvent::RowStart { number: Some(1) },
                SheetEvent::CellStart {
                    reference: Some("A1".to_string()),
                    cell_type: CellType::SharedString,
                    style: Some(2),
                },
                SheetEvent::Text("0".to_string()),
                SheetEvent::CellEnd,
                SheetEvent::CellStart {
                    reference: Some("C1".to_string()),
                    cell_type: CellType::Number,
                    style: None,
                },
                SheetEvent::Text("3".to_string()),
                SheetEvent::CellEnd,
                SheetEvent::RowEnd,
                SheetEvent::RowStart { number: Some(2) },
                SheetEvent::RowEnd,
                SheetEvent::RowStart { number: Some(3) },
                SheetEvent::CellStart {
                    reference: Some("B3".to_string()),
                    cell_type: CellType::InlineString,
                    style: None,
                },
                SheetEvent::Text("a & b".to_string()),
                SheetEvent::CellEnd,
                SheetEvent::CellStart {
                    reference: Some("C3".to_string()),
                    cell_type: CellType::Number,
                    style: None,
                },
                SheetEvent::CellEnd,
                SheetEvent::RowEnd,
            ]
        );
    }
}
