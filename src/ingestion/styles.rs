//! Style index to number format lookup.

use std::collections::HashMap;
use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::IngestionResult;

/// Number format referenced by a cell style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormat {
    pub id: u32,
    /// Format code for custom formats; `None` for built-in ids without a declared code.
    pub code: Option<String>,
}

impl NumberFormat {
    pub fn builtin(id: u32) -> Self {
        Self { id, code: None }
    }

    pub fn custom(id: u32, code: impl Into<String>) -> Self {
        Self {
            id,
            code: Some(code.into()),
        }
    }

    /// Whether numbers in this format are dates or times.
    pub fn is_date(&self) -> bool {
        if is_builtin_date(self.id) {
            return true;
        }
        self.code.as_deref().is_some_and(is_date_format_code)
    }
}

fn is_builtin_date(id: u32) -> bool {
    matches!(id, 14..=22 | 45..=47)
}

/// Heuristic date detection for a custom format code.
///
/// Only the first section (positive numbers) is considered. Quoted literals, escaped
/// characters, fill/padding directives, colour and condition brackets and AM/PM markers are
/// ignored; elapsed-time brackets such as `[h]` count as time.
pub fn is_date_format_code(code: &str) -> bool {
    let mut cleaned = String::with_capacity(code.len());
    let mut elapsed = false;
    let mut chars = code.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            ';' => break,
            '"' => {
                for q in chars.by_ref() {
                    if q == '"' {
                        break;
                    }
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => {
                let mut inner = String::new();
                for b in chars.by_ref() {
                    if b == ']' {
                        break;
                    }
                    inner.push(b);
                }
                let lower = inner.to_ascii_lowercase();
                if !lower.is_empty() && lower.chars().all(|ch| matches!(ch, 'h' | 'm' | 's')) {
                    elapsed = true;
                }
            }
            _ => cleaned.push(c.to_ascii_lowercase()),
        }
    }
    if elapsed {
        return true;
    }
    let cleaned = cleaned.replace("am/pm", "").replace("a/p", "");
    if cleaned.chars().any(|c| matches!(c, '#' | '0' | '?' | '@')) {
        return false;
    }
    cleaned.chars().any(|c| matches!(c, 'y' | 'm' | 'd' | 'h' | 's'))
}

/// Number formats of the workbook's cell styles, indexed by style index.
#[derive(Debug, Clone, Default)]
pub struct StyleTable {
    formats: Vec<NumberFormat>,
}

impl StyleTable {
    pub fn from_formats(formats: Vec<NumberFormat>) -> Self {
        Self { formats }
    }

    /// Parse `xl/styles.xml`.
    pub fn parse<R: BufRead>(source: R) -> IngestionResult<Self> {
        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);
        let mut buf = Vec::new();

        let mut codes: HashMap<u32, String> = HashMap::new();
        let mut xf_ids: Vec<u32> = Vec::new();
        let mut in_cell_xfs = false;
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                    b"numFmt" => {
                        let id = attr(&e, b"numFmtId")?;
                        let code = attr(&e, b"formatCode")?;
                        if let (Some(id), Some(code)) = (id, code) {
                            if let Ok(id) = id.parse::<u32>() {
                                codes.insert(id, code);
                            }
                        }
                    }
                    b"cellXfs" => in_cell_xfs = true,
                    b"xf" if in_cell_xfs => {
                        let id = attr(&e, b"numFmtId")?
                            .and_then(|v| v.parse::<u32>().ok())
                            .unwrap_or(0);
                        xf_ids.push(id);
                    }
                    _ => {}
                },
                Event::End(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        let formats = xf_ids
            .into_iter()
            .map(|id| NumberFormat {
                id,
                code: codes.get(&id).cloned(),
            })
            .collect();
        Ok(Self { formats })
    }

    pub fn number_format(&self, style: usize) -> Option<&NumberFormat> {
        self.formats.get(style)
    }

    pub fn is_date_style(&self, style: usize) -> bool {
        self.number_format(style).is_some_and(NumberFormat::is_date)
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

pub(crate) fn attr(e: &BytesStart<'_>, key: &[u8]) -> IngestionResult<Option<String>> {
    for a in e.attributes().flatten() {
        if a.key.local_name().as_ref() == key {
            return Ok(Some(a.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_date_ids() {
        assert!(NumberFormat::builtin(14).is_date());
        assert!(NumberFormat::builtin(22).is_date());
        assert!(NumberFormat::builtin(46).is_date());
        assert!(!NumberFormat::builtin(0).is_date());
        assert!(!NumberFormat::builtin(2).is_date());
    }

    #[test]
    fn custom_codes() {
        assert!(is_date_format_code("yyyy-mm-dd"));
        assert!(is_date_format_code("dd/mm/yyyy hh:mm"));
        assert!(is_date_format_code("h:mm AM/PM"));
        assert!(is_date_format_code("[h]:mm:ss"));
        assert!(is_date_format_code("[$-409]mmmm d, yyyy"));
        assert!(is_date_format_code("[Red]yyyy;@"));
        assert!(!is_date_format_code("0.00"));
        assert!(!is_date_format_code("#,##0"));
        assert!(!is_date_format_code("\"days\" 0"));
        assert!(!is_date_format_code("@"));
        assert!(!is_date_format_code("General"));
    }

    #[test]
    fn parses_styles_part() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <numFmts count="2">
    <numFmt numFmtId="164" formatCode="yyyy\-mm\-dd"/>
    <numFmt numFmtId="165" formatCode="0.000"/>
  </numFmts>
  <cellStyleXfs count="1"><xf numFmtId="14"/></cellStyleXfs>
  <cellXfs count="4">
    <xf numFmtId="0" fontId="0"/>
    <xf numFmtId="164" applyNumberFormat="1"/>
    <xf numFmtId="165" applyNumberFormat="1"/>
    <xf numFmtId="14" applyNumberFormat="1"><alignment horizontal="left"/></xf>
  </cellXfs>
</styleSheet>"#;
        let t = StyleTable::parse(xml.as_bytes()).unwrap();
        assert_eq!(t.len(), 4);
        assert!(!t.is_date_style(0));
        assert!(t.is_date_style(1));
        assert!(!t.is_date_style(2));
        assert!(t.is_date_style(3));
        assert!(!t.is_date_style(99));
        assert_eq!(t.number_format(1).unwrap().code.as_deref(), Some("yyyy\\-mm\\-dd"));
    }
}
