//! Cell payload decoding.
//!
//! A worksheet cell carries its payload as text plus a type code (`t` attribute) and a style
//! index (`s` attribute). [`decode_cell`] resolves shared-string indices and tells date-styled
//! numbers from plain numbers.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::types::Value;

use super::shared_strings::SharedStrings;
use super::styles::StyleTable;

/// Cell type code of a worksheet `c` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    /// `s`: index into the shared string table.
    SharedString,
    /// `str`: text result of a formula.
    FormulaString,
    /// `inlineStr`: text stored in the cell itself.
    InlineString,
    /// `b`: `1` or `0`.
    Boolean,
    /// `e`: error marker such as `#DIV/0!`.
    Error,
    /// `n` or no type code.
    Number,
}

impl CellType {
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("s") => CellType::SharedString,
            Some("str") => CellType::FormulaString,
            Some("inlineStr") => CellType::InlineString,
            Some("b") => CellType::Boolean,
            Some("e") => CellType::Error,
            _ => CellType::Number,
        }
    }
}

/// Epoch a workbook counts date serials from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateSystem {
    /// Serial 1 is 1900-01-01, with the fictitious 1900-02-29 at serial 60.
    #[default]
    V1900,
    /// Serial 0 is 1904-01-01.
    V1904,
}

/// Largest serial that is still a valid date (9999-12-31 in the 1900 system) plus one.
const MAX_SERIAL: f64 = 2_958_466.0;

fn epoch_1900() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 31).unwrap_or(NaiveDate::MIN)
}

fn epoch_1904() -> NaiveDate {
    NaiveDate::from_ymd_opt(1904, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Whether `serial` can be turned into a calendar date.
pub fn is_valid_serial(serial: f64) -> bool {
    serial.is_finite() && serial >= 0.0 && serial < MAX_SERIAL
}

/// Calendar date and time of a date serial. `None` when the serial is out of range.
pub fn serial_to_datetime(serial: f64, system: DateSystem) -> Option<NaiveDateTime> {
    if !is_valid_serial(serial) {
        return None;
    }
    let days = serial.trunc() as i64;
    let secs = (serial.fract() * 86_400.0).round() as i64;

    let date = match system {
        // Serial 60 is 1900-02-29, which never existed; it lands on 02-28.
        DateSystem::V1900 if days == 60 => NaiveDate::from_ymd_opt(1900, 2, 28)?,
        DateSystem::V1900 if days < 60 => epoch_1900() + Duration::days(days),
        DateSystem::V1900 => epoch_1900() + Duration::days(days - 1),
        DateSystem::V1904 => epoch_1904() + Duration::days(days),
    };
    // A fraction that rounds up to a full day rolls into the next date.
    let (date, secs) = if secs >= 86_400 {
        (date.succ_opt()?, secs - 86_400)
    } else {
        (date, secs)
    };
    let time = NaiveTime::from_num_seconds_from_midnight_opt(u32::try_from(secs).ok()?, 0)?;
    Some(date.and_time(time))
}

/// Decode one cell payload.
///
/// Never fails: payloads that cannot be interpreted under their type code come back as text.
pub fn decode_cell(
    raw: &str,
    cell_type: CellType,
    style: Option<usize>,
    shared_strings: &SharedStrings,
    styles: &StyleTable,
    date_system: DateSystem,
) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    match cell_type {
        CellType::SharedString => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|idx| shared_strings.get(idx))
            .map(|s| Value::Utf8(s.to_string()))
            .unwrap_or_else(|| Value::Utf8(raw.to_string())),
        CellType::FormulaString | CellType::InlineString => Value::Utf8(raw.to_string()),
        CellType::Boolean => Value::Bool(raw.trim() == "1"),
        CellType::Error => Value::Utf8(format!("ERROR: {raw}")),
        CellType::Number => {
            let Ok(n) = raw.trim().parse::<f64>() else {
                return Value::Utf8(raw.to_string());
            };
            if style.is_some_and(|s| styles.is_date_style(s)) {
                if let Some(dt) = serial_to_datetime(n, date_system) {
                    return Value::DateTime(dt);
                }
            }
            number_value(n)
        }
    }
}

fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Value::Int64(n as i64)
    } else {
        Value::Float64(n)
    }
}

/// 0-based column index of an `A1`-style cell reference.
///
/// Only the leading letters are used; `None` when there are none or the column is absurdly
/// large.
pub fn column_index(reference: &str) -> Option<usize> {
    let mut col: usize = 0;
    let mut letters = 0;
    for b in reference.bytes() {
        if !b.is_ascii_alphabetic() {
            break;
        }
        let digit = usize::from(b.to_ascii_uppercase() - b'A') + 1;
        col = col.checked_mul(26)?.checked_add(digit)?;
        letters += 1;
    }
    if letters == 0 || letters > 3 {
        return None;
    }
    Some(col - 1)
}
