//! Default conversion from decoded cell values to a binding's target type.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::ingestion::decode::{DateSystem, serial_to_datetime};
use crate::types::{DataType, Value};

/// Convert `value` to `target`.
///
/// [`Value::Null`] always stays `Null`. Blank text becomes `Null` for every target except
/// [`DataType::Utf8`]. The error is a human-readable reason.
pub fn convert(value: Value, target: DataType) -> Result<Value, String> {
    if value.is_null() || value.data_type() == Some(target) {
        return Ok(value);
    }
    if let Value::Utf8(s) = &value {
        if target != DataType::Utf8 && s.trim().is_empty() {
            return Ok(Value::Null);
        }
    }

    match target {
        DataType::Utf8 => Ok(Value::Utf8(value.to_string())),
        DataType::Int32 => {
            let v = to_i64(&value)?;
            i32::try_from(v)
                .map(Value::Int32)
                .map_err(|_| format!("value {v} out of range for Int32"))
        }
        DataType::Int64 => to_i64(&value).map(Value::Int64),
        DataType::Float64 => to_f64(&value).map(Value::Float64),
        DataType::Bool => to_bool(&value).map(Value::Bool),
        DataType::Date => to_datetime(&value).map(|dt| Value::Date(dt.date())),
        DataType::DateTime => to_datetime(&value).map(Value::DateTime),
    }
}

/// Apply a binding's default literal to an absent cell.
pub(crate) fn with_default(value: Value, default_value: Option<&str>) -> Value {
    match (value, default_value) {
        (Value::Null, Some(literal)) => Value::Utf8(literal.to_string()),
        (v, _) => v,
    }
}

fn to_i64(value: &Value) -> Result<i64, String> {
    match value {
        Value::Int32(v) => Ok(i64::from(*v)),
        Value::Int64(v) => Ok(*v),
        Value::Float64(f) => float_to_i64(*f),
        Value::Utf8(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(v) => Ok(v),
                Err(e) => match s.parse::<f64>() {
                    Ok(f) => float_to_i64(f),
                    Err(_) => Err(e.to_string()),
                },
            }
        }
        other => Err(format!("expected integer (got {})", other.type_name())),
    }
}

/// Narrow a float toward zero.
fn float_to_i64(f: f64) -> Result<i64, String> {
    if !f.is_finite() {
        return Err(format!("expected integer (got {f})"));
    }
    let t = f.trunc();
    if t < i64::MIN as f64 || t >= i64::MAX as f64 {
        return Err(format!("value {f} out of range for Int64"));
    }
    Ok(t as i64)
}

fn to_f64(value: &Value) -> Result<f64, String> {
    match value {
        Value::Int32(v) => Ok(f64::from(*v)),
        Value::Int64(v) => Ok(*v as f64),
        Value::Float64(f) => Ok(*f),
        Value::Utf8(s) => s.trim().parse::<f64>().map_err(|e| e.to_string()),
        other => Err(format!("expected number (got {})", other.type_name())),
    }
}

fn to_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Int32(i) => Ok(*i != 0),
        Value::Int64(i) => Ok(*i != 0),
        Value::Float64(f) => Ok(*f != 0.0),
        Value::Utf8(s) => parse_bool(s),
        other => Err(format!("expected bool (got {})", other.type_name())),
    }
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err("expected bool (true/false/1/0/yes/no)".to_string()),
    }
}

const DATETIME_FORMATS: [&str; 3] =
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"];

fn to_datetime(value: &Value) -> Result<NaiveDateTime, String> {
    match value {
        Value::DateTime(dt) => Ok(*dt),
        Value::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
        Value::Int32(_) | Value::Int64(_) | Value::Float64(_) => {
            let serial = to_f64(value)?;
            serial_to_datetime(serial, DateSystem::V1900)
                .ok_or_else(|| format!("{serial} is not a valid date serial"))
        }
        Value::Utf8(s) => {
            let s = s.trim();
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .map(|d| d.and_time(NaiveTime::MIN))
                })
                .ok_or_else(|| format!("expected ISO date or date-time (got '{s}')"))
        }
        other => Err(format!("expected date (got {})", other.type_name())),
    }
}
