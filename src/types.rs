//! Core data model types.
//!
//! Cells decode into [`Value`]s; record fields declare a [`FieldType`] and convert to and from
//! [`Value`] through [`FieldValue`]. A sheet's first non-empty row becomes [`Headers`], every
//! following row a [`RawRow`].

use std::collections::HashMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{IngestionError, IngestionResult};

/// Logical data type of a cell value or record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
    /// Calendar date.
    Date,
    /// Calendar date and wall-clock time (no time zone).
    DateTime,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int32 => "Int32",
            DataType::Int64 => "Int64",
            DataType::Float64 => "Float64",
            DataType::Bool => "Bool",
            DataType::Utf8 => "Utf8",
            DataType::Date => "Date",
            DataType::DateTime => "DateTime",
        };
        f.write_str(name)
    }
}

/// A single decoded cell or field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
    /// Calendar date.
    Date(NaiveDate),
    /// Calendar date and time.
    DateTime(NaiveDateTime),
}

impl Value {
    /// The value's data type, or `None` for [`Value::Null`].
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Int32(_) => Some(DataType::Int32),
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Bool(_) => Some(DataType::Bool),
            Value::Utf8(_) => Some(DataType::Utf8),
            Value::Date(_) => Some(DataType::Date),
            Value::DateTime(_) => Some(DataType::DateTime),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the value's runtime type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::Float64(_) => "Float64",
            Value::Bool(_) => "Bool",
            Value::Utf8(_) => "Utf8",
            Value::Date(_) => "Date",
            Value::DateTime(_) => "DateTime",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Utf8(v) => f.write_str(v),
            Value::Date(v) => write!(f, "{v}"),
            Value::DateTime(v) => write!(f, "{v}"),
        }
    }
}

/// Declared storage type of a record field.
///
/// `nullable` distinguishes `Option<V>` fields (which accept [`Value::Null`]) from plain `V`
/// fields. Both accept the same non-null values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldType {
    pub data_type: DataType,
    pub nullable: bool,
}

impl FieldType {
    pub const fn required(data_type: DataType) -> Self {
        Self {
            data_type,
            nullable: false,
        }
    }

    pub const fn optional(data_type: DataType) -> Self {
        Self {
            data_type,
            nullable: true,
        }
    }

    /// Whether a value of this runtime type can be stored in the field as-is.
    pub fn accepts(&self, value: &Value) -> bool {
        match value.data_type() {
            None => self.nullable,
            Some(dt) => dt == self.data_type,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "Option<{}>", self.data_type)
        } else {
            write!(f, "{}", self.data_type)
        }
    }
}

/// Conversion between a Rust field type and [`Value`].
///
/// Implemented for the primitive field types a record can bind to and for `Option<V>` of each.
pub trait FieldValue: Sized + Send + 'static {
    const FIELD_TYPE: FieldType;

    /// Returns `None` when `value` has an incompatible runtime type.
    fn from_value(value: Value) -> Option<Self>;

    fn into_value(self) -> Value;
}

macro_rules! impl_field_value {
    ($ty:ty, $variant:ident) => {
        impl FieldValue for $ty {
            const FIELD_TYPE: FieldType = FieldType::required(DataType::$variant);

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }
        }
    };
}

impl_field_value!(i32, Int32);
impl_field_value!(i64, Int64);
impl_field_value!(f64, Float64);
impl_field_value!(bool, Bool);
impl_field_value!(String, Utf8);
impl_field_value!(NaiveDate, Date);
impl_field_value!(NaiveDateTime, DateTime);

impl<V: FieldValue> FieldValue for Option<V> {
    const FIELD_TYPE: FieldType = FieldType::optional(V::FIELD_TYPE.data_type);

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => V::from_value(other).map(Some),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Null,
        }
    }
}

/// Longest accepted header name, in characters.
pub const MAX_HEADER_LEN: usize = 255;

/// The validated header row of a sheet.
///
/// Names are trimmed, non-empty and unique. Position `i` is the 0-based column index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headers {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Headers {
    /// Validate raw header cell texts.
    pub fn new<I, S>(names: I) -> IngestionResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Vec::new();
        let mut positions = HashMap::new();
        for (idx, raw) in names.into_iter().enumerate() {
            let name = raw.as_ref().trim();
            if name.is_empty() {
                return Err(IngestionError::invalid_document(format!(
                    "header name cannot be empty (column {})",
                    idx + 1
                )));
            }
            if name.chars().count() > MAX_HEADER_LEN {
                return Err(IngestionError::invalid_document(format!(
                    "header name too long: {} characters. Maximum allowed: {MAX_HEADER_LEN}",
                    name.chars().count()
                )));
            }
            if positions.insert(name.to_string(), idx).is_some() {
                return Err(IngestionError::DuplicateHeader {
                    column: name.to_string(),
                });
            }
            out.push(name.to_string());
        }
        if out.is_empty() {
            return Err(IngestionError::invalid_document("header row is empty"));
        }
        Ok(Self {
            names: out,
            positions,
        })
    }

    /// Header names in column order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns the 0-based column index of a header, if present.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn into_names(self) -> Vec<String> {
        self.names
    }
}

/// One assembled data row: dense, 0-indexed cell values with [`Value::Null`] for absent cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based physical row number in the sheet.
    pub number: usize,
    pub values: Vec<Value>,
}

impl RawRow {
    pub fn new(number: usize, values: Vec<Value>) -> Self {
        Self { number, values }
    }

    /// The value at a column, [`Value::Null`] when the column is beyond the row's width.
    pub fn get(&self, column: usize) -> &Value {
        self.values.get(column).unwrap_or(&Value::Null)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_fields_accept_null_and_plain_fields_do_not() {
        assert!(<Option<i64>>::FIELD_TYPE.accepts(&Value::Null));
        assert!(!i64::FIELD_TYPE.accepts(&Value::Null));
        assert!(i64::FIELD_TYPE.accepts(&Value::Int64(3)));
        assert!(<Option<i64>>::FIELD_TYPE.accepts(&Value::Int64(3)));
        assert!(!i64::FIELD_TYPE.accepts(&Value::Utf8("3".to_string())));
    }

    #[test]
    fn option_from_value_maps_null_to_none() {
        assert_eq!(<Option<String>>::from_value(Value::Null), Some(None));
        assert_eq!(
            <Option<String>>::from_value(Value::Utf8("a".to_string())),
            Some(Some("a".to_string()))
        );
        assert_eq!(<Option<String>>::from_value(Value::Bool(true)), None);
    }

    #[test]
    fn headers_trim_and_index() {
        let h = Headers::new([" ID ", "Name"]).unwrap();
        assert_eq!(h.names(), &["ID".to_string(), "Name".to_string()]);
        assert_eq!(h.position_of("Name"), Some(1));
        assert_eq!(h.position_of("name"), None);
    }

    #[test]
    fn headers_reject_empty_and_duplicate_names() {
        let err = Headers::new(["ID", "  "]).unwrap_err();
        assert!(err.to_string().contains("header name cannot be empty"));

        let err = Headers::new(["ID", "ID"]).unwrap_err();
        assert!(matches!(err, IngestionError::DuplicateHeader { column } if column == "ID"));
    }

    #[test]
    fn raw_row_get_pads_with_null() {
        let row = RawRow::new(2, vec![Value::Int64(1)]);
        assert_eq!(row.get(0), &Value::Int64(1));
        assert_eq!(row.get(5), &Value::Null);
    }
}
