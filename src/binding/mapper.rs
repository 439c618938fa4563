//! Moving values between rows and records.

use std::fmt;
use std::sync::Arc;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{Headers, RawRow, Value};

use super::convert::{convert, with_default};
use super::{Record, TypeBindingSet};

/// Header position of every read binding of `T`, computed once per sheet.
pub struct ColumnProjection<T> {
    set: Arc<TypeBindingSet<T>>,
    positions: Vec<usize>,
}

impl<T: Record> ColumnProjection<T> {
    /// Locate each read binding's column in `headers`.
    ///
    /// Every bound column must be present; extra sheet columns are ignored.
    pub fn new(set: Arc<TypeBindingSet<T>>, headers: &Headers) -> IngestionResult<Self> {
        let mut positions = Vec::with_capacity(set.reads().len());
        for bound in set.reads() {
            let column = &bound.entry().column;
            match headers.position_of(column) {
                Some(idx) => positions.push(idx),
                None => {
                    return Err(IngestionError::HeaderMismatch {
                        column: column.clone(),
                        headers: headers.names().to_vec(),
                    });
                }
            }
        }
        Ok(Self { set, positions })
    }

    pub fn bindings(&self) -> &TypeBindingSet<T> {
        &self.set
    }

    /// Header position of the `i`th read binding.
    pub fn position(&self, i: usize) -> Option<usize> {
        self.positions.get(i).copied()
    }
}

impl<T> fmt::Debug for ColumnProjection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnProjection")
            .field("type_name", &self.set.type_name())
            .field("positions", &self.positions)
            .finish()
    }
}

/// Build one record from one row.
///
/// Any failure is reported as [`IngestionError::Conversion`] naming the row and the record type.
pub fn materialize<T: Record>(
    projection: &ColumnProjection<T>,
    row: &RawRow,
) -> IngestionResult<T> {
    let set = &projection.set;
    let mut record = T::default();
    for (bound, &pos) in set.reads().iter().zip(&projection.positions) {
        let entry = bound.entry();
        let raw = with_default(row.get(pos).clone(), entry.default_value.as_deref());
        let wrap = |source: IngestionError| IngestionError::Conversion {
            row: Some(row.number),
            type_name: set.type_name(),
            source: Box::new(source),
        };

        let value = convert(raw.clone(), entry.target).map_err(|message| {
            wrap(IngestionError::ParseError {
                row: row.number,
                column: entry.column.clone(),
                raw: raw.to_string(),
                message,
            })
        })?;
        bound
            .accessor()
            .write(&mut record, value)
            .map_err(|e| wrap(e.into()))?;
    }
    Ok(record)
}

/// Export records through `T`'s write bindings.
///
/// Returns the column names in write order and one row of values per record.
pub fn records_to_rows<T: Record>(
    records: &[T],
) -> IngestionResult<(Vec<String>, Vec<Vec<Value>>)> {
    let set = super::resolve::<T>()?;
    let headers: Vec<String> = set.write_columns().into_iter().map(str::to_string).collect();

    let mut rows = Vec::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        let mut out = Vec::with_capacity(headers.len());
        for bound in set.writes() {
            let entry = bound.entry();
            let value = bound.accessor().read(record)?;
            let value = convert(value.clone(), entry.target).map_err(|message| {
                IngestionError::ParseError {
                    row: idx + 1,
                    column: entry.column.clone(),
                    raw: value.to_string(),
                    message,
                }
            })?;
            out.push(value);
        }
        rows.push(out);
    }
    Ok((headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{RecordDescriptor, resolve};
    use crate::error::BindingError;
    use crate::types::DataType;

    #[derive(Default, Debug, PartialEq)]
    struct Item {
        sku: String,
        qty: i32,
        price: Option<f64>,
        label: String,
    }

    impl Record for Item {
        fn describe(d: &mut RecordDescriptor<Self>) {
            d.field("sku", |i: &Self| i.sku.clone(), |i: &mut Self, v| i.sku = v);
            d.field("qty", |i: &Self| i.qty, |i: &mut Self, v| i.qty = v);
            d.field("price", |i: &Self| i.price, |i: &mut Self, v| i.price = v);
            d.field("label", |i: &Self| i.label.clone(), |i: &mut Self, v| i.label = v);

            d.read_column("sku", "SKU");
            d.read_column("qty", "Qty").default_value("1");
            d.read_column("price", "Price");
            d.write_column("qty", "Quantity").order(1);
            d.write_column("sku", "SKU").order(0);
            d.write_column("label", "Label").target(DataType::Utf8);
        }
    }

    fn headers() -> Headers {
        Headers::new(["Price", "SKU", "Extra", "Qty"]).unwrap()
    }

    #[test]
    fn projection_follows_header_positions() {
        let p = ColumnProjection::new(resolve::<Item>().unwrap(), &headers()).unwrap();
        assert_eq!(p.position(0), Some(1));
        assert_eq!(p.position(1), Some(3));
        assert_eq!(p.position(2), Some(0));
    }

    #[test]
    fn missing_column_is_a_header_mismatch() {
        let h = Headers::new(["SKU", "Qty"]).unwrap();
        let err = ColumnProjection::new(resolve::<Item>().unwrap(), &h).unwrap_err();
        assert!(matches!(
            err,
            IngestionError::HeaderMismatch { ref column, .. } if column == "Price"
        ));
    }

    #[test]
    fn materialize_converts_and_applies_defaults() {
        let p = ColumnProjection::new(resolve::<Item>().unwrap(), &headers()).unwrap();
        let row = RawRow::new(
            4,
            vec![Value::Utf8("9.5".to_string()), Value::Int64(77), Value::Null, Value::Null],
        );
        let item = materialize(&p, &row).unwrap();
        assert_eq!(
            item,
            Item {
                sku: "77".to_string(),
                qty: 1,
                price: Some(9.5),
                label: String::new(),
            }
        );
    }

    #[test]
    fn conversion_failure_names_row_and_type() {
        let p = ColumnProjection::new(resolve::<Item>().unwrap(), &headers()).unwrap();
        let row = RawRow::new(
            7,
            vec![
                Value::Null,
                Value::Utf8("A".to_string()),
                Value::Null,
                Value::Utf8("many".to_string()),
            ],
        );
        let err = materialize(&p, &row).unwrap_err();
        match err {
            IngestionError::Conversion { row, type_name, source } => {
                assert_eq!(row, Some(7));
                assert!(type_name.ends_with("Item"));
                assert!(matches!(
                    *source,
                    IngestionError::ParseError { ref column, .. } if column == "Qty"
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[derive(Debug, Default)]
    struct Tagged {
        tag: i64,
    }

    impl Record for Tagged {
        fn describe(d: &mut RecordDescriptor<Self>) {
            d.field("tag", |t: &Self| t.tag, |t: &mut Self, v| t.tag = v);
            d.read_column("tag", "Tag").target(DataType::Utf8);
        }
    }

    #[test]
    fn target_incompatible_with_field_is_a_type_mismatch() {
        let h = Headers::new(["Tag"]).unwrap();
        let p = ColumnProjection::new(resolve::<Tagged>().unwrap(), &h).unwrap();
        let err = materialize(&p, &RawRow::new(2, vec![Value::Int64(1)])).unwrap_err();
        match err {
            IngestionError::Conversion { source, .. } => assert!(matches!(
                *source,
                IngestionError::Binding(BindingError::TypeMismatch { found: "Utf8", .. })
            )),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn records_export_in_write_order() {
        let items = vec![Item {
            sku: "A1".to_string(),
            qty: 3,
            price: None,
            label: "x".to_string(),
        }];
        let (headers, rows) = records_to_rows(&items).unwrap();
        assert_eq!(headers, vec!["SKU", "Quantity", "Label"]);
        assert_eq!(
            rows,
            vec![vec![
                Value::Utf8("A1".to_string()),
                Value::Int32(3),
                Value::Utf8("x".to_string())
            ]]
        );
    }
}
