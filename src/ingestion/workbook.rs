//! Whole-sheet entry points.
//!
//! These read a sheet to the end before returning. Use [`crate::streaming::stream_records`]
//! when the sheet may not fit in memory.

use std::any::type_name;
use std::fmt;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::binding::{self, ColumnProjection, Record, TypeBindingSet, materialize};
use crate::error::{BindingError, IngestionError, IngestionResult};
use crate::types::{Headers, RawRow};

use super::assembler::{DecodeTables, RowAssembler, RowFlow, RowSink};
use super::events::SheetEventReader;
use super::observability::{
    IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats, ReadMode, report,
};
use super::package::{SheetSelection, SheetSource, WorkbookPackage};
use super::shared_strings::SharedStrings;
use super::styles::StyleTable;

/// An opened workbook with its shared lookup tables loaded.
pub(crate) struct WorkbookReader {
    package: WorkbookPackage,
    shared_strings: SharedStrings,
    styles: StyleTable,
}

impl WorkbookReader {
    pub(crate) fn open(source: &SheetSource) -> IngestionResult<Self> {
        let mut package = WorkbookPackage::open(source)?;
        let shared_strings = package.shared_strings()?;
        let styles = package.styles()?;
        Ok(Self {
            package,
            shared_strings,
            styles,
        })
    }

    pub(crate) fn package(&self) -> &WorkbookPackage {
        &self.package
    }

    /// Feed one sheet into `sink`. Returns the sheet's name.
    pub(crate) fn read_into<S: RowSink>(
        &mut self,
        selection: &SheetSelection,
        sink: &mut S,
    ) -> IngestionResult<String> {
        let entry = self.package.sheet_part(selection)?.clone();
        let tables = DecodeTables {
            shared_strings: &self.shared_strings,
            styles: &self.styles,
            date_system: self.package.date_system(),
        };
        let part = self.package.open_part(&entry.part)?;
        let mut events = SheetEventReader::new(BufReader::new(part));
        RowAssembler::new(tables).run(&mut events, sink)?;
        Ok(entry.name)
    }
}

/// Resolve `T`'s bindings and require at least one read binding.
pub(crate) fn read_bindings<T: Record>() -> IngestionResult<Arc<TypeBindingSet<T>>> {
    let set = binding::resolve::<T>()?;
    if set.reads().is_empty() {
        return Err(BindingError::NoReadBindings {
            type_name: set.type_name(),
        }
        .into());
    }
    Ok(set)
}

/// Turns assembled rows into records and hands them to `emit`.
pub(crate) struct RecordSink<T, F> {
    bindings: Arc<TypeBindingSet<T>>,
    projection: Option<ColumnProjection<T>>,
    emit: F,
}

impl<T, F> RecordSink<T, F>
where
    T: Record,
    F: FnMut(T) -> IngestionResult<RowFlow>,
{
    pub(crate) fn new(bindings: Arc<TypeBindingSet<T>>, emit: F) -> Self {
        Self {
            bindings,
            projection: None,
            emit,
        }
    }
}

impl<T, F> RowSink for RecordSink<T, F>
where
    T: Record,
    F: FnMut(T) -> IngestionResult<RowFlow>,
{
    fn header(&mut self, headers: Headers) -> IngestionResult<()> {
        self.projection = Some(ColumnProjection::new(Arc::clone(&self.bindings), &headers)?);
        Ok(())
    }

    fn row(&mut self, row: RawRow) -> IngestionResult<RowFlow> {
        let projection = self
            .projection
            .as_ref()
            .ok_or_else(|| IngestionError::invalid_document("data row before header row"))?;
        let record = materialize(projection, &row)?;
        (self.emit)(record)
    }
}

/// Header names and data rows of one sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

#[derive(Default)]
struct CollectRows {
    headers: Vec<String>,
    rows: Vec<RawRow>,
}

impl RowSink for CollectRows {
    fn header(&mut self, headers: Headers) -> IngestionResult<()> {
        self.headers = headers.into_names();
        Ok(())
    }

    fn row(&mut self, row: RawRow) -> IngestionResult<RowFlow> {
        self.rows.push(row);
        Ok(RowFlow::Continue)
    }
}

/// Names of all sheets, in workbook order.
pub fn sheet_names(source: impl Into<SheetSource>) -> IngestionResult<Vec<String>> {
    let source = source.into();
    source.validate()?;
    Ok(WorkbookPackage::open(&source)?.sheet_names())
}

/// Decode the first sheet into header names and raw rows.
pub fn decode_all_rows(source: impl Into<SheetSource>) -> IngestionResult<DecodedSheet> {
    decode_sheet(source, &SheetSelection::First)
}

/// Decode one sheet into header names and raw rows.
pub fn decode_sheet(
    source: impl Into<SheetSource>,
    selection: &SheetSelection,
) -> IngestionResult<DecodedSheet> {
    let source = source.into();
    source.validate()?;
    let mut reader = WorkbookReader::open(&source)?;
    let mut sink = CollectRows::default();
    let name = reader.read_into(selection, &mut sink)?;
    Ok(DecodedSheet {
        name,
        headers: sink.headers,
        rows: sink.rows,
    })
}

/// Options for the whole-sheet record readers.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct ReadOptions {
    pub sheet: SheetSelection,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("sheet", &self.sheet)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            sheet: SheetSelection::First,
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

fn read_from<T: Record>(
    reader: &mut WorkbookReader,
    selection: &SheetSelection,
) -> IngestionResult<Vec<T>> {
    let bindings = read_bindings::<T>()?;
    let mut out = Vec::new();
    {
        let mut sink = RecordSink::new(bindings, |record| {
            out.push(record);
            Ok(RowFlow::Continue)
        });
        reader.read_into(selection, &mut sink)?;
    }
    Ok(out)
}

fn read_selected<T: Record>(
    source: &SheetSource,
    selection: &SheetSelection,
) -> IngestionResult<Vec<T>> {
    read_bindings::<T>()?;
    source.validate()?;
    let mut reader = WorkbookReader::open(source)?;
    read_from(&mut reader, selection)
}

/// Read every data row of the first sheet into records.
pub fn read_records<T: Record>(source: impl Into<SheetSource>) -> IngestionResult<Vec<T>> {
    read_records_with(source, &ReadOptions::default())
}

/// Read every data row of the selected sheet into records.
///
/// When an observer is configured, this function reports:
///
/// - `on_success` on success, with row count stats
/// - `on_failure` on failure, with a computed severity
/// - `on_alert` on failure when the computed severity is >= `options.alert_at_or_above`
///
/// ```no_run
/// use std::sync::Arc;
///
/// use sheet_records::binding::{Record, RecordDescriptor};
/// use sheet_records::ingestion::{read_records_with, ReadOptions, SheetSelection, StdErrObserver};
///
/// #[derive(Default)]
/// struct Order {
///     id: i64,
///     total: f64,
/// }
///
/// impl Record for Order {
///     fn describe(d: &mut RecordDescriptor<Self>) {
///         d.field("id", |o: &Self| o.id, |o: &mut Self, v| o.id = v);
///         d.field("total", |o: &Self| o.total, |o: &mut Self, v| o.total = v);
///         d.read_column("id", "Order ID");
///         d.read_column("total", "Total");
///     }
/// }
///
/// # fn main() -> Result<(), sheet_records::IngestionError> {
/// let opts = ReadOptions {
///     sheet: SheetSelection::Named("Orders".to_string()),
///     observer: Some(Arc::new(StdErrObserver)),
///     ..Default::default()
/// };
/// let orders: Vec<Order> = read_records_with("orders.xlsx", &opts)?;
/// println!("orders={}", orders.len());
/// # Ok(())
/// # }
/// ```
pub fn read_records_with<T: Record>(
    source: impl Into<SheetSource>,
    options: &ReadOptions,
) -> IngestionResult<Vec<T>> {
    let source = source.into();
    let started = Instant::now();
    let ctx = IngestionContext {
        source: source.to_string(),
        sheet: options.sheet.to_string(),
        record_type: type_name::<T>(),
        mode: ReadMode::InMemory,
    };

    let result = read_selected::<T>(&source, &options.sheet);

    let outcome = match &result {
        Ok(records) => Ok(IngestionStats {
            rows: records.len(),
            batches: 1,
            elapsed: started.elapsed(),
        }),
        Err(e) => Err(e),
    };
    report(options.observer.as_ref(), options.alert_at_or_above, &ctx, outcome);
    result
}

/// Read the sheet named `name` into records.
pub fn read_sheet<T: Record>(
    source: impl Into<SheetSource>,
    name: &str,
) -> IngestionResult<Vec<T>> {
    read_selected(&source.into(), &SheetSelection::Named(name.to_string()))
}

/// Read several named sheets into records, in the order given.
///
/// Names the workbook does not contain are skipped.
pub fn read_sheets<T: Record>(
    source: impl Into<SheetSource>,
    names: &[&str],
) -> IngestionResult<Vec<(String, Vec<T>)>> {
    let source = source.into();
    read_bindings::<T>()?;
    source.validate()?;
    let mut reader = WorkbookReader::open(&source)?;
    let present = reader.package().sheet_names();

    let mut out = Vec::new();
    for &name in names {
        if !present.iter().any(|p| p == name) {
            continue;
        }
        let records = read_from::<T>(&mut reader, &SheetSelection::Named(name.to_string()))?;
        out.push((name.to_string(), records));
    }
    Ok(out)
}

/// Read every sheet into records, in workbook order.
///
/// Sheets are decoded in parallel, each from its own handle on the source.
pub fn read_all_sheets<T: Record>(
    source: impl Into<SheetSource>,
) -> IngestionResult<Vec<(String, Vec<T>)>> {
    let source = source.into();
    read_bindings::<T>()?;
    source.validate()?;
    let count = WorkbookPackage::open(&source)?.sheets().len();

    (0..count)
        .into_par_iter()
        .map(|i| {
            let mut reader = WorkbookReader::open(&source)?;
            let selection = SheetSelection::Index(i);
            let records = read_from::<T>(&mut reader, &selection)?;
            let name = reader.package().sheet_part(&selection)?.name.clone();
            Ok((name, records))
        })
        .collect()
}
