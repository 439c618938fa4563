//! Workbook decoding and the whole-sheet entry points.
//!
//! The pipeline, leaves first:
//!
//! - [`package`]: opens the container and locates parts
//! - [`shared_strings`] and [`styles`]: lookup tables referenced by cells
//! - [`events`]: worksheet XML to structural events
//! - [`decode`]: cell payloads to [`crate::types::Value`]s
//! - [`assembler`]: events to a header plus dense [`crate::types::RawRow`]s
//! - [`workbook`]: whole-sheet readers built on the above
//!
//! Read outcomes can be reported to an [`IngestionObserver`].

pub mod assembler;
pub mod decode;
pub mod events;
pub mod observability;
pub mod package;
pub mod shared_strings;
pub mod styles;
pub mod workbook;

pub use assembler::{DecodeTables, RowAssembler, RowFlow, RowSink};
pub use decode::{CellType, DateSystem, column_index, decode_cell, serial_to_datetime};
pub use observability::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity,
    IngestionStats, ReadMode, StdErrObserver, severity_for_error,
};
pub use package::{SheetEntry, SheetSelection, SheetSource, WorkbookPackage};
pub use shared_strings::SharedStrings;
pub use styles::{NumberFormat, StyleTable};
pub use workbook::{
    DecodedSheet, ReadOptions, decode_all_rows, decode_sheet, read_all_sheets, read_records,
    read_records_with, read_sheet, read_sheets, sheet_names,
};
