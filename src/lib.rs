//! `sheet-records` reads `.xlsx` worksheets into plain Rust structs.
//!
//! A record type declares which sheet columns fill which of its fields by implementing
//! [`binding::Record`]. Rows can then be read in one call ([`ingestion::read_records`]) or
//! streamed in bounded batches by a background producer ([`streaming::stream_records`]), which
//! keeps memory flat no matter how large the sheet is.
//!
//! ## Declaring a record
//!
//! ```
//! use sheet_records::binding::{Record, RecordDescriptor};
//! use sheet_records::types::DataType;
//!
//! #[derive(Default)]
//! struct Invoice {
//!     number: String,
//!     amount: f64,
//!     paid: bool,
//!     quantity: Option<i32>,
//! }
//!
//! impl Record for Invoice {
//!     fn describe(d: &mut RecordDescriptor<Self>) {
//!         d.field("number", |i: &Self| i.number.clone(), |i: &mut Self, v| i.number = v);
//!         d.field("amount", |i: &Self| i.amount, |i: &mut Self, v| i.amount = v);
//!         d.field("paid", |i: &Self| i.paid, |i: &mut Self, v| i.paid = v);
//!         d.field("quantity", |i: &Self| i.quantity, |i: &mut Self, v| i.quantity = v);
//!
//!         d.read_column("number", "Invoice #").target(DataType::Utf8);
//!         d.read_column("amount", "Amount");
//!         d.read_column("paid", "Paid").default_value("false");
//!         d.read_column("quantity", "Qty");
//!     }
//! }
//! ```
//!
//! Header cells are matched by exact (trimmed) name. Cell values are converted to each field's
//! type: numbers to text, `"yes"`/`"no"` to booleans, date serials and ISO strings to
//! [`chrono`] dates, and so on.
//!
//! ## Streaming
//!
//! ```no_run
//! # use sheet_records::binding::{Record, RecordDescriptor};
//! # #[derive(Default)]
//! # struct Invoice { amount: f64 }
//! # impl Record for Invoice {
//! #     fn describe(d: &mut RecordDescriptor<Self>) {
//! #         d.field("amount", |i: &Self| i.amount, |i: &mut Self, v| i.amount = v);
//! #         d.read_column("amount", "Amount");
//! #     }
//! # }
//! use sheet_records::streaming::{stream_records_with, StreamOptions};
//!
//! # fn main() -> Result<(), sheet_records::IngestionError> {
//! let opts = StreamOptions {
//!     chunk_size: 5_000,
//!     queue_capacity: 50_000,
//!     ..Default::default()
//! };
//! let mut total = 0.0;
//! let mut stream = stream_records_with::<Invoice>("invoices.xlsx", &opts)?;
//! while stream.has_next()? {
//!     for invoice in stream.next_batch()? {
//!         total += invoice.amount;
//!     }
//! }
//! println!("total={total} ({})", stream.metrics().snapshot());
//! # Ok(())
//! # }
//! ```
//!
//! Records queued before a parse failure are still delivered; the failure follows them as an
//! [`IngestionError::Conversion`].
//!
//! ## Raw rows
//!
//! [`ingestion::decode_all_rows`] returns the header names and the decoded [`types::Value`]s of
//! every row without any record binding.
//!
//! ## Observability
//!
//! Every read entry point with an options struct accepts an [`ingestion::IngestionObserver`].
//! [`ingestion::StdErrObserver`] logs one line per outcome, [`ingestion::FileObserver`] appends
//! JSON lines, and [`ingestion::CompositeObserver`] fans out to several.

pub mod binding;
pub mod error;
pub mod ingestion;
pub mod streaming;
pub mod types;

pub use binding::{Record, RecordDescriptor};
pub use error::{BindingError, IngestionError, IngestionResult};
pub use ingestion::{SheetSelection, SheetSource, decode_all_rows, read_records};
pub use streaming::{ChunkedIterator, StreamOptions, stream_records, stream_records_with};
