use thiserror::Error;

use crate::types::FieldType;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Error type returned by ingestion and streaming functions.
///
/// This is a single error enum shared by the streaming iterator, the in-memory readers and the
/// binding layer.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The container could not be opened or a part could not be extracted.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A workbook part is not well-formed XML.
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A record type's bindings are unusable (see [`BindingError`]).
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// A row could not be turned into a record.
    ///
    /// Background producer failures are surfaced to the consumer as this variant as well.
    #[error("failed to convert {} into {type_name}: {source}", row_label(.row))]
    Conversion {
        row: Option<usize>,
        type_name: &'static str,
        #[source]
        source: Box<IngestionError>,
    },

    /// Invalid arguments (chunk size, queue capacity, empty source, ...).
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// `next_batch` was called on an exhausted iterator.
    #[error("no more batches available")]
    NoMoreElements,

    /// The workbook does not have the expected structure (missing part, no header row, ...).
    #[error("invalid document: {message}")]
    InvalidDocument { message: String },

    /// A read binding names a column the header row does not contain.
    #[error("missing required column '{column}'. headers={headers:?}")]
    HeaderMismatch { column: String, headers: Vec<String> },

    /// The header row contains the same column name twice.
    #[error("duplicate header '{column}'")]
    DuplicateHeader { column: String },

    /// A cell value could not be converted into the binding's target type.
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },

    /// The background producer panicked.
    #[error("background producer panicked: {message}")]
    ProducerPanicked { message: String },
}

fn row_label(row: &Option<usize>) -> String {
    match row {
        Some(r) => format!("row {r}"),
        None => "stream".to_string(),
    }
}

impl IngestionError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }
}

/// Errors raised while scanning a record type's declared bindings or resolving its accessors.
///
/// These are always raised synchronously, at binding-resolution time, and every variant names
/// the record type it was raised for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("{type_name} declares no read or write column bindings")]
    NoBindingsFound { type_name: &'static str },

    #[error("{type_name} declares no read column bindings and cannot be built from rows")]
    NoReadBindings { type_name: &'static str },

    #[error("{type_name}: empty column name on field '{field}'")]
    EmptyColumnName {
        type_name: &'static str,
        field: String,
    },

    #[error("{type_name}: duplicate column name '{column}' (field '{field}')")]
    DuplicateColumn {
        type_name: &'static str,
        field: String,
        column: String,
    },

    #[error("{type_name}: duplicate write order {order} (field '{field}')")]
    DuplicateOrdinal {
        type_name: &'static str,
        field: String,
        order: u32,
    },

    #[error("{type_name}: field '{field}' has no accessor method and no field storage")]
    UnknownField {
        type_name: &'static str,
        field: String,
    },

    #[error("{type_name}: cannot set immutable field '{field}'. Consider adding a setter method: {setter}()")]
    ImmutableField {
        type_name: &'static str,
        field: String,
        setter: String,
    },

    #[error("{type_name}: cached binding set belongs to another type")]
    CacheSlotMismatch { type_name: &'static str },

    #[error("{type_name}: type mismatch for field '{field}'. Expected: {expected}, but got: {found}. Consider adding a setter method: {setter}()")]
    TypeMismatch {
        type_name: &'static str,
        field: String,
        expected: FieldType,
        found: &'static str,
        setter: String,
    },
}

impl BindingError {
    pub(crate) fn type_mismatch(
        type_name: &'static str,
        field: &str,
        expected: FieldType,
        found: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            type_name,
            field: field.to_string(),
            expected,
            found,
            setter: setter_name(field),
        }
    }
}

/// Conventional setter name for a field.
pub(crate) fn setter_name(field: &str) -> String {
    format!("set_{field}")
}
