use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Table,
    ColumnGroup,
    Index,
    Column,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Table => write!(f, "table"),
            ResourceType::ColumnGroup => write!(f, "column group"),
            ResourceType::Index => write!(f, "index"),
            ResourceType::Column => write!(f, "column"),
        }
    }
}

/// Schema definition mistakes. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("invalid format '{format}': {reason}")]
    InvalidFormat { format: String, reason: String },
    #[error("{resource_type} '{name}' already exists")]
    DuplicateName {
        resource_type: ResourceType,
        name: String,
    },
    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },
    #[error("table '{table}' already holds data; its schema is closed")]
    SchemaClosed { table: String },
    #[error("table '{table}' not found")]
    UnknownTable { table: String },
    #[error("column group '{group}' is not declared by table '{table}'")]
    UndeclaredColumnGroup { table: String, group: String },
    #[error("table '{table}' is incomplete: {reason}")]
    IncompleteTable { table: String, reason: String },
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
    #[error("invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: String },
}

/// Failures packing or unpacking a row against a format descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("field count mismatch: format has {expected} fields, got {actual}")]
    FieldCountMismatch { expected: usize, actual: usize },
    #[error("value too long for field {field}: max {max} bytes, got {actual}")]
    ValueTooLong {
        field: usize,
        max: usize,
        actual: usize,
    },
    #[error("truncated input at field {field}: need {needed} bytes, {remaining} remaining")]
    TruncatedInput {
        field: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("type mismatch at field {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        field: usize,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("value out of range for field {field} ({format})")]
    OutOfRange { field: usize, format: char },
    #[error("invalid value for field {field}: {reason}")]
    InvalidValue { field: usize, reason: String },
    #[error("{remaining} trailing bytes after last field")]
    TrailingBytes { remaining: usize },
}

/// Cursor outcomes. `NotFound` and `NoMoreRecords` are normal control flow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("unknown source '{uri}'")]
    UnknownSource { uri: String },
    #[error("source '{uri}' is read-only")]
    ReadOnlySource { uri: String },
    #[error("not found")]
    NotFound,
    #[error("no more records")]
    NoMoreRecords,
    #[error("cursor key not set")]
    KeyNotSet,
    #[error("cursor value not set")]
    ValueNotSet,
    #[error("cursor is not positioned")]
    NotPositioned,
    #[error("duplicate key in '{uri}'")]
    DuplicateKey { uri: String },
    #[error("cursor is closed")]
    Closed,
}

/// Failures reported by the underlying key-value store, passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("injected write failure at write {write}")]
    InjectedFailure { write: usize },
    #[error("record numbers exhausted for namespace")]
    RecordNumbersExhausted,
    #[error("key too large: {size} bytes (max {max})")]
    KeyTooLarge { size: usize, max: usize },
    #[error("value too large: {size} bytes (max {max})")]
    ValueTooLarge { size: usize, max: usize },
    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidFormat,
    DuplicateName,
    UnknownColumn,
    SchemaClosed,
    UnknownTable,
    UndeclaredColumnGroup,
    IncompleteTable,
    InvalidConfig,
    InvalidIdentifier,
    FieldCountMismatch,
    ValueTooLong,
    TruncatedInput,
    TypeMismatch,
    OutOfRange,
    InvalidValue,
    TrailingBytes,
    UnknownSource,
    ReadOnlySource,
    NotFound,
    NoMoreRecords,
    KeyNotSet,
    ValueNotSet,
    NotPositioned,
    DuplicateKey,
    CursorClosed,
    Store,
    Metadata,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidFormat => "invalid_format",
            ErrorCode::DuplicateName => "duplicate_name",
            ErrorCode::UnknownColumn => "unknown_column",
            ErrorCode::SchemaClosed => "schema_closed",
            ErrorCode::UnknownTable => "unknown_table",
            ErrorCode::UndeclaredColumnGroup => "undeclared_column_group",
            ErrorCode::IncompleteTable => "incomplete_table",
            ErrorCode::InvalidConfig => "invalid_config",
            ErrorCode::InvalidIdentifier => "invalid_identifier",
            ErrorCode::FieldCountMismatch => "field_count_mismatch",
            ErrorCode::ValueTooLong => "value_too_long",
            ErrorCode::TruncatedInput => "truncated_input",
            ErrorCode::TypeMismatch => "type_mismatch",
            ErrorCode::OutOfRange => "out_of_range",
            ErrorCode::InvalidValue => "invalid_value",
            ErrorCode::TrailingBytes => "trailing_bytes",
            ErrorCode::UnknownSource => "unknown_source",
            ErrorCode::ReadOnlySource => "read_only_source",
            ErrorCode::NotFound => "not_found",
            ErrorCode::NoMoreRecords => "no_more_records",
            ErrorCode::KeyNotSet => "key_not_set",
            ErrorCode::ValueNotSet => "value_not_set",
            ErrorCode::NotPositioned => "not_positioned",
            ErrorCode::DuplicateKey => "duplicate_key",
            ErrorCode::CursorClosed => "cursor_closed",
            ErrorCode::Store => "store",
            ErrorCode::Metadata => "metadata",
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Cursor(#[from] CursorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("metadata error: {0}")]
    Metadata(String),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Schema(e) => match e {
                SchemaError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
                SchemaError::DuplicateName { .. } => ErrorCode::DuplicateName,
                SchemaError::UnknownColumn { .. } => ErrorCode::UnknownColumn,
                SchemaError::SchemaClosed { .. } => ErrorCode::SchemaClosed,
                SchemaError::UnknownTable { .. } => ErrorCode::UnknownTable,
                SchemaError::UndeclaredColumnGroup { .. } => ErrorCode::UndeclaredColumnGroup,
                SchemaError::IncompleteTable { .. } => ErrorCode::IncompleteTable,
                SchemaError::InvalidConfig { .. } => ErrorCode::InvalidConfig,
                SchemaError::InvalidIdentifier { .. } => ErrorCode::InvalidIdentifier,
            },
            Error::Encode(e) => match e {
                EncodeError::FieldCountMismatch { .. } => ErrorCode::FieldCountMismatch,
                EncodeError::ValueTooLong { .. } => ErrorCode::ValueTooLong,
                EncodeError::TruncatedInput { .. } => ErrorCode::TruncatedInput,
                EncodeError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
                EncodeError::OutOfRange { .. } => ErrorCode::OutOfRange,
                EncodeError::InvalidValue { .. } => ErrorCode::InvalidValue,
                EncodeError::TrailingBytes { .. } => ErrorCode::TrailingBytes,
            },
            Error::Cursor(e) => match e {
                CursorError::UnknownSource { .. } => ErrorCode::UnknownSource,
                CursorError::ReadOnlySource { .. } => ErrorCode::ReadOnlySource,
                CursorError::NotFound => ErrorCode::NotFound,
                CursorError::NoMoreRecords => ErrorCode::NoMoreRecords,
                CursorError::KeyNotSet => ErrorCode::KeyNotSet,
                CursorError::ValueNotSet => ErrorCode::ValueNotSet,
                CursorError::NotPositioned => ErrorCode::NotPositioned,
                CursorError::DuplicateKey { .. } => ErrorCode::DuplicateKey,
                CursorError::Closed => ErrorCode::CursorClosed,
            },
            Error::Store(_) => ErrorCode::Store,
            Error::Metadata(_) => ErrorCode::Metadata,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Cursor(CursorError::NotFound))
    }

    pub fn is_no_more_records(&self) -> bool {
        matches!(self, Error::Cursor(CursorError::NoMoreRecords))
    }
}
