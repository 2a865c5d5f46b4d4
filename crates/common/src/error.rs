use std::io;
use thiserror::Error;

/// Canonical error type shared across all subsystems.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("semantic error: {0}")]
    Semantic(#[from] SemanticError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("plan error: {0}")]
    Planner(String),
    #[error("executor error: {0}")]
    Executor(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias carrying a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Errors produced by semantic analysis before any plan is built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("table '{0}' does not exist")]
    TableNotExists(String),
    #[error("table '{0}' already exists")]
    TableAlreadyExists(String),
    #[error("column '{0}' does not exist")]
    ColumnNotExists(String),
    #[error("duplicate column name '{0}'")]
    DuplicateColumnName(String),
    #[error("column count mismatch: expected {expected}, got {actual}")]
    ColumnCountMismatch { expected: usize, actual: usize },
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("table '{0}' declares more than one primary key")]
    DuplicatePrimaryKey(String),
    #[error("ambiguous column '{0}'")]
    AmbiguousColumn(String),
    #[error("invalid function '{0}'")]
    InvalidFunction(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("table name must not be empty")]
    EmptyTableName,
    #[error("column name must not be empty")]
    EmptyColumnName,
    #[error("invalid data type '{0}'")]
    InvalidDataType(String),
}

/// Errors raised by the page, buffer, and table layers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("table '{0}' not found")]
    TableNotFound(String),
    #[error("page allocation failed: {0}")]
    PageAllocationFailed(String),
    #[error("page {0} is corrupt (checksum mismatch)")]
    PageCorrupt(u32),
    #[error("buffer pool exhausted: every frame is pinned")]
    BufferPoolExhausted,
    #[error("page {0} is not resident in the buffer pool")]
    PageNotResident(u32),
    #[error("page has no room for a {0}-byte record")]
    PageFull(usize),
    #[error("slot {0} is out of range")]
    SlotNotFound(u16),
    #[error("slot {0} is tombstoned")]
    SlotTombstoned(u16),
    #[error("record {0} not found")]
    RecordNotFound(u32),
    #[error("invalid row encoding: {0}")]
    InvalidRowEncoding(String),
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
}

/// Errors raised by the index layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("index '{0}' not found")]
    IndexNotFound(String),
    #[error("index '{0}' already exists")]
    IndexAlreadyExists(String),
    #[error("unique violation on index '{index}' for key {key}")]
    UniqueViolation { index: String, key: String },
}

/// Errors raised while evaluating expressions at execution time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("type mismatch in expression: {0}")]
    TypeMismatchInExpression(String),
}
