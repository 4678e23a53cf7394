use rusqlite::ffi;
use thiserror::Error;

/// Main error type for graphsync
///
/// Everything here aborts a run. Per-record problems never surface as a
/// `SyncError`; they become counters and dead-letter entries instead.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Mapping document errors
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Graph store errors that escaped per-record handling
    #[error("Graph store error: {0}")]
    Store(#[from] StoreError),

    /// Document source errors (cursor, export file, connection)
    #[error("Source error: {0}")]
    Source(String),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML decoding errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

/// Classified failure of a single graph store operation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Uniqueness violation: another writer already holds the key.
    #[error("duplicate key: {0}")]
    Duplicate(String),

    /// A match clause found no entity to bind.
    #[error("no entity matched: {0}")]
    Unmatched(String),

    /// The write does not conform to the loaded schema.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(rusqlite::Error),

    /// The blocking task running the operation died.
    #[error("store task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// True when the failure is a benign duplicate-key race.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation
                    && matches!(
                        code.extended_code,
                        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    ) =>
            {
                StoreError::Duplicate(err.to_string())
            }
            _ => StoreError::Backend(err),
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Task(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Store(StoreError::from(err))
    }
}
