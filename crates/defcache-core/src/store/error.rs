use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Definition store unavailable at {path}: {reason}")]
    Unavailable { path: String, reason: String },

    #[error("Definition store schema version {found} is not supported (expected {expected})")]
    SchemaMismatch { found: i64, expected: i64 },

    #[error("Failed to write definitions for {table}: {reason}")]
    WriteFailed { table: String, reason: String },

    #[error("Definition {position} of {table} has no integer `hash` field")]
    MissingKey { table: String, position: u64 },

    #[error("Lookup failed: {0}")]
    LookupFailed(#[from] rusqlite::Error),

    #[error("Stored definition is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl StoreError {
    pub(crate) fn write_failed(table: &str, err: impl std::fmt::Display) -> Self {
        StoreError::WriteFailed {
            table: table.to_string(),
            reason: err.to_string(),
        }
    }
}
