use std::path::PathBuf;

use crud_types::TypeError;

/// Errors from record store operations.
///
/// Absence is never an error: a missing record file surfaces as `Ok(None)`
/// from the read paths.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record id cannot name a record file.
    #[error(transparent)]
    InvalidId(#[from] TypeError),

    /// Stored content exists but cannot be decoded into the record type.
    #[error("cannot decode {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// Encoding or format-level decoding failure inside a codec.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A registered type adapter rejected a value.
    #[error("adapter for {type_name} failed: {reason}")]
    Adapter {
        type_name: &'static str,
        reason: String,
    },

    /// The store configuration could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
