use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid record id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },
}
