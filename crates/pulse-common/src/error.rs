//! Error types shared by the persistence gateways.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the measurement store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("conflicting record already exists: {0}")]
    Conflict(String),

    /// Any other database failure.
    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Whether this error came from a uniqueness violation. Callers use
    /// this to fall back from create to update when two ingestions race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Error raised by blob storage backends.
#[derive(Debug, Error)]
#[error("blob storage error: {0}")]
pub struct BlobError(pub String);
