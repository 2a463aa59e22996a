//! Error types for the ingestion crate.
//!
//! Only fatal failures surface here; recoverable per-member parse errors
//! travel through [`crate::accumulator::ParseFailures`] instead.

use thiserror::Error;
use uuid::Uuid;

/// Errors that abort an ingestion with no measurement written.
#[derive(Error, Debug)]
pub enum IngestionError {
    /// Container, path-safety, size or decryption failure.
    #[error("archive error: {0}")]
    Archive(#[from] archive_reader::ArchiveError),

    /// The file id does not exist in the store.
    #[error("unknown file id: {0}")]
    UnknownFile(Uuid),

    /// Blob fetch or store failure.
    #[error(transparent)]
    Blob(#[from] pulse_common::BlobError),

    /// Database failure during the persistence phase.
    #[error("store error: {0}")]
    Store(#[from] pulse_common::StoreError),

    /// Bad runtime configuration (key material, limits).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
