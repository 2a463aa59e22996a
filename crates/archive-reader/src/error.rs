//! Error types for archive extraction and decryption.

use thiserror::Error;

/// Errors from the container and crypto layer. All of these are fatal for
/// the ingestion that hit them.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The blob is not a readable ZIP archive.
    #[error("container error: {0}")]
    Container(String),

    /// A member path would resolve outside the archive root.
    #[error("member path escapes the archive root: {member}")]
    PathTraversal { member: String },

    /// A member exceeds the per-member size ceiling.
    #[error("member '{member}' exceeds the size limit ({size} > {limit} bytes)")]
    SizeLimit { member: String, size: u64, limit: u64 },

    /// Decryption of a member failed (wrong key or corrupt ciphertext).
    #[error("failed to decrypt member '{member}'")]
    Decryption { member: String },

    /// The configured key or IV has the wrong length.
    #[error("cipher configuration error: {0}")]
    InvalidCipherConfig(String),

    /// I/O failure while reading member bytes.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
