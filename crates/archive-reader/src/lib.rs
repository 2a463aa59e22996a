//! Container and crypto layer for device pulse archives.
//!
//! An archive arrives as a ZIP blob. This crate enumerates its members,
//! rejects anything that would escape the archive root or blow the member
//! size ceiling, keeps only the members the pipeline recognizes, and
//! decrypts the members the device writes encrypted.

pub mod container;
pub mod crypto;
pub mod error;

pub use container::{validate_member_path, ArchiveReader, RawMember, DEFAULT_MEMBER_SIZE_LIMIT};
pub use crypto::ArchiveCipher;
pub use error::ArchiveError;
