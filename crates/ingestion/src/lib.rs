//! Measurement archive ingestion library.
//!
//! Provides the core pipeline for turning an uploaded device archive
//! into persisted clinical records:
//!
//! - member extraction with path and size validation (`archive-reader`)
//! - decryption and text parsing into typed documents
//! - derived metrics (age, BMI, range shares, depth zone, pass-rate flag)
//! - subject and measurement resolution against the store
//! - file and upload status bookkeeping
//!
//! The crate talks to its collaborators only through the gateway traits
//! in `pulse-common`, so the whole pipeline runs against in-memory fakes
//! in tests.

pub mod accumulator;
pub mod collect;
pub mod config;
pub mod error;
pub mod metrics;
mod ingester;

// Re-exports
pub use accumulator::ParseFailures;
pub use collect::{collect_documents, ArchiveDocuments};
pub use config::IngestConfig;
pub use error::{IngestionError, Result};
pub use ingester::{IngestOutcome, IngestStage, Ingester};
