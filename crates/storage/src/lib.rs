//! Production persistence backends for the measurement archive pipeline.
//!
//! Implements the `pulse-common` gateway traits:
//! - PostgreSQL registry for subjects, measurements, and upload tracking
//! - Object storage (MinIO/S3) for archive bytes and tongue images

pub mod blob;
pub mod registry;

pub use blob::{ObjectStorage, ObjectStorageConfig};
pub use registry::{Registry, RegistrySession};
