//! Gateway traits between the ingestion pipeline and its collaborators.
//!
//! The pipeline never talks to Postgres or object storage directly; it
//! drives these traits, which keeps the orchestrator testable against
//! in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::documents::{BcqDoc, StatisticRow, WaveformSet};
use crate::entities::{FileRecord, Measurement, NewMeasurement, NewSubject, Subject, UploadRecord};
use crate::error::{BlobError, StoreResult};
use crate::types::{FileStatus, SubjectKey, UploadStatus};

/// Entry point to the measurement store.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Open a transactional session. Writes made through the session are
    /// invisible until [`StoreSession::commit`]; dropping the session
    /// rolls them back.
    async fn session(&self) -> StoreResult<Box<dyn StoreSession>>;

    /// All known archive file ids, for bulk re-ingestion jobs.
    async fn all_file_ids(&self) -> StoreResult<Vec<Uuid>>;
}

/// One unit-of-work against the measurement store.
///
/// A session lives for a single ingestion call and is consumed by
/// `commit`. Uniqueness races between concurrent sessions surface as
/// [`crate::StoreError::Conflict`] from the create methods.
#[async_trait]
pub trait StoreSession: Send {
    async fn file_by_id(&mut self, id: Uuid) -> StoreResult<Option<FileRecord>>;

    async fn update_file_status(
        &mut self,
        id: Uuid,
        status: FileStatus,
        valid: Option<bool>,
        memo: Option<&str>,
    ) -> StoreResult<()>;

    async fn upload_by_id(&mut self, id: Uuid) -> StoreResult<Option<UploadRecord>>;

    /// Statuses of every file in an upload batch, for recomputing the
    /// aggregate upload status.
    async fn file_statuses_for_upload(&mut self, upload_id: Uuid) -> StoreResult<Vec<FileStatus>>;

    async fn update_upload_status(&mut self, id: Uuid, status: UploadStatus) -> StoreResult<()>;

    async fn subject_by_key(&mut self, key: &SubjectKey) -> StoreResult<Option<Subject>>;

    async fn create_subject(&mut self, subject: &NewSubject) -> StoreResult<Subject>;

    async fn update_subject(&mut self, subject: &Subject) -> StoreResult<()>;

    async fn measurement_by_subject_time(
        &mut self,
        subject_id: Uuid,
        measure_time: DateTime<Utc>,
    ) -> StoreResult<Option<Measurement>>;

    /// Fallback lookup by the archive file the measurement came from.
    async fn measurement_by_source_file(
        &mut self,
        file_id: Uuid,
    ) -> StoreResult<Option<Measurement>>;

    async fn create_measurement(
        &mut self,
        measurement: &NewMeasurement,
    ) -> StoreResult<Measurement>;

    async fn update_measurement(&mut self, measurement: &Measurement) -> StoreResult<()>;

    /// Deletes the measurement and, by cascade, its sub-entities.
    async fn delete_measurement(&mut self, id: Uuid) -> StoreResult<()>;

    async fn has_bcq(&mut self, measurement_id: Uuid) -> StoreResult<bool>;

    async fn create_bcq(&mut self, measurement_id: Uuid, doc: &BcqDoc) -> StoreResult<()>;

    async fn has_tongue(&mut self, measurement_id: Uuid) -> StoreResult<bool>;

    async fn create_tongue(
        &mut self,
        measurement_id: Uuid,
        up_path: Option<&str>,
        down_path: Option<&str>,
    ) -> StoreResult<()>;

    async fn has_statistic_rows(&mut self, measurement_id: Uuid) -> StoreResult<bool>;

    async fn create_statistic_rows(
        &mut self,
        measurement_id: Uuid,
        rows: &[StatisticRow],
    ) -> StoreResult<()>;

    async fn has_raw_waveform(&mut self, measurement_id: Uuid) -> StoreResult<bool>;

    async fn create_raw_waveform(
        &mut self,
        measurement_id: Uuid,
        waveforms: &WaveformSet,
    ) -> StoreResult<()>;

    /// Commit everything written through this session.
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Blob storage for archive bytes and extracted images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch a blob. No retry policy here; callers own that.
    async fn fetch(&self, path: &str) -> Result<Bytes, BlobError>;

    /// Store a blob, overwriting any existing object at `path`.
    async fn store(&self, path: &str, bytes: Bytes) -> Result<(), BlobError>;
}
