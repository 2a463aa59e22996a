//! Common types and gateway traits shared across all pulse-archive services.

pub mod documents;
pub mod entities;
pub mod error;
pub mod gateway;
pub mod members;
pub mod types;

pub use documents::{
    BcqDoc, InfosAnalyzeDoc, InfosDoc, ReportDoc, StatisticRow, WaveformSet, WaveformTable,
    BCQ_ITEM_COUNT, STATISTIC_COLUMNS,
};
pub use entities::{
    FileRecord, Measurement, NewMeasurement, NewSubject, Subject, UploadRecord,
};
pub use error::{BlobError, StoreError, StoreResult};
pub use gateway::{BlobStore, MeasurementStore, StoreSession};
pub use members::{MemberKind, WAVEFORM_TABLES};
pub use types::{FileStatus, Laterality, Sex, SubjectKey, UploadStatus};
