//! Persisted entities and their insert forms.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{FileStatus, Sex, SubjectKey, UploadStatus};

/// A person (or phantom) whose pulses have been measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: Uuid,
    pub sid: String,
    pub project_no: String,
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<Sex>,
    pub last_measure_time: Option<DateTime<Utc>>,
}

impl Subject {
    pub fn key(&self) -> SubjectKey {
        SubjectKey::new(self.sid.clone(), self.project_no.clone())
    }
}

/// Insert form for [`Subject`]; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSubject {
    pub sid: String,
    pub project_no: String,
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<Sex>,
    pub last_measure_time: Option<DateTime<Utc>>,
}

/// One diagnostic session, with the derived metrics folded in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: Uuid,
    pub subject_id: Uuid,
    /// The archive file this measurement was ingested from, used as a
    /// fallback dedup key when measure_time alone does not resolve it.
    pub source_file_id: Option<Uuid>,
    pub measure_time: DateTime<Utc>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub age_years: Option<i32>,
    pub bmi: Option<f64>,
    pub strength: Option<i16>,
    pub mean_prop_pct_1: Option<i32>,
    pub mean_prop_pct_2: Option<i32>,
    pub mean_prop_pct_3: Option<i32>,
    pub mean_prop_range_max: Option<i16>,
    pub max_amp_depth_zone: Option<i16>,
    pub has_low_pass_rate: bool,
    pub device_version: Option<String>,
}

/// Insert form for [`Measurement`]; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMeasurement {
    pub subject_id: Uuid,
    pub source_file_id: Option<Uuid>,
    pub measure_time: DateTime<Utc>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub age_years: Option<i32>,
    pub bmi: Option<f64>,
    pub strength: Option<i16>,
    pub mean_prop_pct_1: Option<i32>,
    pub mean_prop_pct_2: Option<i32>,
    pub mean_prop_pct_3: Option<i32>,
    pub mean_prop_range_max: Option<i16>,
    pub max_amp_depth_zone: Option<i16>,
    pub has_low_pass_rate: bool,
    pub device_version: Option<String>,
}

impl NewMeasurement {
    /// Bind this insert form to an already-assigned id, e.g. when
    /// rewriting an existing row in place.
    pub fn with_id(self, id: Uuid) -> Measurement {
        Measurement {
            id,
            subject_id: self.subject_id,
            source_file_id: self.source_file_id,
            measure_time: self.measure_time,
            height_cm: self.height_cm,
            weight_kg: self.weight_kg,
            age_years: self.age_years,
            bmi: self.bmi,
            strength: self.strength,
            mean_prop_pct_1: self.mean_prop_pct_1,
            mean_prop_pct_2: self.mean_prop_pct_2,
            mean_prop_pct_3: self.mean_prop_pct_3,
            mean_prop_range_max: self.mean_prop_range_max,
            max_amp_depth_zone: self.max_amp_depth_zone,
            has_low_pass_rate: self.has_low_pass_rate,
            device_version: self.device_version,
        }
    }
}

/// One uploaded archive file, tracked through ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub upload_id: Uuid,
    /// Where the archive bytes live in blob storage.
    pub blob_path: String,
    pub original_name: Option<String>,
    pub status: FileStatus,
    /// Whether ingestion ran clean (no accumulated parse errors). Unset
    /// until ingestion finishes.
    pub valid: Option<bool>,
    /// Accumulated diagnostic text when ingestion was not clean.
    pub memo: Option<String>,
}

/// An upload batch of one or more archive files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub status: UploadStatus,
}
