//! Common test utilities for the ingestion pipeline tests.
//!
//! Provides:
//! - an in-memory `MeasurementStore` with transactional sessions and
//!   optional uniqueness-conflict injection
//! - an in-memory `BlobStore`
//! - builders for encrypted fixture archives

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use archive_reader::ArchiveCipher;
use ingestion::config::{DEFAULT_CIPHER_IV, DEFAULT_CIPHER_KEY};
use ingestion::{IngestConfig, Ingester};
use pulse_common::documents::{BcqDoc, StatisticRow, WaveformSet, STATISTIC_COLUMNS};
use pulse_common::entities::{
    FileRecord, Measurement, NewMeasurement, NewSubject, Subject, UploadRecord,
};
use pulse_common::error::{BlobError, StoreError, StoreResult};
use pulse_common::gateway::{BlobStore, MeasurementStore, StoreSession};
use pulse_common::types::{FileStatus, SubjectKey, UploadStatus};

// ============================================================================
// In-memory measurement store
// ============================================================================

#[derive(Debug, Clone, Default)]
struct StoreState {
    subjects: HashMap<Uuid, Subject>,
    measurements: HashMap<Uuid, Measurement>,
    bcq: HashMap<Uuid, BcqDoc>,
    tongues: HashMap<Uuid, (Option<String>, Option<String>)>,
    statistic_rows: HashMap<Uuid, Vec<StatisticRow>>,
    waveforms: HashMap<Uuid, WaveformSet>,
    files: HashMap<Uuid, FileRecord>,
    uploads: HashMap<Uuid, UploadRecord>,
    conflict_next_subject_create: bool,
    conflict_next_measurement_create: bool,
}

/// In-memory store. Sessions clone the state and write it back on
/// commit, so a dropped session rolls back like a real transaction.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_upload(&self, started_at: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().uploads.insert(
            id,
            UploadRecord {
                id,
                started_at,
                status: UploadStatus::Processing,
            },
        );
        id
    }

    pub fn seed_file(&self, upload_id: Uuid, blob_path: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().files.insert(
            id,
            FileRecord {
                id,
                upload_id,
                blob_path: blob_path.to_string(),
                original_name: Some("archive.zip".to_string()),
                status: FileStatus::Pending,
                valid: None,
                memo: None,
            },
        );
        id
    }

    pub fn seed_subject(
        &self,
        sid: &str,
        project_no: &str,
        last_measure_time: Option<DateTime<Utc>>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().subjects.insert(
            id,
            Subject {
                id,
                sid: sid.to_string(),
                project_no: project_no.to_string(),
                name: None,
                birth_date: None,
                sex: None,
                last_measure_time,
            },
        );
        id
    }

    /// Make the next `create_subject` fail with a conflict after
    /// inserting a racing row, as if another session committed first.
    pub fn inject_subject_conflict(&self) {
        self.state.lock().unwrap().conflict_next_subject_create = true;
    }

    /// Same as [`inject_subject_conflict`], for measurements.
    pub fn inject_measurement_conflict(&self) {
        self.state.lock().unwrap().conflict_next_measurement_create = true;
    }

    pub fn subjects(&self) -> Vec<Subject> {
        self.state.lock().unwrap().subjects.values().cloned().collect()
    }

    pub fn measurements(&self) -> Vec<Measurement> {
        self.state
            .lock()
            .unwrap()
            .measurements
            .values()
            .cloned()
            .collect()
    }

    pub fn file(&self, id: Uuid) -> Option<FileRecord> {
        self.state.lock().unwrap().files.get(&id).cloned()
    }

    pub fn upload(&self, id: Uuid) -> Option<UploadRecord> {
        self.state.lock().unwrap().uploads.get(&id).cloned()
    }

    pub fn bcq(&self, measurement_id: Uuid) -> Option<BcqDoc> {
        self.state.lock().unwrap().bcq.get(&measurement_id).cloned()
    }

    pub fn tongue(&self, measurement_id: Uuid) -> Option<(Option<String>, Option<String>)> {
        self.state
            .lock()
            .unwrap()
            .tongues
            .get(&measurement_id)
            .cloned()
    }

    pub fn statistic_rows(&self, measurement_id: Uuid) -> Option<Vec<StatisticRow>> {
        self.state
            .lock()
            .unwrap()
            .statistic_rows
            .get(&measurement_id)
            .cloned()
    }

    pub fn waveforms(&self, measurement_id: Uuid) -> Option<WaveformSet> {
        self.state
            .lock()
            .unwrap()
            .waveforms
            .get(&measurement_id)
            .cloned()
    }
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    async fn session(&self) -> StoreResult<Box<dyn StoreSession>> {
        let state = self.state.lock().unwrap().clone();
        Ok(Box::new(MemorySession {
            base: Arc::clone(&self.state),
            state,
        }))
    }

    async fn all_file_ids(&self) -> StoreResult<Vec<Uuid>> {
        Ok(self.state.lock().unwrap().files.keys().copied().collect())
    }
}

struct MemorySession {
    base: Arc<Mutex<StoreState>>,
    state: StoreState,
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn file_by_id(&mut self, id: Uuid) -> StoreResult<Option<FileRecord>> {
        Ok(self.state.files.get(&id).cloned())
    }

    async fn update_file_status(
        &mut self,
        id: Uuid,
        status: FileStatus,
        valid: Option<bool>,
        memo: Option<&str>,
    ) -> StoreResult<()> {
        if let Some(file) = self.state.files.get_mut(&id) {
            file.status = status;
            file.valid = valid;
            file.memo = memo.map(str::to_string);
        }
        Ok(())
    }

    async fn upload_by_id(&mut self, id: Uuid) -> StoreResult<Option<UploadRecord>> {
        Ok(self.state.uploads.get(&id).cloned())
    }

    async fn file_statuses_for_upload(&mut self, upload_id: Uuid) -> StoreResult<Vec<FileStatus>> {
        Ok(self
            .state
            .files
            .values()
            .filter(|file| file.upload_id == upload_id)
            .map(|file| file.status)
            .collect())
    }

    async fn update_upload_status(&mut self, id: Uuid, status: UploadStatus) -> StoreResult<()> {
        if let Some(upload) = self.state.uploads.get_mut(&id) {
            upload.status = status;
        }
        Ok(())
    }

    async fn subject_by_key(&mut self, key: &SubjectKey) -> StoreResult<Option<Subject>> {
        Ok(self
            .state
            .subjects
            .values()
            .find(|s| s.sid == key.sid && s.project_no == key.project_no)
            .cloned())
    }

    async fn create_subject(&mut self, subject: &NewSubject) -> StoreResult<Subject> {
        {
            let mut base = self.base.lock().unwrap();
            if base.conflict_next_subject_create {
                base.conflict_next_subject_create = false;
                let racer = Subject {
                    id: Uuid::new_v4(),
                    sid: subject.sid.clone(),
                    project_no: subject.project_no.clone(),
                    name: None,
                    birth_date: None,
                    sex: None,
                    last_measure_time: None,
                };
                base.subjects.insert(racer.id, racer);
                return Err(StoreError::Conflict(format!(
                    "subjects ({}, {})",
                    subject.sid, subject.project_no
                )));
            }
        }
        if self
            .state
            .subjects
            .values()
            .any(|s| s.sid == subject.sid && s.project_no == subject.project_no)
        {
            return Err(StoreError::Conflict(format!(
                "subjects ({}, {})",
                subject.sid, subject.project_no
            )));
        }
        let created = Subject {
            id: Uuid::new_v4(),
            sid: subject.sid.clone(),
            project_no: subject.project_no.clone(),
            name: subject.name.clone(),
            birth_date: subject.birth_date,
            sex: subject.sex,
            last_measure_time: subject.last_measure_time,
        };
        self.state.subjects.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_subject(&mut self, subject: &Subject) -> StoreResult<()> {
        self.state.subjects.insert(subject.id, subject.clone());
        Ok(())
    }

    async fn measurement_by_subject_time(
        &mut self,
        subject_id: Uuid,
        measure_time: DateTime<Utc>,
    ) -> StoreResult<Option<Measurement>> {
        Ok(self
            .state
            .measurements
            .values()
            .find(|m| m.subject_id == subject_id && m.measure_time == measure_time)
            .cloned())
    }

    async fn measurement_by_source_file(
        &mut self,
        file_id: Uuid,
    ) -> StoreResult<Option<Measurement>> {
        Ok(self
            .state
            .measurements
            .values()
            .find(|m| m.source_file_id == Some(file_id))
            .cloned())
    }

    async fn create_measurement(
        &mut self,
        measurement: &NewMeasurement,
    ) -> StoreResult<Measurement> {
        {
            let mut base = self.base.lock().unwrap();
            if base.conflict_next_measurement_create {
                base.conflict_next_measurement_create = false;
                let racer = measurement.clone().with_id(Uuid::new_v4());
                base.measurements.insert(racer.id, racer);
                return Err(StoreError::Conflict(format!(
                    "measurements ({}, {})",
                    measurement.subject_id, measurement.measure_time
                )));
            }
        }
        if self.state.measurements.values().any(|m| {
            m.subject_id == measurement.subject_id && m.measure_time == measurement.measure_time
        }) {
            return Err(StoreError::Conflict(format!(
                "measurements ({}, {})",
                measurement.subject_id, measurement.measure_time
            )));
        }
        let created = measurement.clone().with_id(Uuid::new_v4());
        self.state.measurements.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_measurement(&mut self, measurement: &Measurement) -> StoreResult<()> {
        self.state
            .measurements
            .insert(measurement.id, measurement.clone());
        Ok(())
    }

    async fn delete_measurement(&mut self, id: Uuid) -> StoreResult<()> {
        self.state.measurements.remove(&id);
        self.state.bcq.remove(&id);
        self.state.tongues.remove(&id);
        self.state.statistic_rows.remove(&id);
        self.state.waveforms.remove(&id);
        Ok(())
    }

    async fn has_bcq(&mut self, measurement_id: Uuid) -> StoreResult<bool> {
        Ok(self.state.bcq.contains_key(&measurement_id))
    }

    async fn create_bcq(&mut self, measurement_id: Uuid, doc: &BcqDoc) -> StoreResult<()> {
        if self.state.bcq.contains_key(&measurement_id) {
            return Err(StoreError::Conflict(format!("bcq ({measurement_id})")));
        }
        self.state.bcq.insert(measurement_id, doc.clone());
        Ok(())
    }

    async fn has_tongue(&mut self, measurement_id: Uuid) -> StoreResult<bool> {
        Ok(self.state.tongues.contains_key(&measurement_id))
    }

    async fn create_tongue(
        &mut self,
        measurement_id: Uuid,
        up_path: Option<&str>,
        down_path: Option<&str>,
    ) -> StoreResult<()> {
        if self.state.tongues.contains_key(&measurement_id) {
            return Err(StoreError::Conflict(format!("tongue ({measurement_id})")));
        }
        self.state.tongues.insert(
            measurement_id,
            (up_path.map(str::to_string), down_path.map(str::to_string)),
        );
        Ok(())
    }

    async fn has_statistic_rows(&mut self, measurement_id: Uuid) -> StoreResult<bool> {
        Ok(self.state.statistic_rows.contains_key(&measurement_id))
    }

    async fn create_statistic_rows(
        &mut self,
        measurement_id: Uuid,
        rows: &[StatisticRow],
    ) -> StoreResult<()> {
        if self.state.statistic_rows.contains_key(&measurement_id) {
            return Err(StoreError::Conflict(format!(
                "statistic_rows ({measurement_id})"
            )));
        }
        self.state
            .statistic_rows
            .insert(measurement_id, rows.to_vec());
        Ok(())
    }

    async fn has_raw_waveform(&mut self, measurement_id: Uuid) -> StoreResult<bool> {
        Ok(self.state.waveforms.contains_key(&measurement_id))
    }

    async fn create_raw_waveform(
        &mut self,
        measurement_id: Uuid,
        waveforms: &WaveformSet,
    ) -> StoreResult<()> {
        if self.state.waveforms.contains_key(&measurement_id) {
            return Err(StoreError::Conflict(format!(
                "raw_waveforms ({measurement_id})"
            )));
        }
        self.state
            .waveforms
            .insert(measurement_id, waveforms.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let session = *self;
        *session.base.lock().unwrap() = session.state;
        Ok(())
    }
}

// ============================================================================
// In-memory blob store
// ============================================================================

#[derive(Clone, Default)]
pub struct MemoryBlobs {
    objects: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl MemoryBlobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: &str, bytes: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), Bytes::from(bytes));
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(path).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn fetch(&self, path: &str) -> Result<Bytes, BlobError> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| BlobError(format!("no such object: {path}")))
    }

    async fn store(&self, path: &str, bytes: Bytes) -> Result<(), BlobError> {
        self.objects.lock().unwrap().insert(path.to_string(), bytes);
        Ok(())
    }
}

// ============================================================================
// Fixture archives
// ============================================================================

pub fn cipher() -> ArchiveCipher {
    ArchiveCipher::new(DEFAULT_CIPHER_KEY, DEFAULT_CIPHER_IV).unwrap()
}

pub fn enc(text: &str) -> Vec<u8> {
    cipher().encrypt(text.as_bytes())
}

pub fn build_archive(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(name.as_str(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub const FIXTURE_SID: &str = "A1";
pub const FIXTURE_PROJECT: &str = "P7";

/// Measurement taken 2024-01-01 10:00 by someone born 1990-06-15:
/// age 33, BMI 20.0, range shares 20/30/50 (largest index 2), max
/// amplitude in zone 1, strength code 0 (stored as 2).
pub fn full_entries() -> Vec<(String, Vec<u8>)> {
    let infos = "sid:A1\n\
                 project_no:P7\n\
                 name:Chen\n\
                 birth:1990/06/15\n\
                 sex:F\n\
                 height:160\n\
                 weight:51.2\n\
                 measure_time:20240101100000\n";
    let analyze = "sid:A1\n\
                   measure_time:20240101100000\n\
                   range_1:2\n\
                   range_2:3\n\
                   range_3:5\n\
                   max_amp_range_start:0\n\
                   max_amp_range_end:10\n\
                   max_amp_value:3\n";
    let report = "strength:0\nsummary:steady pulse\n";
    let bcq: String = (1..=44).map(|i| format!("q{i:02}:{}\n", i % 5)).collect();

    vec![
        ("infos.txt".to_string(), enc(infos)),
        ("infos_analyze.txt".to_string(), enc(analyze)),
        ("report.txt".to_string(), enc(report)),
        ("BCQ.txt".to_string(), enc(&bcq)),
        ("statistics.csv".to_string(), stats_csv(&[95.0, 97.5])),
        ("L/6s_cu.txt".to_string(), enc("12.5\t13.0\n12.8\t13.1\n")),
        ("R/analyze_raw_ch.txt".to_string(), enc("7.5\t7.6\n")),
        ("T_up.jpg".to_string(), b"\xff\xd8tongue-up".to_vec()),
        ("T_down.jpg".to_string(), b"\xff\xd8tongue-down".to_vec()),
        ("ver.ini".to_string(), enc("fw 2.1.0\n")),
    ]
}

/// Plaintext statistics CSV with one full-width row per pass rate.
pub fn stats_csv(pass_rates: &[f64]) -> Vec<u8> {
    let mut text = format!("statistic,hand,position,{}\n", STATISTIC_COLUMNS.join(","));
    for (i, rate) in pass_rates.iter().enumerate() {
        let hand = if i % 2 == 0 { "L" } else { "R" };
        text.push_str(&format!("mean,{hand},cu"));
        for filler in 0..STATISTIC_COLUMNS.len() - 1 {
            text.push_str(&format!(",{filler}"));
        }
        text.push_str(&format!(",{rate}\n"));
    }
    text.into_bytes()
}

pub fn without(entries: Vec<(String, Vec<u8>)>, name: &str) -> Vec<(String, Vec<u8>)> {
    entries.into_iter().filter(|(n, _)| n != name).collect()
}

pub fn replace(
    mut entries: Vec<(String, Vec<u8>)>,
    name: &str,
    data: Vec<u8>,
) -> Vec<(String, Vec<u8>)> {
    for entry in entries.iter_mut() {
        if entry.0 == name {
            entry.1 = data;
            return entries;
        }
    }
    entries.push((name.to_string(), data));
    entries
}

// ============================================================================
// Wiring
// ============================================================================

/// Seed an upload with one file whose blob is the given archive.
pub fn seed_archive(
    store: &MemoryStore,
    blobs: &MemoryBlobs,
    started_at: DateTime<Utc>,
    entries: &[(String, Vec<u8>)],
) -> (Uuid, Uuid) {
    let upload_id = store.seed_upload(started_at);
    let blob_path = format!("uploads/{upload_id}/archive.zip");
    let file_id = store.seed_file(upload_id, &blob_path);
    blobs.put(&blob_path, build_archive(entries));
    (upload_id, file_id)
}

pub fn ingester(store: &MemoryStore, blobs: &MemoryBlobs) -> Ingester {
    Ingester::new(
        Arc::new(store.clone()),
        Arc::new(blobs.clone()),
        IngestConfig::default(),
    )
    .unwrap()
}
