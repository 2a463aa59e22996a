//! Ingestion orchestrator: one uploaded archive in, one outcome out.

use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use archive_reader::{ArchiveCipher, ArchiveError, ArchiveReader};
use pulse_common::documents::{
    BcqDoc, InfosAnalyzeDoc, InfosDoc, ReportDoc, StatisticRow, WaveformSet,
};
use pulse_common::entities::{FileRecord, Measurement, NewMeasurement, NewSubject, Subject};
use pulse_common::gateway::{BlobStore, MeasurementStore, StoreSession};
use pulse_common::types::{FileStatus, SubjectKey, UploadStatus};

use crate::accumulator::ParseFailures;
use crate::collect::{collect_documents, ArchiveDocuments};
use crate::config::IngestConfig;
use crate::error::{IngestionError, Result};
use crate::metrics::{self, RangeShares};

/// How far an ingestion run got, carried in logs and failure memos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Received,
    Extracted,
    Decrypted,
    Parsed,
    Validated,
    Derived,
    SubjectResolved,
    MeasurementResolved,
    Persisted,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::Received => "received",
            IngestStage::Extracted => "extracted",
            IngestStage::Decrypted => "decrypted",
            IngestStage::Parsed => "parsed",
            IngestStage::Validated => "validated",
            IngestStage::Derived => "derived",
            IngestStage::SubjectResolved => "subject_resolved",
            IngestStage::MeasurementResolved => "measurement_resolved",
            IngestStage::Persisted => "persisted",
        }
    }
}

/// Terminal result of one ingestion run. Failures are data here, never
/// `Err`; callers that fan out over many files need every outcome.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub file_id: Uuid,
    pub success: bool,
    pub stage: IngestStage,
    pub subject_id: Option<Uuid>,
    pub measurement_id: Option<Uuid>,
    /// Accumulated parse diagnostics on success, the fatal error on
    /// failure.
    pub error_message: Option<String>,
}

/// A fatal error together with the stage it surfaced in.
struct StageFailure {
    stage: IngestStage,
    message: String,
}

impl StageFailure {
    fn new(stage: IngestStage, error: impl Display) -> Self {
        Self {
            stage,
            message: error.to_string(),
        }
    }
}

/// Drives one archive file through extract, decrypt, parse, validate,
/// derive and persist.
pub struct Ingester {
    store: Arc<dyn MeasurementStore>,
    blobs: Arc<dyn BlobStore>,
    config: IngestConfig,
    reader: ArchiveReader,
    cipher: ArchiveCipher,
}

impl fmt::Debug for Ingester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ingester").finish_non_exhaustive()
    }
}

impl Ingester {
    pub fn new(
        store: Arc<dyn MeasurementStore>,
        blobs: Arc<dyn BlobStore>,
        config: IngestConfig,
    ) -> Result<Self> {
        let reader = ArchiveReader::new(config.member_size_limit);
        let cipher = ArchiveCipher::new(&config.cipher_key, &config.cipher_iv)?;
        Ok(Self {
            store,
            blobs,
            config,
            reader,
            cipher,
        })
    }

    /// Ingest one uploaded archive file.
    ///
    /// Never returns `Err`: every failure is folded into the outcome,
    /// written to the file record's memo, and reflected in the upload
    /// status.
    #[instrument(skip(self))]
    pub async fn ingest(&self, file_id: Uuid, overwrite: bool) -> IngestOutcome {
        match self.run(file_id, overwrite).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                warn!(
                    stage = failure.stage.as_str(),
                    "ingestion failed: {}", failure.message
                );
                self.record_failure(file_id, &failure).await;
                IngestOutcome {
                    file_id,
                    success: false,
                    stage: failure.stage,
                    subject_id: None,
                    measurement_id: None,
                    error_message: Some(failure.message),
                }
            }
        }
    }

    async fn run(
        &self,
        file_id: Uuid,
        overwrite: bool,
    ) -> std::result::Result<IngestOutcome, StageFailure> {
        let file = self
            .load_file(file_id)
            .await
            .map_err(|err| StageFailure::new(IngestStage::Received, err))?;
        let bytes = self
            .blobs
            .fetch(&file.blob_path)
            .await
            .map_err(|err| StageFailure::new(IngestStage::Received, err))?;

        let mut failures = ParseFailures::new();
        let docs = collect_documents(&self.reader, &self.cipher, &bytes, &mut failures)
            .map_err(collect_failure)?;
        debug!(
            stage = IngestStage::Parsed.as_str(),
            parse_failures = failures.len(),
            "archive members parsed"
        );

        let archive = validate(docs).map_err(|mut message| {
            if let Some(details) = failures.memo() {
                message = format!("{message}; {details}");
            }
            StageFailure {
                stage: IngestStage::Validated,
                message,
            }
        })?;
        let draft = MeasurementDraft::build(&self.config, archive);

        let memo = failures.memo();
        let mut stage = IngestStage::Derived;
        let persisted = match self
            .persist(&file, &draft, overwrite, memo.as_deref(), &mut stage)
            .await
        {
            Ok(persisted) => persisted,
            Err(IngestionError::Store(err)) if err.is_conflict() => {
                warn!(
                    stage = stage.as_str(),
                    "uniqueness conflict, retrying with a fresh session: {}", err
                );
                let mut retry = IngestStage::Derived;
                self.persist(&file, &draft, overwrite, memo.as_deref(), &mut retry)
                    .await
                    .map_err(|err| StageFailure::new(retry, err))?
            }
            Err(err) => return Err(StageFailure::new(stage, err)),
        };

        info!(
            subject_id = %persisted.subject_id,
            measurement_id = %persisted.measurement_id,
            valid = memo.is_none(),
            "archive ingested"
        );
        Ok(IngestOutcome {
            file_id,
            success: true,
            stage: IngestStage::Persisted,
            subject_id: Some(persisted.subject_id),
            measurement_id: Some(persisted.measurement_id),
            error_message: memo,
        })
    }

    async fn load_file(&self, file_id: Uuid) -> Result<FileRecord> {
        let mut session = self.store.session().await?;
        session
            .file_by_id(file_id)
            .await?
            .ok_or(IngestionError::UnknownFile(file_id))
    }

    /// The whole persistence phase runs in one session so the data, the
    /// file status and the upload status land atomically.
    async fn persist(
        &self,
        file: &FileRecord,
        draft: &MeasurementDraft,
        overwrite: bool,
        memo: Option<&str>,
        stage: &mut IngestStage,
    ) -> Result<Persisted> {
        let mut session = self.store.session().await?;

        *stage = IngestStage::SubjectResolved;
        let subject = resolve_subject(session.as_mut(), &draft.infos).await?;

        *stage = IngestStage::MeasurementResolved;
        let measurement =
            resolve_measurement(session.as_mut(), &subject, file, draft, overwrite).await?;

        *stage = IngestStage::Persisted;
        self.attach_sub_entities(session.as_mut(), measurement.id, draft)
            .await?;
        session
            .update_file_status(file.id, FileStatus::Succeeded, Some(memo.is_none()), memo)
            .await?;
        recompute_upload(session.as_mut(), file.upload_id, self.config.upload_timeout).await?;
        session.commit().await?;

        Ok(Persisted {
            subject_id: subject.id,
            measurement_id: measurement.id,
        })
    }

    /// Sub-entities are created only when absent, whatever the overwrite
    /// flag; an overwritten measurement starts blank anyway.
    async fn attach_sub_entities(
        &self,
        session: &mut dyn StoreSession,
        measurement_id: Uuid,
        draft: &MeasurementDraft,
    ) -> Result<()> {
        if let Some(bcq) = &draft.bcq {
            if !session.has_bcq(measurement_id).await? {
                session.create_bcq(measurement_id, bcq).await?;
            }
        }

        if (draft.tongue_up.is_some() || draft.tongue_down.is_some())
            && !session.has_tongue(measurement_id).await?
        {
            let up_path = self
                .store_tongue(measurement_id, "up", draft.tongue_up.as_deref())
                .await?;
            let down_path = self
                .store_tongue(measurement_id, "down", draft.tongue_down.as_deref())
                .await?;
            session
                .create_tongue(measurement_id, up_path.as_deref(), down_path.as_deref())
                .await?;
        }

        if !session.has_statistic_rows(measurement_id).await? {
            session
                .create_statistic_rows(measurement_id, &draft.statistics)
                .await?;
        }

        if !draft.waveforms.is_empty() && !session.has_raw_waveform(measurement_id).await? {
            session
                .create_raw_waveform(measurement_id, &draft.waveforms)
                .await?;
        }
        Ok(())
    }

    /// Image bytes go to the blob store before the tongue record exists,
    /// so a committed record never points at a missing object.
    async fn store_tongue(
        &self,
        measurement_id: Uuid,
        side: &str,
        image: Option<&[u8]>,
    ) -> Result<Option<String>> {
        let Some(image) = image else {
            return Ok(None);
        };
        let path = format!("tongue/{measurement_id}/T_{side}.jpg");
        self.blobs
            .store(&path, Bytes::copy_from_slice(image))
            .await?;
        Ok(Some(path))
    }

    /// Best-effort bookkeeping after a failed run: mark the file failed,
    /// keep the reason, recompute the upload. Store errors here are only
    /// logged; the outcome already carries the original failure.
    async fn record_failure(&self, file_id: Uuid, failure: &StageFailure) {
        if let Err(err) = self.try_record_failure(file_id, failure).await {
            warn!("could not record failed status for {}: {}", file_id, err);
        }
    }

    async fn try_record_failure(&self, file_id: Uuid, failure: &StageFailure) -> Result<()> {
        let mut session = self.store.session().await?;
        let Some(file) = session.file_by_id(file_id).await? else {
            return Ok(());
        };
        let memo = format!("failed at {}: {}", failure.stage.as_str(), failure.message);
        session
            .update_file_status(file.id, FileStatus::Failed, Some(false), Some(&memo))
            .await?;
        recompute_upload(session.as_mut(), file.upload_id, self.config.upload_timeout).await?;
        session.commit().await?;
        Ok(())
    }
}

struct Persisted {
    subject_id: Uuid,
    measurement_id: Uuid,
}

fn collect_failure(err: IngestionError) -> StageFailure {
    let stage = match &err {
        IngestionError::Archive(ArchiveError::Decryption { .. }) => IngestStage::Decrypted,
        _ => IngestStage::Extracted,
    };
    StageFailure::new(stage, err)
}

/// The mandatory document set plus whatever optional members survived.
#[derive(Debug)]
struct ValidatedArchive {
    infos: InfosDoc,
    analyze: InfosAnalyzeDoc,
    report: ReportDoc,
    statistics: Vec<StatisticRow>,
    bcq: Option<BcqDoc>,
    waveforms: WaveformSet,
    tongue_up: Option<Vec<u8>>,
    tongue_down: Option<Vec<u8>>,
    version: Option<String>,
}

fn validate(docs: ArchiveDocuments) -> std::result::Result<ValidatedArchive, String> {
    let missing = docs.missing_mandatory();
    let ArchiveDocuments {
        infos,
        infos_analyze,
        report,
        bcq,
        statistics,
        waveforms,
        tongue_up,
        tongue_down,
        version,
    } = docs;
    let (Some(infos), Some(analyze), Some(report), Some(statistics)) =
        (infos, infos_analyze, report, statistics)
    else {
        return Err(format!(
            "mandatory documents missing or unusable: {}",
            missing.join(", ")
        ));
    };
    if let Some(analyze_sid) = &analyze.sid {
        if *analyze_sid != infos.sid {
            return Err(format!(
                "sid mismatch: infos has '{}', infos_analyze has '{}'",
                infos.sid, analyze_sid
            ));
        }
    }
    Ok(ValidatedArchive {
        infos,
        analyze,
        report,
        statistics,
        bcq,
        waveforms,
        tongue_up,
        tongue_down,
        version,
    })
}

/// Validated documents plus the metrics derived from them, ready to be
/// written under whichever identity resolution picks.
struct MeasurementDraft {
    infos: InfosDoc,
    report: ReportDoc,
    statistics: Vec<StatisticRow>,
    bcq: Option<BcqDoc>,
    waveforms: WaveformSet,
    tongue_up: Option<Vec<u8>>,
    tongue_down: Option<Vec<u8>>,
    version: Option<String>,
    age_years: Option<i32>,
    bmi: Option<f64>,
    shares: Option<RangeShares>,
    depth_zone: Option<i16>,
    has_low_pass_rate: bool,
}

impl MeasurementDraft {
    fn build(config: &IngestConfig, archive: ValidatedArchive) -> Self {
        let ValidatedArchive {
            infos,
            analyze,
            report,
            statistics,
            bcq,
            waveforms,
            tongue_up,
            tongue_down,
            version,
        } = archive;
        let shares = metrics::mean_prop_ranges(analyze.range_1, analyze.range_2, analyze.range_3);
        let depth_zone = metrics::max_amp_depth_zone(
            analyze.max_amp_range_start,
            analyze.max_amp_range_end,
            analyze.max_amp_value,
        );
        let age_years = metrics::age_in_years(Some(infos.measure_time), infos.birth_date);
        let bmi = metrics::bmi(infos.height_cm, infos.weight_kg);
        let has_low_pass_rate = metrics::has_low_pass_rate(&statistics, config.pass_rate_threshold);
        Self {
            infos,
            report,
            statistics,
            bcq,
            waveforms,
            tongue_up,
            tongue_down,
            version,
            age_years,
            bmi,
            shares,
            depth_zone,
            has_low_pass_rate,
        }
    }

    fn to_new_measurement(&self, subject_id: Uuid, source_file_id: Uuid) -> NewMeasurement {
        NewMeasurement {
            subject_id,
            source_file_id: Some(source_file_id),
            measure_time: self.infos.measure_time,
            height_cm: self.infos.height_cm,
            weight_kg: self.infos.weight_kg,
            age_years: self.age_years,
            bmi: self.bmi,
            strength: self.report.strength,
            mean_prop_pct_1: self.shares.map(|s| s.pct_1),
            mean_prop_pct_2: self.shares.map(|s| s.pct_2),
            mean_prop_pct_3: self.shares.map(|s| s.pct_3),
            mean_prop_range_max: self.shares.map(|s| s.largest),
            max_amp_depth_zone: self.depth_zone,
            has_low_pass_rate: self.has_low_pass_rate,
            device_version: self.version.clone(),
        }
    }
}

/// Find or create the subject for this archive, folding in whatever
/// demographics the infos document provides.
async fn resolve_subject(session: &mut dyn StoreSession, infos: &InfosDoc) -> Result<Subject> {
    let key = SubjectKey::new(
        infos.sid.clone(),
        infos.project_no.clone().unwrap_or_default(),
    );
    match session.subject_by_key(&key).await? {
        Some(mut subject) => {
            if infos.name.is_some() {
                subject.name = infos.name.clone();
            }
            if infos.birth_date.is_some() {
                subject.birth_date = infos.birth_date;
            }
            if infos.sex.is_some() {
                subject.sex = infos.sex;
            }
            subject.last_measure_time = Some(match subject.last_measure_time {
                Some(previous) => previous.max(infos.measure_time),
                None => infos.measure_time,
            });
            session.update_subject(&subject).await?;
            Ok(subject)
        }
        None => {
            let subject = session
                .create_subject(&NewSubject {
                    sid: key.sid.clone(),
                    project_no: key.project_no.clone(),
                    name: infos.name.clone(),
                    birth_date: infos.birth_date,
                    sex: infos.sex,
                    last_measure_time: Some(infos.measure_time),
                })
                .await?;
            Ok(subject)
        }
    }
}

/// Resolve the measurement by (subject, measure_time), falling back to
/// the source file id. `overwrite` swaps the row for a fresh identity;
/// otherwise the existing row is rewritten in place.
async fn resolve_measurement(
    session: &mut dyn StoreSession,
    subject: &Subject,
    file: &FileRecord,
    draft: &MeasurementDraft,
    overwrite: bool,
) -> Result<Measurement> {
    let new = draft.to_new_measurement(subject.id, file.id);
    let found = match session
        .measurement_by_subject_time(subject.id, new.measure_time)
        .await?
    {
        Some(found) => Some(found),
        None => session.measurement_by_source_file(file.id).await?,
    };
    match found {
        Some(found) if overwrite => {
            info!(measurement_id = %found.id, "overwriting existing measurement");
            session.delete_measurement(found.id).await?;
            Ok(session.create_measurement(&new).await?)
        }
        Some(found) => {
            let mut updated = new.with_id(found.id);
            updated.subject_id = found.subject_id;
            session.update_measurement(&updated).await?;
            Ok(updated)
        }
        None => Ok(session.create_measurement(&new).await?),
    }
}

/// Re-derive the upload's aggregate status from its files' statuses.
/// Terminal upload statuses are never touched.
async fn recompute_upload(
    session: &mut dyn StoreSession,
    upload_id: Uuid,
    timeout: Duration,
) -> Result<()> {
    let Some(upload) = session.upload_by_id(upload_id).await? else {
        warn!("file references unknown upload {}", upload_id);
        return Ok(());
    };
    if upload.status != UploadStatus::Processing {
        return Ok(());
    }

    let statuses = session.file_statuses_for_upload(upload_id).await?;
    let all_succeeded =
        !statuses.is_empty() && statuses.iter().all(|s| *s == FileStatus::Succeeded);
    if all_succeeded {
        session
            .update_upload_status(upload_id, UploadStatus::Succeeded)
            .await?;
        return Ok(());
    }

    let elapsed = Utc::now()
        .signed_duration_since(upload.started_at)
        .to_std()
        .unwrap_or_default();
    if elapsed > timeout {
        warn!(
            "upload {} still incomplete after {:?}, marking failed",
            upload_id, elapsed
        );
        session
            .update_upload_status(upload_id, UploadStatus::Failed)
            .await?;
    }
    Ok(())
}
