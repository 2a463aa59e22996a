//! PostgreSQL measurement registry.
//!
//! [`Registry`] owns the connection pool and hands out transactional
//! [`RegistrySession`]s; every write made through a session becomes
//! visible only when the session commits. Uniqueness violations
//! (SQLSTATE 23505) are surfaced as [`StoreError::Conflict`] so the
//! ingestion pipeline can retry against the winning row.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use pulse_common::documents::{BcqDoc, StatisticRow, WaveformSet};
use pulse_common::entities::{
    FileRecord, Measurement, NewMeasurement, NewSubject, Subject, UploadRecord,
};
use pulse_common::error::{StoreError, StoreResult};
use pulse_common::gateway::{MeasurementStore, StoreSession};
use pulse_common::types::{FileStatus, Sex, SubjectKey, UploadStatus};

/// PostgreSQL-backed measurement store.
pub struct Registry {
    pool: PgPool,
}

impl Registry {
    /// Create a registry over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database and build the pool.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("failed to connect: {e}")))?;

        info!("connected to measurement registry");
        Ok(Self { pool })
    }

    /// Apply the schema. Statements are idempotent, so running this on
    /// every startup is safe.
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA_SQL.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Database(format!("migration failed: {e}")))?;
        }

        info!("registry schema is up to date");
        Ok(())
    }
}

#[async_trait]
impl MeasurementStore for Registry {
    async fn session(&self) -> StoreResult<Box<dyn StoreSession>> {
        let tx = self.pool.begin().await.map_err(map_db_err)?;
        Ok(Box::new(RegistrySession { tx }))
    }

    async fn all_file_ids(&self) -> StoreResult<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM upload_files ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)
    }
}

/// One open transaction against the registry.
pub struct RegistrySession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreSession for RegistrySession {
    async fn file_by_id(&mut self, id: Uuid) -> StoreResult<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRow>(
            "SELECT id, upload_id, blob_path, original_name, status, valid, memo \
             FROM upload_files WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_err)?;

        row.map(FileRecord::try_from).transpose()
    }

    async fn update_file_status(
        &mut self,
        id: Uuid,
        status: FileStatus,
        valid: Option<bool>,
        memo: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE upload_files SET status = $2, valid = $3, memo = $4 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(valid)
            .bind(memo)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn upload_by_id(&mut self, id: Uuid) -> StoreResult<Option<UploadRecord>> {
        let row = sqlx::query_as::<_, UploadRow>(
            "SELECT id, started_at, status FROM uploads WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_err)?;

        row.map(UploadRecord::try_from).transpose()
    }

    async fn file_statuses_for_upload(&mut self, upload_id: Uuid) -> StoreResult<Vec<FileStatus>> {
        let raw: Vec<String> =
            sqlx::query_scalar("SELECT status FROM upload_files WHERE upload_id = $1")
                .bind(upload_id)
                .fetch_all(&mut *self.tx)
                .await
                .map_err(map_db_err)?;

        raw.iter().map(|s| parse_file_status(s)).collect()
    }

    async fn update_upload_status(&mut self, id: Uuid, status: UploadStatus) -> StoreResult<()> {
        sqlx::query("UPDATE uploads SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn subject_by_key(&mut self, key: &SubjectKey) -> StoreResult<Option<Subject>> {
        let row = sqlx::query_as::<_, SubjectRow>(
            "SELECT id, sid, project_no, name, birth_date, sex, last_measure_time \
             FROM subjects WHERE sid = $1 AND project_no = $2",
        )
        .bind(&key.sid)
        .bind(&key.project_no)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_err)?;

        Ok(row.map(Subject::from))
    }

    async fn create_subject(&mut self, subject: &NewSubject) -> StoreResult<Subject> {
        let id = Uuid::new_v4();
        debug!(subject_id = %id, sid = %subject.sid, "creating subject");

        sqlx::query(
            "INSERT INTO subjects (id, sid, project_no, name, birth_date, sex, last_measure_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(&subject.sid)
        .bind(&subject.project_no)
        .bind(&subject.name)
        .bind(subject.birth_date)
        .bind(subject.sex.map(|s| s.as_str()))
        .bind(subject.last_measure_time)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_err)?;

        Ok(Subject {
            id,
            sid: subject.sid.clone(),
            project_no: subject.project_no.clone(),
            name: subject.name.clone(),
            birth_date: subject.birth_date,
            sex: subject.sex,
            last_measure_time: subject.last_measure_time,
        })
    }

    async fn update_subject(&mut self, subject: &Subject) -> StoreResult<()> {
        sqlx::query(
            "UPDATE subjects SET name = $2, birth_date = $3, sex = $4, last_measure_time = $5, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(subject.id)
        .bind(&subject.name)
        .bind(subject.birth_date)
        .bind(subject.sex.map(|s| s.as_str()))
        .bind(subject.last_measure_time)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn measurement_by_subject_time(
        &mut self,
        subject_id: Uuid,
        measure_time: DateTime<Utc>,
    ) -> StoreResult<Option<Measurement>> {
        let row = sqlx::query_as::<_, MeasurementRow>(
            "SELECT id, subject_id, source_file_id, measure_time, height_cm, weight_kg, \
             age_years, bmi, strength, mean_prop_pct_1, mean_prop_pct_2, mean_prop_pct_3, \
             mean_prop_range_max, max_amp_depth_zone, has_low_pass_rate, device_version \
             FROM measurements WHERE subject_id = $1 AND measure_time = $2",
        )
        .bind(subject_id)
        .bind(measure_time)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_err)?;

        Ok(row.map(Measurement::from))
    }

    async fn measurement_by_source_file(
        &mut self,
        file_id: Uuid,
    ) -> StoreResult<Option<Measurement>> {
        let row = sqlx::query_as::<_, MeasurementRow>(
            "SELECT id, subject_id, source_file_id, measure_time, height_cm, weight_kg, \
             age_years, bmi, strength, mean_prop_pct_1, mean_prop_pct_2, mean_prop_pct_3, \
             mean_prop_range_max, max_amp_depth_zone, has_low_pass_rate, device_version \
             FROM measurements WHERE source_file_id = $1",
        )
        .bind(file_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_err)?;

        Ok(row.map(Measurement::from))
    }

    async fn create_measurement(
        &mut self,
        measurement: &NewMeasurement,
    ) -> StoreResult<Measurement> {
        let id = Uuid::new_v4();
        debug!(measurement_id = %id, subject_id = %measurement.subject_id, "creating measurement");

        sqlx::query(
            "INSERT INTO measurements (id, subject_id, source_file_id, measure_time, height_cm, \
             weight_kg, age_years, bmi, strength, mean_prop_pct_1, mean_prop_pct_2, \
             mean_prop_pct_3, mean_prop_range_max, max_amp_depth_zone, has_low_pass_rate, \
             device_version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(id)
        .bind(measurement.subject_id)
        .bind(measurement.source_file_id)
        .bind(measurement.measure_time)
        .bind(measurement.height_cm)
        .bind(measurement.weight_kg)
        .bind(measurement.age_years)
        .bind(measurement.bmi)
        .bind(measurement.strength)
        .bind(measurement.mean_prop_pct_1)
        .bind(measurement.mean_prop_pct_2)
        .bind(measurement.mean_prop_pct_3)
        .bind(measurement.mean_prop_range_max)
        .bind(measurement.max_amp_depth_zone)
        .bind(measurement.has_low_pass_rate)
        .bind(&measurement.device_version)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_err)?;

        Ok(measurement.clone().with_id(id))
    }

    async fn update_measurement(&mut self, measurement: &Measurement) -> StoreResult<()> {
        sqlx::query(
            "UPDATE measurements SET subject_id = $2, source_file_id = $3, measure_time = $4, \
             height_cm = $5, weight_kg = $6, age_years = $7, bmi = $8, strength = $9, \
             mean_prop_pct_1 = $10, mean_prop_pct_2 = $11, mean_prop_pct_3 = $12, \
             mean_prop_range_max = $13, max_amp_depth_zone = $14, has_low_pass_rate = $15, \
             device_version = $16 WHERE id = $1",
        )
        .bind(measurement.id)
        .bind(measurement.subject_id)
        .bind(measurement.source_file_id)
        .bind(measurement.measure_time)
        .bind(measurement.height_cm)
        .bind(measurement.weight_kg)
        .bind(measurement.age_years)
        .bind(measurement.bmi)
        .bind(measurement.strength)
        .bind(measurement.mean_prop_pct_1)
        .bind(measurement.mean_prop_pct_2)
        .bind(measurement.mean_prop_pct_3)
        .bind(measurement.mean_prop_range_max)
        .bind(measurement.max_amp_depth_zone)
        .bind(measurement.has_low_pass_rate)
        .bind(&measurement.device_version)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn delete_measurement(&mut self, id: Uuid) -> StoreResult<()> {
        debug!(measurement_id = %id, "deleting measurement and cascaded sub-entities");

        sqlx::query("DELETE FROM measurements WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn has_bcq(&mut self, measurement_id: Uuid) -> StoreResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM bcq_records WHERE measurement_id = $1)")
            .bind(measurement_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_err)
    }

    async fn create_bcq(&mut self, measurement_id: Uuid, doc: &BcqDoc) -> StoreResult<()> {
        let answers = serde_json::to_value(&doc.answers)
            .map_err(|e| StoreError::Database(format!("failed to encode answers: {e}")))?;

        sqlx::query("INSERT INTO bcq_records (id, measurement_id, answers) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(measurement_id)
            .bind(answers)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn has_tongue(&mut self, measurement_id: Uuid) -> StoreResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tongue_records WHERE measurement_id = $1)")
            .bind(measurement_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_err)
    }

    async fn create_tongue(
        &mut self,
        measurement_id: Uuid,
        up_path: Option<&str>,
        down_path: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO tongue_records (id, measurement_id, up_image_path, down_image_path) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(measurement_id)
        .bind(up_path)
        .bind(down_path)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn has_statistic_rows(&mut self, measurement_id: Uuid) -> StoreResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM statistic_rows WHERE measurement_id = $1)")
            .bind(measurement_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_err)
    }

    async fn create_statistic_rows(
        &mut self,
        measurement_id: Uuid,
        rows: &[StatisticRow],
    ) -> StoreResult<()> {
        for (seq, row) in rows.iter().enumerate() {
            let values = serde_json::to_value(&row.values)
                .map_err(|e| StoreError::Database(format!("failed to encode row values: {e}")))?;

            sqlx::query(
                "INSERT INTO statistic_rows (id, measurement_id, seq, statistic, hand, position, \
                 row_values) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(Uuid::new_v4())
            .bind(measurement_id)
            .bind(seq as i32)
            .bind(&row.statistic)
            .bind(&row.hand)
            .bind(&row.position)
            .bind(values)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_err)?;
        }
        Ok(())
    }

    async fn has_raw_waveform(&mut self, measurement_id: Uuid) -> StoreResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM raw_waveforms WHERE measurement_id = $1)")
            .bind(measurement_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_err)
    }

    async fn create_raw_waveform(
        &mut self,
        measurement_id: Uuid,
        waveforms: &WaveformSet,
    ) -> StoreResult<()> {
        let tables = serde_json::to_value(waveforms)
            .map_err(|e| StoreError::Database(format!("failed to encode waveforms: {e}")))?;

        sqlx::query("INSERT INTO raw_waveforms (id, measurement_id, tables) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(measurement_id)
            .bind(tables)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(map_db_err)
    }
}

/// Map a sqlx error, turning uniqueness violations into [`StoreError::Conflict`].
fn map_db_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Database(err.to_string())
}

fn parse_file_status(raw: &str) -> StoreResult<FileStatus> {
    FileStatus::parse(raw)
        .ok_or_else(|| StoreError::Database(format!("unrecognized file status '{raw}'")))
}

fn parse_upload_status(raw: &str) -> StoreResult<UploadStatus> {
    UploadStatus::parse(raw)
        .ok_or_else(|| StoreError::Database(format!("unrecognized upload status '{raw}'")))
}

#[derive(FromRow)]
struct SubjectRow {
    id: Uuid,
    sid: String,
    project_no: String,
    name: Option<String>,
    birth_date: Option<NaiveDate>,
    sex: Option<String>,
    last_measure_time: Option<DateTime<Utc>>,
}

impl From<SubjectRow> for Subject {
    fn from(row: SubjectRow) -> Self {
        Subject {
            id: row.id,
            sid: row.sid,
            project_no: row.project_no,
            name: row.name,
            birth_date: row.birth_date,
            // Unknown device codes are stored verbatim but read back as
            // unrecorded.
            sex: row.sex.as_deref().and_then(Sex::parse),
            last_measure_time: row.last_measure_time,
        }
    }
}

#[derive(FromRow)]
struct MeasurementRow {
    id: Uuid,
    subject_id: Uuid,
    source_file_id: Option<Uuid>,
    measure_time: DateTime<Utc>,
    height_cm: Option<f64>,
    weight_kg: Option<f64>,
    age_years: Option<i32>,
    bmi: Option<f64>,
    strength: Option<i16>,
    mean_prop_pct_1: Option<i32>,
    mean_prop_pct_2: Option<i32>,
    mean_prop_pct_3: Option<i32>,
    mean_prop_range_max: Option<i16>,
    max_amp_depth_zone: Option<i16>,
    has_low_pass_rate: bool,
    device_version: Option<String>,
}

impl From<MeasurementRow> for Measurement {
    fn from(row: MeasurementRow) -> Self {
        Measurement {
            id: row.id,
            subject_id: row.subject_id,
            source_file_id: row.source_file_id,
            measure_time: row.measure_time,
            height_cm: row.height_cm,
            weight_kg: row.weight_kg,
            age_years: row.age_years,
            bmi: row.bmi,
            strength: row.strength,
            mean_prop_pct_1: row.mean_prop_pct_1,
            mean_prop_pct_2: row.mean_prop_pct_2,
            mean_prop_pct_3: row.mean_prop_pct_3,
            mean_prop_range_max: row.mean_prop_range_max,
            max_amp_depth_zone: row.max_amp_depth_zone,
            has_low_pass_rate: row.has_low_pass_rate,
            device_version: row.device_version,
        }
    }
}

#[derive(FromRow)]
struct FileRow {
    id: Uuid,
    upload_id: Uuid,
    blob_path: String,
    original_name: Option<String>,
    status: String,
    valid: Option<bool>,
    memo: Option<String>,
}

impl TryFrom<FileRow> for FileRecord {
    type Error = StoreError;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        Ok(FileRecord {
            id: row.id,
            upload_id: row.upload_id,
            blob_path: row.blob_path,
            original_name: row.original_name,
            status: parse_file_status(&row.status)?,
            valid: row.valid,
            memo: row.memo,
        })
    }
}

#[derive(FromRow)]
struct UploadRow {
    id: Uuid,
    started_at: DateTime<Utc>,
    status: String,
}

impl TryFrom<UploadRow> for UploadRecord {
    type Error = StoreError;

    fn try_from(row: UploadRow) -> Result<Self, Self::Error> {
        Ok(UploadRecord {
            id: row.id,
            started_at: row.started_at,
            status: parse_upload_status(&row.status)?,
        })
    }
}

/// Database schema, applied statement by statement by [`Registry::migrate`].
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS subjects (
    id UUID PRIMARY KEY,
    sid VARCHAR(100) NOT NULL,
    project_no VARCHAR(100) NOT NULL,
    name TEXT,
    birth_date DATE,
    sex VARCHAR(1),
    last_measure_time TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE(sid, project_no)
);

CREATE TABLE IF NOT EXISTS uploads (
    id UUID PRIMARY KEY,
    started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    status VARCHAR(20) NOT NULL DEFAULT 'processing'
);

CREATE TABLE IF NOT EXISTS upload_files (
    id UUID PRIMARY KEY,
    upload_id UUID NOT NULL REFERENCES uploads(id) ON DELETE CASCADE,
    blob_path TEXT NOT NULL,
    original_name TEXT,
    status VARCHAR(20) NOT NULL DEFAULT 'pending',
    valid BOOLEAN,
    memo TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS measurements (
    id UUID PRIMARY KEY,
    subject_id UUID NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
    source_file_id UUID REFERENCES upload_files(id) ON DELETE SET NULL,
    measure_time TIMESTAMPTZ NOT NULL,
    height_cm DOUBLE PRECISION,
    weight_kg DOUBLE PRECISION,
    age_years INTEGER,
    bmi DOUBLE PRECISION,
    strength SMALLINT,
    mean_prop_pct_1 INTEGER,
    mean_prop_pct_2 INTEGER,
    mean_prop_pct_3 INTEGER,
    mean_prop_range_max SMALLINT,
    max_amp_depth_zone SMALLINT,
    has_low_pass_rate BOOLEAN NOT NULL DEFAULT FALSE,
    device_version TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE(subject_id, measure_time)
);

CREATE TABLE IF NOT EXISTS bcq_records (
    id UUID PRIMARY KEY,
    measurement_id UUID NOT NULL UNIQUE REFERENCES measurements(id) ON DELETE CASCADE,
    answers JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS tongue_records (
    id UUID PRIMARY KEY,
    measurement_id UUID NOT NULL UNIQUE REFERENCES measurements(id) ON DELETE CASCADE,
    up_image_path TEXT,
    down_image_path TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS statistic_rows (
    id UUID PRIMARY KEY,
    measurement_id UUID NOT NULL REFERENCES measurements(id) ON DELETE CASCADE,
    seq INTEGER NOT NULL,
    statistic VARCHAR(50) NOT NULL,
    hand VARCHAR(10) NOT NULL,
    position VARCHAR(20) NOT NULL,
    row_values JSONB NOT NULL,
    UNIQUE(measurement_id, seq)
);

CREATE TABLE IF NOT EXISTS raw_waveforms (
    id UUID PRIMARY KEY,
    measurement_id UUID NOT NULL UNIQUE REFERENCES measurements(id) ON DELETE CASCADE,
    tables JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_upload_files_upload ON upload_files(upload_id);

CREATE INDEX IF NOT EXISTS idx_measurements_subject ON measurements(subject_id);

CREATE INDEX IF NOT EXISTS idx_measurements_source_file ON measurements(source_file_id);

CREATE INDEX IF NOT EXISTS idx_statistic_rows_measurement ON statistic_rows(measurement_id)
"#;
