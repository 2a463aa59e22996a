//! Small value types shared across the ingestion pipeline.

use serde::{Deserialize, Serialize};

/// Biological sex as recorded by the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    /// Single-letter code used in device files and database rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
        }
    }

    /// Parse the device code. Anything other than `M`/`F` is treated as
    /// unrecorded rather than an error.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "M" => Some(Sex::Male),
            "F" => Some(Sex::Female),
            _ => None,
        }
    }
}

/// Which wrist a waveform table was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Laterality {
    Left,
    Right,
}

impl Laterality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Laterality::Left => "L",
            Laterality::Right => "R",
        }
    }

    /// Derive laterality from a member path inside the archive.
    ///
    /// Device archives place waveform tables under `L/` and `R/` folders,
    /// so the presence of the letter anywhere in the path decides the side.
    /// `L` is checked before `R` to keep the decision deterministic for
    /// paths containing both.
    pub fn from_member_path(path: &str) -> Option<Self> {
        if path.contains('L') {
            Some(Laterality::Left)
        } else if path.contains('R') {
            Some(Laterality::Right)
        } else {
            None
        }
    }
}

/// Lifecycle status of one uploaded archive file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Pending,
    Succeeded,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Succeeded => "success",
            FileStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FileStatus::Pending),
            "success" => Some(FileStatus::Succeeded),
            "failed" => Some(FileStatus::Failed),
            _ => None,
        }
    }
}

/// Aggregate status of an upload batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    Processing,
    Succeeded,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Processing => "processing",
            UploadStatus::Succeeded => "success",
            UploadStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(UploadStatus::Processing),
            "success" => Some(UploadStatus::Succeeded),
            "failed" => Some(UploadStatus::Failed),
            _ => None,
        }
    }
}

/// Natural key identifying a subject within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectKey {
    pub sid: String,
    pub project_no: String,
}

impl SubjectKey {
    pub fn new(sid: impl Into<String>, project_no: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            project_no: project_no.into(),
        }
    }
}
