//! Typed documents produced by the record parsers.
//!
//! These are transient, in-memory views of the archive members. They carry
//! exactly what later stages consume; anything the device writes beyond
//! these fields is dropped at parse time.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Laterality, Sex};

/// Number of questionnaire items in a complete `BCQ.txt`.
pub const BCQ_ITEM_COUNT: usize = 44;

/// Positional numeric column names of the statistics table, in file order.
/// A row maps its 4th..36th fields onto these; shorter rows leave the tail
/// unset.
pub const STATISTIC_COLUMNS: [&str; 33] = [
    "hr",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "t1",
    "t2",
    "t3",
    "t4",
    "t5",
    "t_cycle",
    "w1",
    "w2",
    "h2_div_h1",
    "h3_div_h1",
    "h4_div_h1",
    "h5_div_h1",
    "t1_div_t",
    "t4_div_t",
    "t5_div_t",
    "w1_div_t",
    "w2_div_t",
    "area_systolic",
    "area_diastolic",
    "area_ratio",
    "slope_up",
    "slope_down",
    "pulse_width",
    "amp_sd",
    "amp_cv",
    "snr",
    "pass_rate",
];

/// Session header from `infos.txt`. `sid` and `measure_time` are the only
/// fields the device always writes.
#[derive(Debug, Clone, PartialEq)]
pub struct InfosDoc {
    pub sid: String,
    pub measure_time: DateTime<Utc>,
    pub project_no: Option<String>,
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<Sex>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
}

/// Analysis header from `infos_analyze.txt`: depth-range inputs for the
/// derived metrics.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InfosAnalyzeDoc {
    pub sid: Option<String>,
    pub measure_time: Option<DateTime<Utc>>,
    pub range_1: Option<f64>,
    pub range_2: Option<f64>,
    pub range_3: Option<f64>,
    pub max_amp_range_start: Option<f64>,
    pub max_amp_range_end: Option<f64>,
    pub max_amp_value: Option<f64>,
}

/// Operator report from `report.txt`. `strength` is stored post-remap.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportDoc {
    pub strength: Option<i16>,
    pub summary: Option<String>,
}

/// Questionnaire answers from `BCQ.txt`, indexed `q01..q44`. Unanswered
/// items are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BcqDoc {
    pub answers: Vec<Option<i64>>,
}

impl BcqDoc {
    pub fn new(answers: Vec<Option<i64>>) -> Self {
        Self { answers }
    }

    /// How many items carry an answer.
    pub fn answered(&self) -> usize {
        self.answers.iter().filter(|a| a.is_some()).count()
    }
}

/// One data row of `statistics.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticRow {
    pub statistic: String,
    pub hand: String,
    pub position: String,
    /// Numeric cells in `STATISTIC_COLUMNS` order. Absent or `NA` cells
    /// are `None`.
    pub values: Vec<Option<f64>>,
}

impl StatisticRow {
    /// Look up a numeric cell by column name.
    pub fn value(&self, column: &str) -> Option<f64> {
        let idx = STATISTIC_COLUMNS.iter().position(|c| *c == column)?;
        self.values.get(idx).copied().flatten()
    }

    /// Signal-quality pass rate for this row, when recorded.
    pub fn pass_rate(&self) -> Option<f64> {
        self.value("pass_rate")
    }
}

/// One tab-delimited waveform matrix plus where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformTable {
    /// Base file name, e.g. `6s_cu.txt`.
    pub name: String,
    pub laterality: Laterality,
    pub rows: Vec<Vec<f64>>,
}

/// All waveform tables recovered from one archive, in member order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WaveformSet {
    pub tables: Vec<WaveformTable>,
}

impl WaveformSet {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn push(&mut self, table: WaveformTable) {
        self.tables.push(table);
    }
}
