//! Derived metrics computed from the parsed documents.
//!
//! Pure functions; every one of them answers `None` (or `false`) when its
//! inputs are incomplete rather than guessing.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::warn;

use pulse_common::documents::StatisticRow;

/// Relative widths of the three depth zones within the amplitude range.
pub const DEPTH_ZONE_RATIO: (f64, f64, f64) = (3.0, 4.0, 3.0);

/// Default pass-rate threshold below which a statistics row flags the
/// measurement.
pub const DEFAULT_PASS_RATE_THRESHOLD: f64 = 50.0;

/// Percentage shares of the three mean proportional ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeShares {
    pub pct_1: i32,
    pub pct_2: i32,
    pub pct_3: i32,
    /// 0-based index of the largest raw input; first index wins ties.
    pub largest: i16,
}

/// Share of each range in the total, rounded to whole percent, plus which
/// raw input was largest. `None` if any input is absent or the sum is
/// zero.
pub fn mean_prop_ranges(r1: Option<f64>, r2: Option<f64>, r3: Option<f64>) -> Option<RangeShares> {
    let (r1, r2, r3) = (r1?, r2?, r3?);
    let sum = r1 + r2 + r3;
    if sum == 0.0 {
        return None;
    }

    let raw = [r1, r2, r3];
    let mut largest = 0;
    for (index, value) in raw.iter().enumerate() {
        if *value > raw[largest] {
            largest = index;
        }
    }

    let pct = |r: f64| (100.0 * r / sum).round() as i32;
    Some(RangeShares {
        pct_1: pct(r1),
        pct_2: pct(r2),
        pct_3: pct(r3),
        largest: largest as i16,
    })
}

/// Depth zone of the maximum-amplitude sample within its range.
///
/// The range splits into three zones sized by [`DEPTH_ZONE_RATIO`]. Zone
/// boundaries are half-open from below, so a value exactly on the first
/// boundary lands in zone 1, and the range end itself closes zone 2. A
/// value outside the range is a device anomaly: logged, no zone.
pub fn max_amp_depth_zone(
    range_start: Option<f64>,
    range_end: Option<f64>,
    max_value: Option<f64>,
) -> Option<i16> {
    let (start, end, value) = (range_start?, range_end?, max_value?);
    if value < start || value > end {
        warn!(
            "max amplitude {} outside depth range [{}, {}]",
            value, start, end
        );
        return None;
    }

    let (lower, middle, upper) = DEPTH_ZONE_RATIO;
    let total = lower + middle + upper;
    let span = end - start;
    let v1 = start + span * lower / total;
    let v2 = start + span * (lower + middle) / total;

    if value < v1 {
        Some(0)
    } else if value < v2 {
        Some(1)
    } else {
        Some(2)
    }
}

/// Calendar-aware age in whole years at measure time.
pub fn age_in_years(
    measure_time: Option<DateTime<Utc>>,
    birth_date: Option<NaiveDate>,
) -> Option<i32> {
    let (measured, birth) = (measure_time?, birth_date?);
    let measured = measured.date_naive();
    let mut years = measured.year() - birth.year();
    if (measured.month(), measured.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    Some(years)
}

/// Body mass index from height in centimeters and weight in kilograms.
pub fn bmi(height_cm: Option<f64>, weight_kg: Option<f64>) -> Option<f64> {
    let (height, weight) = (height_cm?, weight_kg?);
    if height <= 0.0 {
        return None;
    }
    let meters = height / 100.0;
    Some(weight / (meters * meters))
}

/// Whether any statistics row recorded a pass rate strictly below the
/// threshold.
pub fn has_low_pass_rate(rows: &[StatisticRow], threshold: f64) -> bool {
    rows.iter()
        .any(|row| row.pass_rate().map(|rate| rate < threshold).unwrap_or(false))
}
