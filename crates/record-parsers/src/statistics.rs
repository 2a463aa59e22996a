//! The per-position statistics table (`statistics.csv`).

use pulse_common::documents::{StatisticRow, STATISTIC_COLUMNS};

use crate::error::ParseError;

/// Minimum delimited fields a data row must carry: the three text columns
/// plus at least one numeric cell.
const MIN_ROW_FIELDS: usize = 4;

/// Parse the statistics table.
///
/// The first line is a header and is skipped unseen. Each data row is
/// `statistic,hand,position` followed by up to 33 numeric cells mapped
/// positionally onto [`STATISTIC_COLUMNS`]. Trailing separators are
/// stripped per line; blank lines are skipped; empty and `NA` cells are
/// null. Rows shorter than four fields fail with
/// [`ParseError::MalformedRow`].
pub fn parse_statistics_table(text: &str) -> Result<Vec<StatisticRow>, ParseError> {
    let mut rows = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        if index == 0 {
            continue;
        }
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let line = line.trim_end_matches(',');
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < MIN_ROW_FIELDS {
            return Err(ParseError::MalformedRow {
                row: index + 1,
                found: fields.len(),
                min: MIN_ROW_FIELDS,
            });
        }

        let mut values = vec![None; STATISTIC_COLUMNS.len()];
        for (slot, cell) in fields[3..].iter().take(STATISTIC_COLUMNS.len()).enumerate() {
            let cell = cell.trim();
            if cell.is_empty() || cell == "NA" {
                continue;
            }
            let parsed = cell.parse::<f64>().map_err(|_| ParseError::BadNumber {
                field: STATISTIC_COLUMNS[slot].to_string(),
                value: cell.to_string(),
            })?;
            values[slot] = Some(parsed);
        }

        rows.push(StatisticRow {
            statistic: fields[0].trim().to_string(),
            hand: fields[1].trim().to_string(),
            position: fields[2].trim().to_string(),
            values,
        });
    }
    Ok(rows)
}
