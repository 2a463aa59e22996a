//! Tab-delimited waveform matrices.

use pulse_common::documents::WaveformTable;
use pulse_common::types::Laterality;

use crate::error::ParseError;

/// Parse one waveform member into a numeric matrix.
///
/// Laterality comes from the member path (`L/` or `R/` folder), not the
/// content; a path naming neither side is
/// [`ParseError::UnknownLaterality`]. Rows may differ in length; blank
/// lines and empty cells are skipped.
pub fn parse_waveform_table(text: &str, path: &str) -> Result<WaveformTable, ParseError> {
    let laterality =
        Laterality::from_member_path(path).ok_or_else(|| ParseError::UnknownLaterality {
            path: path.to_string(),
        })?;

    let name = match path.rsplit('/').next() {
        Some(last) if !last.is_empty() => last.to_string(),
        _ => path.to_string(),
    };

    let mut rows = Vec::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let mut row = Vec::new();
        for cell in line.split('\t') {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            let sample = cell.parse::<f64>().map_err(|_| ParseError::BadNumber {
                field: name.clone(),
                value: cell.to_string(),
            })?;
            row.push(sample);
        }
        if !row.is_empty() {
            rows.push(row);
        }
    }

    Ok(WaveformTable {
        name,
        laterality,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_matrix_and_infers_left() {
        let table = parse_waveform_table("1.0\t2.0\t3.0\n4.5\t5.5\n", "L/6s_cu.txt").unwrap();
        assert_eq!(table.laterality, Laterality::Left);
        assert_eq!(table.name, "6s_cu.txt");
        assert_eq!(table.rows, vec![vec![1.0, 2.0, 3.0], vec![4.5, 5.5]]);
    }

    #[test]
    fn infers_right_from_path() {
        let table = parse_waveform_table("0.5\n", "R/all_raw_ch.txt").unwrap();
        assert_eq!(table.laterality, Laterality::Right);
        assert_eq!(table.name, "all_raw_ch.txt");
    }

    #[test]
    fn path_without_laterality_is_rejected() {
        let err = parse_waveform_table("1.0\n", "6s_cu.txt").unwrap_err();
        assert!(matches!(err, ParseError::UnknownLaterality { ref path } if path == "6s_cu.txt"));
    }

    #[test]
    fn non_numeric_sample_is_rejected() {
        let err = parse_waveform_table("1.0\tx\n", "L/6s_qu.txt").unwrap_err();
        assert!(matches!(err, ParseError::BadNumber { ref value, .. } if value == "x"));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let table = parse_waveform_table("\n1.0\n\n2.0\n\n", "L/6s_ch.txt").unwrap();
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn negative_and_scientific_samples_parse() {
        let table = parse_waveform_table("-1.5\t2e3\n", "R/analyze_raw_cu.txt").unwrap();
        assert_eq!(table.rows, vec![vec![-1.5, 2000.0]]);
    }
}
