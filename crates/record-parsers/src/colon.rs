//! Colon-delimited `field:value` documents.
//!
//! The format is one pair per line, split at the first colon. The device
//! never writes a second colon on a line (timestamps are compact digit
//! strings), so one is treated as corruption rather than part of the
//! value.

use std::collections::HashMap;

use crate::error::ParseError;

/// A parsed colon document. Values hold `None` where the device wrote the
/// literal `NA`.
#[derive(Debug, Clone, Default)]
pub struct ColonDocument {
    fields: HashMap<String, Option<String>>,
}

impl ColonDocument {
    /// Non-null value of a field, if the document carries one.
    pub fn value(&self, field: &str) -> Option<&str> {
        self.fields.get(field)?.as_deref()
    }

    /// Whether the field appears at all, null or not.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Number of distinct fields in the document.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Parse a colon-delimited document.
///
/// Blank lines are skipped. A line without a colon, or with a second
/// colon, is [`ParseError::MalformedLine`]. A field name occurring more
/// than once is [`ParseError::DuplicateField`] naming the most frequent
/// duplicate and its count.
pub fn parse_colon_document(text: &str) -> Result<ColonDocument, ParseError> {
    let mut fields: HashMap<String, Option<String>> = HashMap::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let (field, value) = line.split_once(':').ok_or_else(|| ParseError::MalformedLine {
            line: line.to_string(),
        })?;
        if value.contains(':') {
            return Err(ParseError::MalformedLine {
                line: line.to_string(),
            });
        }
        let field = field.trim().to_string();
        let value = value.trim();
        let value = if value == "NA" {
            None
        } else {
            Some(value.to_string())
        };
        *counts.entry(field.clone()).or_insert(0) += 1;
        fields.insert(field, value);
    }

    let duplicate = counts
        .iter()
        .filter(|(_, count)| **count > 1)
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)));
    if let Some((field, count)) = duplicate {
        return Err(ParseError::DuplicateField {
            field: field.clone(),
            count: *count,
        });
    }

    Ok(ColonDocument { fields })
}
