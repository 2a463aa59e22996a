//! Error types for document parsing.
//!
//! All of these are recoverable at the pipeline level: the member that
//! produced them is dropped and the error text lands in the file memo.

use thiserror::Error;

/// Errors from parsing one archive member.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A colon-document field occurred more than once. Names the most
    /// frequent duplicate.
    #[error("field '{field}' appears {count} times")]
    DuplicateField { field: String, count: usize },

    /// A colon-document line with no pair or more than one pair.
    #[error("malformed line: '{line}'")]
    MalformedLine { line: String },

    /// A statistics row with too few fields.
    #[error("row {row} has {found} fields, expected at least {min}")]
    MalformedRow { row: usize, found: usize, min: usize },

    /// A waveform member whose path names neither laterality.
    #[error("cannot infer laterality from member path '{path}'")]
    UnknownLaterality { path: String },

    /// A date or timestamp field that does not match the device pattern.
    #[error("field '{field}' has unparsable timestamp '{value}'")]
    BadTimestamp { field: String, value: String },

    /// A numeric field that does not parse.
    #[error("field '{field}' has unparsable number '{value}'")]
    BadNumber { field: String, value: String },

    /// A coded field with a value outside its code table.
    #[error("field '{field}' has out-of-range code '{value}'")]
    BadCode { field: String, value: String },

    /// A field the document schema requires was absent or null.
    #[error("required field '{field}' is missing")]
    MissingField { field: String },

    /// A binary member was handed to the text parser.
    #[error("member '{member}' carries binary content, not a parsable document")]
    NotTextual { member: String },
}
