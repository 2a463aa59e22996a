//! Parsers for the text members of a device pulse archive.
//!
//! Three low-level formats (colon-delimited documents, the statistics CSV,
//! tab-delimited waveform matrices) and one typed layer that turns a
//! classified member into a [`ParsedDocument`].

pub mod colon;
pub mod documents;
pub mod error;
pub mod statistics;
pub mod waveform;

pub use colon::{parse_colon_document, ColonDocument};
pub use documents::{parse_text_member, ParsedDocument, BIRTH_DATE_FORMAT, MEASURE_TIME_FORMAT};
pub use error::ParseError;
pub use statistics::parse_statistics_table;
pub use waveform::parse_waveform_table;
