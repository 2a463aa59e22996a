//! Typed documents: coercion from raw colon documents and the per-member
//! dispatch used by the ingestion pipeline.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use pulse_common::documents::{
    BcqDoc, InfosAnalyzeDoc, InfosDoc, ReportDoc, StatisticRow, WaveformTable, BCQ_ITEM_COUNT,
};
use pulse_common::members::MemberKind;
use pulse_common::types::Sex;

use crate::colon::{parse_colon_document, ColonDocument};
use crate::error::ParseError;
use crate::statistics::parse_statistics_table;
use crate::waveform::parse_waveform_table;

/// Device timestamp pattern, e.g. `20240101100000`.
pub const MEASURE_TIME_FORMAT: &str = "%Y%m%d%H%M%S";
/// Device birth date pattern, e.g. `1985/03/20`.
pub const BIRTH_DATE_FORMAT: &str = "%Y/%m/%d";

/// One parsed archive member, tagged by document type.
#[derive(Debug, Clone)]
pub enum ParsedDocument {
    Infos(InfosDoc),
    InfosAnalyze(InfosAnalyzeDoc),
    Report(ReportDoc),
    Bcq(BcqDoc),
    Statistics(Vec<StatisticRow>),
    Waveform(WaveformTable),
    VersionInfo(String),
}

/// Parse a decrypted text member into its typed document.
///
/// `path` is the member path (used for waveform laterality); `kind` must
/// be a text-bearing member.
pub fn parse_text_member(
    kind: MemberKind,
    path: &str,
    text: &str,
) -> Result<ParsedDocument, ParseError> {
    match kind {
        MemberKind::Infos => {
            let doc = parse_colon_document(text)?;
            Ok(ParsedDocument::Infos(infos_from(&doc)?))
        }
        MemberKind::InfosAnalyze => {
            let doc = parse_colon_document(text)?;
            Ok(ParsedDocument::InfosAnalyze(infos_analyze_from(&doc)?))
        }
        MemberKind::Report => {
            let doc = parse_colon_document(text)?;
            Ok(ParsedDocument::Report(report_from(&doc)?))
        }
        MemberKind::Bcq => {
            let doc = parse_colon_document(text)?;
            Ok(ParsedDocument::Bcq(bcq_from(&doc)?))
        }
        MemberKind::Statistics => Ok(ParsedDocument::Statistics(parse_statistics_table(text)?)),
        MemberKind::Waveform => Ok(ParsedDocument::Waveform(parse_waveform_table(text, path)?)),
        MemberKind::VersionInfo => Ok(ParsedDocument::VersionInfo(text.trim().to_string())),
        MemberKind::TongueUp | MemberKind::TongueDown => Err(ParseError::NotTextual {
            member: path.to_string(),
        }),
    }
}

fn infos_from(doc: &ColonDocument) -> Result<InfosDoc, ParseError> {
    let sid = required(doc, "sid")?.to_string();
    let measure_time = parse_measure_time("measure_time", required(doc, "measure_time")?)?;
    Ok(InfosDoc {
        sid,
        measure_time,
        project_no: doc.value("project_no").map(str::to_string),
        name: doc.value("name").map(str::to_string),
        birth_date: doc
            .value("birth")
            .map(|v| parse_birth_date("birth", v))
            .transpose()?,
        sex: doc.value("sex").and_then(Sex::parse),
        height_cm: doc
            .value("height")
            .map(|v| parse_f64("height", v))
            .transpose()?,
        weight_kg: doc
            .value("weight")
            .map(|v| parse_f64("weight", v))
            .transpose()?,
    })
}

fn infos_analyze_from(doc: &ColonDocument) -> Result<InfosAnalyzeDoc, ParseError> {
    Ok(InfosAnalyzeDoc {
        sid: doc.value("sid").map(str::to_string),
        measure_time: doc
            .value("measure_time")
            .map(|v| parse_measure_time("measure_time", v))
            .transpose()?,
        range_1: doc
            .value("range_1")
            .map(|v| parse_f64("range_1", v))
            .transpose()?,
        range_2: doc
            .value("range_2")
            .map(|v| parse_f64("range_2", v))
            .transpose()?,
        range_3: doc
            .value("range_3")
            .map(|v| parse_f64("range_3", v))
            .transpose()?,
        max_amp_range_start: doc
            .value("max_amp_range_start")
            .map(|v| parse_f64("max_amp_range_start", v))
            .transpose()?,
        max_amp_range_end: doc
            .value("max_amp_range_end")
            .map(|v| parse_f64("max_amp_range_end", v))
            .transpose()?,
        max_amp_value: doc
            .value("max_amp_value")
            .map(|v| parse_f64("max_amp_value", v))
            .transpose()?,
    })
}

fn report_from(doc: &ColonDocument) -> Result<ReportDoc, ParseError> {
    Ok(ReportDoc {
        strength: doc
            .value("strength")
            .map(|v| remap_strength("strength", v))
            .transpose()?,
        summary: doc.value("summary").map(str::to_string),
    })
}

fn bcq_from(doc: &ColonDocument) -> Result<BcqDoc, ParseError> {
    let mut answers = Vec::with_capacity(BCQ_ITEM_COUNT);
    for item in 1..=BCQ_ITEM_COUNT {
        let field = format!("q{item:02}");
        let answer = doc
            .value(&field)
            .map(|v| parse_i64(&field, v))
            .transpose()?;
        answers.push(answer);
    }
    Ok(BcqDoc::new(answers))
}

/// Remap the device strength code into storage order. Firmware emits the
/// scale inverted (0 is the strongest), so codes 0 and 2 swap.
fn remap_strength(field: &str, value: &str) -> Result<i16, ParseError> {
    match value {
        "0" => Ok(2),
        "1" => Ok(1),
        "2" => Ok(0),
        other => Err(ParseError::BadCode {
            field: field.to_string(),
            value: other.to_string(),
        }),
    }
}

fn required<'a>(doc: &'a ColonDocument, field: &str) -> Result<&'a str, ParseError> {
    doc.value(field).ok_or_else(|| ParseError::MissingField {
        field: field.to_string(),
    })
}

fn parse_measure_time(field: &str, value: &str) -> Result<DateTime<Utc>, ParseError> {
    let naive = NaiveDateTime::parse_from_str(value, MEASURE_TIME_FORMAT).map_err(|_| {
        ParseError::BadTimestamp {
            field: field.to_string(),
            value: value.to_string(),
        }
    })?;
    Ok(Utc.from_utc_datetime(&naive))
}

fn parse_birth_date(field: &str, value: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(value, BIRTH_DATE_FORMAT).map_err(|_| ParseError::BadTimestamp {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(field: &str, value: &str) -> Result<f64, ParseError> {
    value.parse::<f64>().map_err(|_| ParseError::BadNumber {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(field: &str, value: &str) -> Result<i64, ParseError> {
    value.parse::<i64>().map_err(|_| ParseError::BadNumber {
        field: field.to_string(),
        value: value.to_string(),
    })
}
