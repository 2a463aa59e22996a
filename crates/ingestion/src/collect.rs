//! Member collection: extract, decrypt and parse one archive into its
//! document bundle.

use tracing::warn;

use archive_reader::{ArchiveCipher, ArchiveReader, RawMember};
use pulse_common::documents::{
    BcqDoc, InfosAnalyzeDoc, InfosDoc, ReportDoc, StatisticRow, WaveformSet,
};
use pulse_common::members::{self, MemberKind};
use record_parsers::{parse_text_member, ParsedDocument};

use crate::accumulator::ParseFailures;
use crate::error::Result;

/// Everything recovered from one archive. Members that failed a
/// recoverable parse leave their slot empty and an entry in the
/// accumulator.
#[derive(Debug, Default)]
pub struct ArchiveDocuments {
    pub infos: Option<InfosDoc>,
    pub infos_analyze: Option<InfosAnalyzeDoc>,
    pub report: Option<ReportDoc>,
    pub bcq: Option<BcqDoc>,
    pub statistics: Option<Vec<StatisticRow>>,
    pub waveforms: WaveformSet,
    pub tongue_up: Option<Vec<u8>>,
    pub tongue_down: Option<Vec<u8>>,
    pub version: Option<String>,
}

impl ArchiveDocuments {
    /// Names of the mandatory documents that are absent or unusable.
    pub fn missing_mandatory(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.infos.is_none() {
            missing.push(members::INFOS);
        }
        if self.infos_analyze.is_none() {
            missing.push(members::INFOS_ANALYZE);
        }
        if self.report.is_none() {
            missing.push(members::REPORT);
        }
        if self.statistics.is_none() {
            missing.push(members::STATISTICS);
        }
        missing
    }
}

/// Extract, decrypt and parse the recognized members of `bytes`.
///
/// Recoverable parse failures land in `failures` and leave their slot
/// empty. Fatal failures (bad container, traversal, oversize member,
/// mandatory-member decryption) abort the whole call.
pub fn collect_documents(
    reader: &ArchiveReader,
    cipher: &ArchiveCipher,
    bytes: &[u8],
    failures: &mut ParseFailures,
) -> Result<ArchiveDocuments> {
    let mut docs = ArchiveDocuments::default();
    for member in reader.open(bytes)? {
        collect_member(cipher, member, &mut docs, failures)?;
    }
    Ok(docs)
}

fn collect_member(
    cipher: &ArchiveCipher,
    member: RawMember,
    docs: &mut ArchiveDocuments,
    failures: &mut ParseFailures,
) -> Result<()> {
    let RawMember {
        path, kind, data, ..
    } = member;

    if matches!(kind, MemberKind::TongueUp | MemberKind::TongueDown) {
        let slot = if kind == MemberKind::TongueUp {
            &mut docs.tongue_up
        } else {
            &mut docs.tongue_down
        };
        if slot.is_some() {
            warn!("duplicate member '{}', keeping first occurrence", path);
        } else {
            *slot = Some(data);
        }
        return Ok(());
    }

    let plaintext = if kind.is_encrypted() {
        match cipher.decrypt(&path, &data) {
            Ok(plaintext) => plaintext,
            Err(err) if kind.is_mandatory() => return Err(err.into()),
            Err(_) => {
                warn!("dropping undecryptable optional member '{}'", path);
                return Ok(());
            }
        }
    } else {
        data
    };

    let text = String::from_utf8_lossy(&plaintext);
    match parse_text_member(kind, &path, &text) {
        Ok(parsed) => place(docs, parsed, &path),
        Err(err) => failures.record(&path, err),
    }
    Ok(())
}

fn place(docs: &mut ArchiveDocuments, parsed: ParsedDocument, path: &str) {
    match parsed {
        ParsedDocument::Infos(doc) => set_once(&mut docs.infos, doc, path),
        ParsedDocument::InfosAnalyze(doc) => set_once(&mut docs.infos_analyze, doc, path),
        ParsedDocument::Report(doc) => set_once(&mut docs.report, doc, path),
        ParsedDocument::Bcq(doc) => set_once(&mut docs.bcq, doc, path),
        ParsedDocument::Statistics(rows) => set_once(&mut docs.statistics, rows, path),
        ParsedDocument::VersionInfo(version) => set_once(&mut docs.version, version, path),
        ParsedDocument::Waveform(table) => {
            let duplicate = docs
                .waveforms
                .tables
                .iter()
                .any(|t| t.name == table.name && t.laterality == table.laterality);
            if duplicate {
                warn!("duplicate waveform member '{}', keeping first occurrence", path);
            } else {
                docs.waveforms.push(table);
            }
        }
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, path: &str) {
    if slot.is_some() {
        warn!("duplicate member '{}', keeping first occurrence", path);
    } else {
        *slot = Some(value);
    }
}
