//! Archive member catalog.
//!
//! A device archive is a flat set of well-known file names plus two
//! laterality folders (`L/`, `R/`) holding waveform tables. Anything not
//! listed here is ignored by the pipeline.

/// Subject and session header document.
pub const INFOS: &str = "infos.txt";
/// Analysis-stage header document with depth-range metadata.
pub const INFOS_ANALYZE: &str = "infos_analyze.txt";
/// Operator report document.
pub const REPORT: &str = "report.txt";
/// Body-constitution questionnaire answers.
pub const BCQ: &str = "BCQ.txt";
/// Per-position pulse statistics table.
pub const STATISTICS: &str = "statistics.csv";
/// Tongue photograph, upper surface.
pub const TONGUE_UP: &str = "T_up.jpg";
/// Tongue photograph, lower surface.
pub const TONGUE_DOWN: &str = "T_down.jpg";
/// Device firmware/version descriptor.
pub const VERSION_INFO: &str = "ver.ini";

/// Waveform table file names found under each laterality folder.
///
/// Three positions (cun `cu`, guan `qu`, chi `ch`) crossed with four
/// capture modes.
pub const WAVEFORM_TABLES: [&str; 12] = [
    "6s_cu.txt",
    "6s_qu.txt",
    "6s_ch.txt",
    "all_raw_cu.txt",
    "all_raw_qu.txt",
    "all_raw_ch.txt",
    "all_static_cu.txt",
    "all_static_qu.txt",
    "all_static_ch.txt",
    "analyze_raw_cu.txt",
    "analyze_raw_qu.txt",
    "analyze_raw_ch.txt",
];

/// Classification of a recognized archive member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Infos,
    InfosAnalyze,
    Report,
    Bcq,
    Statistics,
    Waveform,
    TongueUp,
    TongueDown,
    VersionInfo,
}

impl MemberKind {
    /// Classify a member by its file name (the path with any laterality
    /// folder stripped). Returns `None` for files the pipeline ignores.
    pub fn classify(file_name: &str) -> Option<Self> {
        match file_name {
            INFOS => Some(MemberKind::Infos),
            INFOS_ANALYZE => Some(MemberKind::InfosAnalyze),
            REPORT => Some(MemberKind::Report),
            BCQ => Some(MemberKind::Bcq),
            STATISTICS => Some(MemberKind::Statistics),
            TONGUE_UP => Some(MemberKind::TongueUp),
            TONGUE_DOWN => Some(MemberKind::TongueDown),
            VERSION_INFO => Some(MemberKind::VersionInfo),
            name if WAVEFORM_TABLES.contains(&name) => Some(MemberKind::Waveform),
            _ => None,
        }
    }

    /// Whether the device writes this member encrypted. The statistics
    /// table and tongue photographs are stored in the clear; everything
    /// else goes through the archive cipher.
    pub fn is_encrypted(&self) -> bool {
        !matches!(
            self,
            MemberKind::Statistics | MemberKind::TongueUp | MemberKind::TongueDown
        )
    }

    /// Whether ingestion must fail when this member is missing or
    /// unreadable.
    pub fn is_mandatory(&self) -> bool {
        matches!(
            self,
            MemberKind::Infos
                | MemberKind::InfosAnalyze
                | MemberKind::Report
                | MemberKind::Statistics
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_recognizes_fixed_names() {
        assert_eq!(MemberKind::classify("infos.txt"), Some(MemberKind::Infos));
        assert_eq!(
            MemberKind::classify("infos_analyze.txt"),
            Some(MemberKind::InfosAnalyze)
        );
        assert_eq!(MemberKind::classify("report.txt"), Some(MemberKind::Report));
        assert_eq!(MemberKind::classify("BCQ.txt"), Some(MemberKind::Bcq));
        assert_eq!(
            MemberKind::classify("statistics.csv"),
            Some(MemberKind::Statistics)
        );
        assert_eq!(MemberKind::classify("T_up.jpg"), Some(MemberKind::TongueUp));
        assert_eq!(
            MemberKind::classify("T_down.jpg"),
            Some(MemberKind::TongueDown)
        );
        assert_eq!(
            MemberKind::classify("ver.ini"),
            Some(MemberKind::VersionInfo)
        );
    }

    #[test]
    fn classify_recognizes_all_waveform_tables() {
        for name in WAVEFORM_TABLES {
            assert_eq!(MemberKind::classify(name), Some(MemberKind::Waveform));
        }
    }

    #[test]
    fn classify_rejects_unknown_members() {
        assert_eq!(MemberKind::classify("notes.txt"), None);
        assert_eq!(MemberKind::classify("infos.TXT"), None);
        assert_eq!(MemberKind::classify(""), None);
    }

    #[test]
    fn statistics_and_photos_are_plaintext() {
        assert!(!MemberKind::Statistics.is_encrypted());
        assert!(!MemberKind::TongueUp.is_encrypted());
        assert!(!MemberKind::TongueDown.is_encrypted());
        assert!(MemberKind::Infos.is_encrypted());
        assert!(MemberKind::Waveform.is_encrypted());
        assert!(MemberKind::Bcq.is_encrypted());
    }

    #[test]
    fn four_members_are_mandatory() {
        let mandatory = [
            MemberKind::Infos,
            MemberKind::InfosAnalyze,
            MemberKind::Report,
            MemberKind::Statistics,
        ];
        for kind in mandatory {
            assert!(kind.is_mandatory());
        }
        assert!(!MemberKind::Bcq.is_mandatory());
        assert!(!MemberKind::Waveform.is_mandatory());
        assert!(!MemberKind::TongueUp.is_mandatory());
        assert!(!MemberKind::VersionInfo.is_mandatory());
    }
}
