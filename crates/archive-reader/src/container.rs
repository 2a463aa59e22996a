//! ZIP container enumeration with path-safety and size checks.

use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use zip::ZipArchive;

use pulse_common::MemberKind;

use crate::error::ArchiveError;

/// Default per-member uncompressed size ceiling (20 MB).
pub const DEFAULT_MEMBER_SIZE_LIMIT: u64 = 20 * 1024 * 1024;

/// Virtual root member paths are resolved against. Nothing is written to
/// disk; the resolution only proves a path cannot escape.
const VIRTUAL_ROOT: &str = "/archive";

/// One recognized member, content still encrypted where the device
/// encrypts it.
#[derive(Debug, Clone)]
pub struct RawMember {
    /// Full member path as stored in the archive, separators normalized.
    pub path: String,
    /// Final path component; classification runs on this.
    pub file_name: String,
    pub kind: MemberKind,
    pub data: Vec<u8>,
}

/// Reads a device archive out of an in-memory ZIP blob.
pub struct ArchiveReader {
    member_size_limit: u64,
}

impl Default for ArchiveReader {
    fn default() -> Self {
        Self::new(DEFAULT_MEMBER_SIZE_LIMIT)
    }
}

impl ArchiveReader {
    pub fn new(member_size_limit: u64) -> Self {
        Self { member_size_limit }
    }

    /// Enumerate, validate and read the recognized members of `bytes`.
    ///
    /// Every member is path-validated and size-checked before any content
    /// is read, so a traversal or oversize member anywhere in the archive
    /// aborts the whole call up front. Members not on the allow-list are
    /// skipped; duplicate paths keep the first occurrence.
    pub fn open(&self, bytes: &[u8]) -> Result<Vec<RawMember>, ArchiveError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ArchiveError::Container(e.to_string()))?;

        let base = Path::new(VIRTUAL_ROOT);
        for index in 0..archive.len() {
            let member = archive
                .by_index(index)
                .map_err(|e| ArchiveError::Container(e.to_string()))?;
            let name = member.name().to_string();
            validate_member_path(base, &name)?;
            if !member.is_dir() && member.size() > self.member_size_limit {
                return Err(ArchiveError::SizeLimit {
                    member: name,
                    size: member.size(),
                    limit: self.member_size_limit,
                });
            }
        }

        let mut seen = HashSet::new();
        let mut members = Vec::new();
        for index in 0..archive.len() {
            let mut member = archive
                .by_index(index)
                .map_err(|e| ArchiveError::Container(e.to_string()))?;
            if member.is_dir() {
                continue;
            }
            let path = member.name().replace('\\', "/");
            if !seen.insert(path.clone()) {
                warn!("duplicate archive member '{}', keeping first occurrence", path);
                continue;
            }
            let file_name = match path.rsplit('/').next() {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => continue,
            };
            let kind = match MemberKind::classify(&file_name) {
                Some(kind) => kind,
                None => {
                    debug!("skipping unrecognized member '{}'", path);
                    continue;
                }
            };

            let mut data = Vec::with_capacity(member.size() as usize);
            // The declared size can lie; re-check what actually inflates.
            let read = (&mut member)
                .take(self.member_size_limit + 1)
                .read_to_end(&mut data)?;
            if read as u64 > self.member_size_limit {
                return Err(ArchiveError::SizeLimit {
                    member: path,
                    size: read as u64,
                    limit: self.member_size_limit,
                });
            }

            members.push(RawMember {
                path,
                file_name,
                kind,
                data,
            });
        }

        debug!("archive yielded {} recognized members", members.len());
        Ok(members)
    }
}

/// Resolve a member name against `base` component by component, rejecting
/// anything that would land outside it (absolute paths, `..` escapes).
///
/// Separators are normalized first so backslash names from Windows-built
/// archives cannot smuggle components past the walk.
pub fn validate_member_path(base: &Path, name: &str) -> Result<PathBuf, ArchiveError> {
    let traversal = || ArchiveError::PathTraversal {
        member: name.to_string(),
    };

    let normalized = name.replace('\\', "/");
    let mut resolved = base.to_path_buf();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return Err(traversal()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() || !resolved.starts_with(base) {
                    return Err(traversal());
                }
            }
            Component::Normal(part) => resolved.push(part),
        }
    }
    if resolved.starts_with(base) {
        Ok(resolved)
    } else {
        Err(traversal())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;

    fn build_zip(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in members {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn open_reads_recognized_members_and_skips_the_rest() {
        let bytes = build_zip(&[
            ("infos.txt", b"sid:A1"),
            ("L/6s_cu.txt", b"1\t2"),
            ("R/6s_cu.txt", b"3\t4"),
            ("thumbs.db", b"junk"),
        ]);
        let members = ArchiveReader::default().open(&bytes).unwrap();
        assert_eq!(members.len(), 3);
        assert_eq!(members[0].file_name, "infos.txt");
        assert_eq!(members[0].kind, MemberKind::Infos);
        assert_eq!(members[1].path, "L/6s_cu.txt");
        assert_eq!(members[1].kind, MemberKind::Waveform);
        assert_eq!(members[2].path, "R/6s_cu.txt");
    }

    #[test]
    fn open_rejects_traversal_before_reading_anything() {
        let bytes = build_zip(&[
            ("infos.txt", b"sid:A1"),
            ("../../etc/passwd", b"root:x:0:0"),
        ]);
        let err = ArchiveReader::default().open(&bytes).unwrap_err();
        assert!(matches!(err, ArchiveError::PathTraversal { ref member } if member.contains("passwd")));
    }

    #[test]
    fn open_rejects_oversize_member() {
        let big = vec![0u8; 64];
        let bytes = build_zip(&[("infos.txt", &big)]);
        let err = ArchiveReader::new(16).open(&bytes).unwrap_err();
        match err {
            ArchiveError::SizeLimit { member, limit, .. } => {
                assert_eq!(member, "infos.txt");
                assert_eq!(limit, 16);
            }
            other => panic!("expected size limit error, got {other:?}"),
        }
    }

    #[test]
    fn open_rejects_garbage_container() {
        let err = ArchiveReader::default().open(b"not a zip").unwrap_err();
        assert!(matches!(err, ArchiveError::Container(_)));
    }

    #[test]
    fn open_keeps_first_of_duplicate_paths() {
        let bytes = build_zip(&[("infos.txt", b"sid:first"), ("infos.txt", b"sid:second")]);
        let members = ArchiveReader::default().open(&bytes).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].data, b"sid:first");
    }

    #[test]
    fn validate_accepts_plain_and_nested_names() {
        let base = Path::new("/archive");
        assert!(validate_member_path(base, "infos.txt").is_ok());
        assert!(validate_member_path(base, "L/6s_cu.txt").is_ok());
        assert!(validate_member_path(base, "a/../b.txt").is_ok());
        assert!(validate_member_path(base, "./infos.txt").is_ok());
    }

    #[test]
    fn validate_rejects_escapes() {
        let base = Path::new("/archive");
        assert!(validate_member_path(base, "../outside.txt").is_err());
        assert!(validate_member_path(base, "a/../../outside.txt").is_err());
        assert!(validate_member_path(base, "/etc/passwd").is_err());
        assert!(validate_member_path(base, "..\\..\\outside.txt").is_err());
    }
}
