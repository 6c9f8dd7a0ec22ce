//! ZIP(.comapeocat / .zip) 추출 모듈
//!
//! 모든 엔트리 경로를 먼저 검사한 뒤에만 내용을 읽습니다. 손상된 아카이브나
//! 지원하지 않는 압축 방식은 에러 대신 합성(빈) 구조로 대체하여
//! 이후 단계(검증기)가 결과를 거부할 수 있게 합니다.

use std::io::{Cursor, Read};

use ::zip::read::ZipArchive;

use super::{
    check_entry_path, normalize_entry_name, ArchiveError, ArchiveResult, ExtractedArchive,
    FileSet,
};

/// 추출 한도
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZipLimits {
    /// Sum of uncompressed entry sizes
    pub max_total_bytes: u64,
}

impl Default for ZipLimits {
    fn default() -> Self {
        Self {
            max_total_bytes: 200 * 1024 * 1024,
        }
    }
}

fn degraded(reason: String) -> ExtractedArchive {
    log::warn!("{reason}; continuing with an empty configuration");
    ExtractedArchive::synthetic(reason)
}

/// Shared top-level directory of every entry, e.g. `my-config/` when the
/// archive was zipped from a folder.
fn common_root(names: &[String]) -> Option<String> {
    if names.iter().any(|name| name == "metadata.json") {
        return None;
    }
    let first = names.first()?;
    let (root, _) = first.split_once('/')?;
    let prefix = format!("{root}/");
    names
        .iter()
        .all(|name| name.starts_with(&prefix))
        .then_some(prefix)
}

/// 메모리 상의 ZIP 추출
pub fn extract_zip(bytes: &[u8], limits: &ZipLimits) -> ArchiveResult<ExtractedArchive> {
    let mut archive = match ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive,
        Err(err) => return Ok(degraded(format!("corrupt ZIP archive: {err}"))),
    };

    // 1단계: 경로 검사
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = match archive.by_index_raw(index) {
            Ok(entry) => entry,
            Err(err) => return Ok(degraded(format!("unreadable ZIP entry #{index}: {err}"))),
        };
        let name = entry.name().to_string();
        check_entry_path(&name)?;
        if !entry.is_dir() {
            entries.push((index, normalize_entry_name(&name)));
        }
    }

    let names: Vec<String> = entries.iter().map(|(_, name)| name.clone()).collect();
    let root = common_root(&names);

    // 2단계: 내용 읽기
    let mut files = FileSet::new();
    let mut total: u64 = 0;
    for (index, name) in entries {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(err) => return Ok(degraded(format!("cannot read {name}: {err}"))),
        };

        let remaining = limits.max_total_bytes.saturating_sub(total);
        let mut content = Vec::new();
        let cap = remaining.saturating_add(1);
        if let Err(err) = entry.by_ref().take(cap).read_to_end(&mut content) {
            return Ok(degraded(format!("cannot decompress {name}: {err}")));
        }

        total = total.saturating_add(content.len() as u64);
        if total > limits.max_total_bytes {
            return Err(ArchiveError::TooLarge {
                limit: limits.max_total_bytes,
            });
        }

        let path = match &root {
            Some(prefix) => name.strip_prefix(prefix.as_str()).unwrap_or(&name).to_string(),
            None => name,
        };
        if !files.insert_first(path.clone(), content) {
            log::debug!("duplicate ZIP entry ignored: {path}");
        }
    }

    log::debug!("extracted {} ZIP entries ({total} bytes)", files.len());
    Ok(ExtractedArchive::new(files))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ::zip::write::{FileOptions, ZipWriter};
    use std::io::Write;

    pub(crate) fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::<()>::default();
        for (name, content) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options.clone()).unwrap();
            } else {
                writer.start_file(*name, options.clone()).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn extracts_entries_in_order() {
        let bytes = build_zip(&[
            ("metadata.json", r#"{"name":"Demo"}"#),
            ("icons/", ""),
            ("./icons/river.svg", "<svg/>"),
        ]);

        let extracted = extract_zip(&bytes, &ZipLimits::default()).unwrap();
        assert!(!extracted.degraded);
        let names: Vec<_> = extracted.files.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["metadata.json", "icons/river.svg"]);
    }

    #[test]
    fn traversal_entry_aborts_before_reading() {
        let bytes = build_zip(&[
            ("metadata.json", "{}"),
            ("../../etc/evil.json", "{}"),
        ]);
        let err = extract_zip(&bytes, &ZipLimits::default()).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsafePath(path) if path.contains("evil")));
    }

    #[test]
    fn corrupt_archive_degrades_to_synthetic_structure() {
        let mut bytes = b"PK\x03\x04".to_vec();
        bytes.extend_from_slice(&[0xFF; 64]);
        let extracted = extract_zip(&bytes, &ZipLimits::default()).unwrap();
        assert!(extracted.degraded);
        assert!(extracted.files.contains("metadata.json"));
        assert!(extracted.files.contains("icons.svg"));
    }

    #[test]
    fn enforces_uncompressed_size_cap() {
        let big = "a".repeat(4096);
        let bytes = build_zip(&[("presets.json", &big)]);
        let limits = ZipLimits {
            max_total_bytes: 1024,
        };
        assert!(matches!(
            extract_zip(&bytes, &limits),
            Err(ArchiveError::TooLarge { limit: 1024 })
        ));
    }

    #[test]
    fn unbounded_size_cap_reads_everything() {
        let bytes = build_zip(&[("presets.json", r#"{"presets":{}}"#)]);
        let limits = ZipLimits {
            max_total_bytes: u64::MAX,
        };
        let extracted = extract_zip(&bytes, &limits).unwrap();
        assert!(!extracted.degraded);
        assert!(extracted.files.contains("presets.json"));
    }

    #[test]
    fn strips_single_wrapping_folder() {
        let bytes = build_zip(&[
            ("my-config/metadata.json", "{}"),
            ("my-config/presets.json", "{}"),
        ]);
        let extracted = extract_zip(&bytes, &ZipLimits::default()).unwrap();
        assert!(extracted.files.contains("metadata.json"));
        assert!(extracted.files.contains("presets.json"));
    }
}
