//! 업로드된 설정 아카이브 처리 모듈
//!
//! ZIP(.comapeocat), tar(.mapeosettings), 순수 JSON 입력을 감지하고
//! 내부 파일을 메모리로 추출합니다. 추출된 모든 경로는 저장 전에
//! 경로 조작(`../`, 절대 경로) 검사를 거칩니다.

pub mod detect;
pub mod tar;
pub mod workspace;
pub mod zip;

use std::io;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::encoding::entry_text;

pub use self::detect::{
    classify_shape, detect, is_zip, ContainerKind, DetectedFormat, Detection, JsonShape,
};
pub use self::tar::{extract_tar, read_tar, TarEntry, TarError};
pub use self::workspace::ExtractionWorkspace;
pub use self::zip::{extract_zip, ZipLimits};

static DRIVE_PREFIX_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]:").expect("valid drive prefix regex"));

/// 아카이브 처리 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] ::zip::result::ZipError),

    #[error("Unsafe entry path: {0}")]
    UnsafePath(String),

    #[error("Archive truncated at offset {offset} after {salvaged} entries")]
    Truncated { offset: usize, salvaged: usize },

    #[error("Archive expands to more than {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Invalid archive format: {0}")]
    InvalidFormat(String),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// 경로 조작 및 절대 경로 검사
pub fn check_entry_path(path: &str) -> ArchiveResult<()> {
    if path.contains("../") || path.contains("..\\") {
        return Err(ArchiveError::UnsafePath(path.to_string()));
    }

    if path
        .split(['/', '\\'])
        .any(|component| component == "..")
    {
        return Err(ArchiveError::UnsafePath(path.to_string()));
    }

    if path.starts_with('/') || path.starts_with('\\') || DRIVE_PREFIX_REGEX.is_match(path) {
        return Err(ArchiveError::UnsafePath(path.to_string()));
    }

    Ok(())
}

/// `./` 접두어와 역슬래시를 정리한 엔트리 이름
pub fn normalize_entry_name(name: &str) -> String {
    let unified = name.replace('\\', "/");
    let mut trimmed = unified.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}

/// 추출된 파일 집합 (경로 → 내용). 같은 경로는 처음 들어온 것이 유지됩니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    entries: IndexMap<String, Vec<u8>>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry unless the path is already present. Returns whether
    /// the entry was kept.
    pub fn insert_first(&mut self, path: impl Into<String>, content: Vec<u8>) -> bool {
        let path = path.into();
        if self.entries.contains_key(&path) {
            return false;
        }
        self.entries.insert(path, content);
        true
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(path, content)| (path.as_str(), content.as_slice()))
    }

    /// View the file set as one JSON object keyed by entry path.
    ///
    /// `.json` entries are parsed, text entries such as `.svg` become string
    /// values, and anything else (raster images, unparseable JSON) is left
    /// out and reported.
    pub fn json_view(&self) -> (Map<String, Value>, Vec<String>) {
        let mut view = Map::new();
        let mut skipped = Vec::new();

        for (path, content) in self.iter() {
            let lower = path.to_lowercase();
            if path.ends_with('/') {
                continue;
            }
            if lower.ends_with(".json") {
                match serde_json::from_str::<Value>(&entry_text(content)) {
                    Ok(value) => {
                        view.insert(path.to_string(), value);
                    }
                    Err(err) => skipped.push(format!("{path}: invalid JSON ({err})")),
                }
            } else if lower.ends_with(".svg") || lower.ends_with(".txt") {
                view.insert(path.to_string(), Value::String(entry_text(content)));
            } else {
                skipped.push(format!("{path}: unsupported entry type"));
            }
        }

        (view, skipped)
    }
}

/// 추출 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArchive {
    pub files: FileSet,
    /// True when the content was replaced by the synthetic fallback structure.
    pub degraded: bool,
    pub warnings: Vec<String>,
}

impl ExtractedArchive {
    pub fn new(files: FileSet) -> Self {
        Self {
            files,
            degraded: false,
            warnings: Vec::new(),
        }
    }

    /// Empty metadata/presets/translations/icons so the pipeline can carry on
    /// in degraded mode.
    pub fn synthetic(reason: impl Into<String>) -> Self {
        let mut files = FileSet::new();
        files.insert_first("metadata.json", b"{}".to_vec());
        files.insert_first("presets.json", b"{}".to_vec());
        files.insert_first("translations.json", b"{}".to_vec());
        files.insert_first(
            "icons.svg",
            br#"<svg xmlns="http://www.w3.org/2000/svg"></svg>"#.to_vec(),
        );
        Self {
            files,
            degraded: true,
            warnings: vec![reason.into()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_sequences() {
        assert!(check_entry_path("../secret.json").is_err());
        assert!(check_entry_path("icons/../../etc/passwd").is_err());
        assert!(check_entry_path("icons\\..\\boot.ini").is_err());
        assert!(check_entry_path("icons/..").is_err());
    }

    #[test]
    fn rejects_absolute_paths() {
        assert!(check_entry_path("/etc/passwd").is_err());
        assert!(check_entry_path("\\windows\\system32").is_err());
        assert!(check_entry_path("C:/temp/x.json").is_err());
        assert!(check_entry_path("c:\\temp\\x.json").is_err());
    }

    #[test]
    fn accepts_regular_entries() {
        assert!(check_entry_path("metadata.json").is_ok());
        assert!(check_entry_path("icons/river-100px.svg").is_ok());
        assert!(check_entry_path("presets/..hidden.json").is_ok());
    }

    #[test]
    fn normalizes_entry_names() {
        assert_eq!(normalize_entry_name("./icons/a.svg"), "icons/a.svg");
        assert_eq!(normalize_entry_name("icons\\a.svg"), "icons/a.svg");
    }

    #[test]
    fn first_insert_wins() {
        let mut files = FileSet::new();
        assert!(files.insert_first("metadata.json", b"first".to_vec()));
        assert!(!files.insert_first("metadata.json", b"second".to_vec()));
        assert_eq!(files.get("metadata.json"), Some(&b"first"[..]));
    }

    #[test]
    fn json_view_parses_json_and_keeps_svg_text() {
        let mut files = FileSet::new();
        files.insert_first("metadata.json", br#"{"name":"Demo"}"#.to_vec());
        files.insert_first("icons/river.svg", b"<svg/>".to_vec());
        files.insert_first("icons/river.png", vec![0x89, b'P', b'N', b'G']);
        files.insert_first("broken.json", b"{nope".to_vec());

        let (view, skipped) = files.json_view();
        assert_eq!(view["metadata.json"]["name"], "Demo");
        assert_eq!(view["icons/river.svg"], "<svg/>");
        assert_eq!(view.len(), 2);
        assert_eq!(skipped.len(), 2);
    }

    #[test]
    fn synthetic_structure_is_degraded() {
        let extracted = ExtractedArchive::synthetic("corrupt");
        assert!(extracted.degraded);
        assert!(extracted.files.contains("presets.json"));
        assert_eq!(extracted.files.len(), 4);
    }
}
