/// Tabular storage boundary
///
/// A `Workbook` is the in-memory picture of the spreadsheet the user edits:
/// named sheets of string cells, row 0 being the header. Cell I/O against a
/// real spreadsheet lives behind `WorkbookStore`; the file store here keeps
/// the workbook as YAML or JSON.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::backup::{backup_and_swap, prune_backups, BackupError};

pub const CATEGORIES_SHEET: &str = "Categories";
pub const DETAILS_SHEET: &str = "Details";
pub const METADATA_SHEET: &str = "Metadata";
pub const CATEGORY_TRANSLATIONS_SHEET: &str = "Category Translations";
pub const DETAIL_LABEL_TRANSLATIONS_SHEET: &str = "Detail Label Translations";
pub const DETAIL_HELPER_TRANSLATIONS_SHEET: &str = "Detail Helper Text Translations";
pub const DETAIL_OPTION_TRANSLATIONS_SHEET: &str = "Detail Option Translations";

pub const TRANSLATION_SHEETS: [&str; 4] = [
    CATEGORY_TRANSLATIONS_SHEET,
    DETAIL_LABEL_TRANSLATIONS_SHEET,
    DETAIL_HELPER_TRANSLATIONS_SHEET,
    DETAIL_OPTION_TRANSLATIONS_SHEET,
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, header: &[&str]) -> Self {
        Self {
            name: name.into(),
            rows: vec![header.iter().map(|cell| cell.to_string()).collect()],
        }
    }

    pub fn header(&self) -> &[String] {
        self.rows.first().map(Vec::as_slice).unwrap_or_default()
    }

    /// Column index of a header title, compared trimmed and case-insensitively.
    pub fn column(&self, title: &str) -> Option<usize> {
        let wanted = title.trim().to_lowercase();
        self.header()
            .iter()
            .position(|cell| cell.trim().to_lowercase() == wanted)
    }

    /// Index of the first header matching any of `titles`.
    pub fn column_any(&self, titles: &[&str]) -> Option<usize> {
        titles.iter().find_map(|title| self.column(title))
    }

    /// Trimmed cell text; missing cells read as empty.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(|cell| cell.trim())
            .unwrap_or_default()
    }

    pub fn set_cell(&mut self, row: usize, column: usize, value: impl Into<String>) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= column {
            cells.resize(column + 1, String::new());
        }
        cells[column] = value.into();
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        if self.rows.is_empty() {
            self.rows.push(Vec::new());
        }
        self.rows.push(row);
    }

    /// Existing column index, or a new header cell at the end.
    pub fn ensure_column(&mut self, title: &str) -> usize {
        if let Some(index) = self.column(title) {
            return index;
        }
        let index = self.header().len();
        self.set_cell(0, index, title);
        index
    }

    /// Number of rows below the header.
    pub fn data_len(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    /// Row numbers (1-based, the header is row 0) of rows with any content.
    pub fn data_rows(&self) -> impl Iterator<Item = usize> + '_ {
        (1..self.rows.len())
            .filter(|row| self.rows[*row].iter().any(|cell| !cell.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workbook {
    #[serde(default)]
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets
            .iter()
            .find(|sheet| sheet.name.eq_ignore_ascii_case(name))
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets
            .iter_mut()
            .find(|sheet| sheet.name.eq_ignore_ascii_case(name))
    }

    /// Replace the sheet with the same name, or append it.
    pub fn upsert(&mut self, sheet: Sheet) {
        match self.sheet_mut(&sheet.name) {
            Some(existing) => *existing = sheet,
            None => self.sheets.push(sheet),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Sheet> {
        let index = self
            .sheets
            .iter()
            .position(|sheet| sheet.name.eq_ignore_ascii_case(name))?;
        Some(self.sheets.remove(index))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkbookError {
    #[error("workbook I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid workbook YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid workbook JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported workbook file type: {0}")]
    UnsupportedExtension(String),

    #[error(transparent)]
    Backup(#[from] BackupError),
}

pub trait WorkbookStore {
    fn load(&self) -> Result<Workbook, WorkbookError>;
    fn save(&self, workbook: &Workbook) -> Result<(), WorkbookError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    fn for_path(path: &Path) -> Result<Self, WorkbookError> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => Err(WorkbookError::UnsupportedExtension(other.to_string())),
        }
    }
}

/// Workbook kept in a YAML or JSON file, chosen by extension. Saves replace
/// the file atomically and keep the newest `keep_backups` backups.
#[derive(Debug, Clone)]
pub struct FileWorkbookStore {
    path: PathBuf,
    keep_backups: usize,
}

impl FileWorkbookStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep_backups: 3,
        }
    }

    pub fn with_backups(mut self, keep: usize) -> Self {
        self.keep_backups = keep;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WorkbookStore for FileWorkbookStore {
    fn load(&self) -> Result<Workbook, WorkbookError> {
        let format = FileFormat::for_path(&self.path)?;
        let content = fs::read_to_string(&self.path)?;
        let workbook = match format {
            FileFormat::Yaml => serde_yaml::from_str(&content)?,
            FileFormat::Json => serde_json::from_str(&content)?,
        };
        Ok(workbook)
    }

    fn save(&self, workbook: &Workbook) -> Result<(), WorkbookError> {
        let content = match FileFormat::for_path(&self.path)? {
            FileFormat::Yaml => serde_yaml::to_string(workbook)?,
            FileFormat::Json => serde_json::to_string_pretty(workbook)?,
        };
        let outcome = backup_and_swap(&self.path, content.as_bytes())?;
        log::info!(
            "saved workbook to {} ({} bytes)",
            outcome.final_path.display(),
            outcome.bytes_written
        );
        let pruned = prune_backups(&self.path, self.keep_backups)?;
        if pruned > 0 {
            log::debug!("pruned {pruned} old workbook backups");
        }
        Ok(())
    }
}

/// In-process store, used by tests and embedders that own the spreadsheet.
#[derive(Debug, Default)]
pub struct MemoryWorkbookStore {
    workbook: Mutex<Workbook>,
}

impl MemoryWorkbookStore {
    pub fn new(workbook: Workbook) -> Self {
        Self {
            workbook: Mutex::new(workbook),
        }
    }

    pub fn snapshot(&self) -> Workbook {
        self.workbook
            .lock()
            .map(|workbook| workbook.clone())
            .unwrap_or_default()
    }
}

impl WorkbookStore for MemoryWorkbookStore {
    fn load(&self) -> Result<Workbook, WorkbookError> {
        Ok(self.snapshot())
    }

    fn save(&self, workbook: &Workbook) -> Result<(), WorkbookError> {
        if let Ok(mut stored) = self.workbook.lock() {
            *stored = workbook.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Workbook {
        let mut categories = Sheet::new(CATEGORIES_SHEET, &["English", "Icon", "Fields"]);
        categories.push_row(vec!["River".into(), "".into(), "Kind, Notes".into()]);
        categories.push_row(vec![]);
        categories.push_row(vec!["Lake".into()]);
        Workbook {
            sheets: vec![categories],
        }
    }

    #[test]
    fn columns_are_found_case_insensitively() {
        let workbook = sample();
        let sheet = workbook.sheet("categories").unwrap();
        assert_eq!(sheet.column(" fields "), Some(2));
        assert_eq!(sheet.column_any(&["ID", "Icon"]), Some(1));
        assert_eq!(sheet.cell(1, 2), "Kind, Notes");
        assert_eq!(sheet.cell(3, 2), "");
        assert_eq!(sheet.data_rows().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn ensure_column_appends_header_once() {
        let mut sheet = Sheet::new(CATEGORIES_SHEET, &["English"]);
        assert_eq!(sheet.ensure_column("Applies"), 1);
        assert_eq!(sheet.ensure_column("applies"), 1);
        sheet.set_cell(2, 1, "track");
        assert_eq!(sheet.data_len(), 2);
        assert_eq!(sheet.cell(2, 1), "track");
    }

    #[test]
    fn file_store_round_trips_yaml_and_json() {
        let dir = tempdir().unwrap();
        for name in ["book.yaml", "book.json"] {
            let store = FileWorkbookStore::new(dir.path().join(name)).with_backups(1);
            store.save(&sample()).unwrap();
            store.save(&sample()).unwrap();
            assert_eq!(store.load().unwrap(), sample());
        }
    }

    #[test]
    fn file_store_rejects_unknown_extensions() {
        let store = FileWorkbookStore::new("book.xlsx");
        assert!(matches!(
            store.load(),
            Err(WorkbookError::UnsupportedExtension(ext)) if ext == "xlsx"
        ));
    }
}
