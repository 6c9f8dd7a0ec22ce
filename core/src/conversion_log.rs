/// JSONL conversion log and aggregated conversion metrics
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::InterchangeError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Import,
    Export,
}

/// One line of the conversion log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub source: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub warnings: usize,
    pub entities: usize,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl ConversionLogEntry {
    pub fn success(direction: Direction, source: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            direction,
            source: source.into(),
            success: true,
            error_kind: None,
            message: None,
            warnings: 0,
            entities: 0,
            duration_ms: 0,
            fingerprint: None,
        }
    }

    pub fn failure(
        direction: Direction,
        source: impl Into<String>,
        err: &InterchangeError,
    ) -> Self {
        Self {
            success: false,
            error_kind: Some(err.kind().to_string()),
            message: Some(err.to_string()),
            ..Self::success(direction, source)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConversionMetrics {
    pub total_imports: u64,
    pub total_exports: u64,
    pub total_failures: u64,
    pub total_warnings: u64,
    pub by_error_kind: HashMap<String, u64>,
}

impl ConversionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: &ConversionLogEntry) {
        match entry.direction {
            Direction::Import => self.total_imports += 1,
            Direction::Export => self.total_exports += 1,
        }
        self.total_warnings += entry.warnings as u64;
        if !entry.success {
            self.total_failures += 1;
            let kind = entry.error_kind.clone().unwrap_or_else(|| "unknown".to_string());
            *self.by_error_kind.entry(kind).or_insert(0) += 1;
        }
    }

    pub fn failure_rate(&self) -> f64 {
        let total = self.total_imports + self.total_exports;
        if total == 0 {
            0.0
        } else {
            self.total_failures as f64 / total as f64
        }
    }
}

pub struct ConversionLogger {
    log_file: Mutex<Option<BufWriter<File>>>,
    metrics: Mutex<ConversionMetrics>,
}

impl ConversionLogger {
    pub fn new() -> Self {
        Self {
            log_file: Mutex::new(None),
            metrics: Mutex::new(ConversionMetrics::new()),
        }
    }

    /// Append entries to `path` from now on.
    pub fn init_file_logging<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if let Ok(mut guard) = self.log_file.lock() {
            *guard = Some(BufWriter::new(file));
        }
        Ok(())
    }

    pub fn log(&self, entry: &ConversionLogEntry) {
        if let Ok(mut guard) = self.log_file.lock() {
            if let Some(writer) = guard.as_mut() {
                if let Ok(json) = serde_json::to_string(entry) {
                    let _ = writeln!(writer, "{json}");
                    let _ = writer.flush();
                }
            }
        }

        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.record(entry);
        }
    }

    pub fn get_metrics(&self) -> ConversionMetrics {
        self.metrics
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl Default for ConversionLogger {
    fn default() -> Self {
        Self::new()
    }
}

static CONVERSION_LOGGER: once_cell::sync::Lazy<ConversionLogger> =
    once_cell::sync::Lazy::new(ConversionLogger::new);

pub fn conversion_logger() -> &'static ConversionLogger {
    &CONVERSION_LOGGER
}

pub fn init_conversion_logging<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    conversion_logger().init_file_logging(path)
}

/// Today's log file under the local data directory.
pub fn conversion_log_path() -> PathBuf {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("comapeo-config")
        .join("logs");
    let date = chrono::Local::now().format("%Y%m%d");
    log_dir.join(format!("conversions-{date}.jsonl"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_count_failures_by_kind() {
        let mut metrics = ConversionMetrics::new();
        let mut ok = ConversionLogEntry::success(Direction::Import, "a.zip");
        ok.warnings = 3;
        metrics.record(&ok);
        metrics.record(&ConversionLogEntry::failure(
            Direction::Export,
            "workbook.yaml",
            &InterchangeError::Format("bad".into()),
        ));

        assert_eq!(metrics.total_imports, 1);
        assert_eq!(metrics.total_exports, 1);
        assert_eq!(metrics.total_warnings, 3);
        assert_eq!(metrics.by_error_kind["format"], 1);
        assert_eq!(metrics.failure_rate(), 0.5);
    }

    #[test]
    fn entries_are_appended_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("conversions.jsonl");
        let logger = ConversionLogger::new();
        logger.init_file_logging(&path).unwrap();
        logger.log(&ConversionLogEntry::success(Direction::Import, "one.json"));
        logger.log(&ConversionLogEntry::success(Direction::Import, "two.json"));

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let entry: ConversionLogEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(entry.source, "two.json");
        assert_eq!(logger.get_metrics().total_imports, 2);
    }
}
