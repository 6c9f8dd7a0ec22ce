/// Atomic file replacement for workbook writes: back up the current file,
/// write a sibling temp file, then rename it over the target.
use chrono::Local;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const BACKUP_MARKER: &str = ".bak.";

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SwapOutcome {
    pub backup_path: Option<PathBuf>,
    pub final_path: PathBuf,
    pub bytes_written: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0} has no parent directory")]
    NoParent(PathBuf),
    #[error("could not create backup: {0}")]
    BackupCreate(String),
}

fn file_name(target: &Path) -> String {
    target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `survey.yaml` → `survey.yaml.bak.20240131120000`
fn backup_path(target: &Path, parent: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d%H%M%S");
    parent.join(format!("{}{BACKUP_MARKER}{timestamp}", file_name(target)))
}

fn temp_path(target: &Path, parent: &Path) -> PathBuf {
    parent.join(format!(
        ".{}.tmp-{}",
        file_name(target),
        uuid::Uuid::new_v4().simple()
    ))
}

/// Replace `target` with `contents`. An existing target is copied to a
/// timestamped backup first; readers never observe a half-written file.
pub fn backup_and_swap(target: &Path, contents: &[u8]) -> Result<SwapOutcome, BackupError> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        Some(_) => PathBuf::from("."),
        None => return Err(BackupError::NoParent(target.to_path_buf())),
    };
    fs::create_dir_all(&parent)?;

    let backup_path = if target.exists() {
        let candidate = backup_path(target, &parent);
        fs::copy(target, &candidate).map_err(|err| BackupError::BackupCreate(err.to_string()))?;
        log::debug!("backed up {} to {}", target.display(), candidate.display());
        Some(candidate)
    } else {
        None
    };

    let temp = temp_path(target, &parent);
    let written = (|| -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp)?;
        file.write_all(contents)?;
        file.sync_all()
    })();
    if let Err(err) = written {
        let _ = fs::remove_file(&temp);
        return Err(err.into());
    }

    #[cfg(target_os = "windows")]
    {
        if target.exists() {
            if let Err(err) = fs::remove_file(target) {
                let _ = fs::remove_file(&temp);
                return Err(err.into());
            }
        }
    }

    if let Err(err) = fs::rename(&temp, target) {
        let _ = fs::remove_file(&temp);
        return Err(err.into());
    }

    Ok(SwapOutcome {
        backup_path,
        final_path: target.to_path_buf(),
        bytes_written: contents.len(),
    })
}

/// Delete all but the newest `keep` backups of `target`. Returns how many
/// were removed.
pub fn prune_backups(target: &Path, keep: usize) -> io::Result<usize> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = format!("{}{BACKUP_MARKER}", file_name(target));

    let mut backups: Vec<PathBuf> = fs::read_dir(parent)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| file_name(path).starts_with(&prefix))
        .collect();
    // timestamps sort lexicographically
    backups.sort();

    let excess = backups.len().saturating_sub(keep);
    for path in &backups[..excess] {
        fs::remove_file(path)?;
    }
    Ok(excess)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_backup_and_swaps() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("survey.yaml");
        fs::write(&target, b"original").unwrap();

        let outcome = backup_and_swap(&target, b"updated").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "updated");
        let backup = outcome.backup_path.expect("backup created");
        assert_eq!(fs::read_to_string(backup).unwrap(), "original");
        assert_eq!(outcome.bytes_written, 7);
    }

    #[test]
    fn new_files_have_no_backup_and_no_leftovers() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested").join("survey.json");

        let outcome = backup_and_swap(&target, b"{}").unwrap();
        assert!(outcome.backup_path.is_none());
        let names: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("survey.json")]);
    }

    #[test]
    fn prunes_oldest_backups() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("survey.yaml");
        for stamp in ["20240101000000", "20240102000000", "20240103000000"] {
            fs::write(dir.path().join(format!("survey.yaml.bak.{stamp}")), b"x").unwrap();
        }
        fs::write(dir.path().join("other.yaml.bak.20240101000000"), b"x").unwrap();

        assert_eq!(prune_backups(&target, 1).unwrap(), 2);
        assert!(dir.path().join("survey.yaml.bak.20240103000000").exists());
        assert!(dir.path().join("other.yaml.bak.20240101000000").exists());
    }
}
