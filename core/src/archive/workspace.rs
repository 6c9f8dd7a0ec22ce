//! 추출 임시 작업 공간
//!
//! uuid 이름의 임시 디렉터리에 파일을 기록하고, 커밋되지 않은 채로
//! 스코프를 벗어나면(에러 경로 포함) 디렉터리를 삭제합니다.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::{check_entry_path, ArchiveResult, FileSet};

#[derive(Debug)]
pub struct ExtractionWorkspace {
    root: PathBuf,
    committed: bool,
}

impl ExtractionWorkspace {
    /// Workspace under the system temp directory
    pub fn create() -> io::Result<Self> {
        Self::create_in(&std::env::temp_dir())
    }

    pub fn create_in(parent: &Path) -> io::Result<Self> {
        let root = parent.join(format!("comapeo-extract-{}", Uuid::new_v4()));
        fs::create_dir_all(&root)?;
        log::debug!("created extraction workspace {}", root.display());
        Ok(Self {
            root,
            committed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write every entry below the workspace root. Paths are checked again
    /// here so a hand-built `FileSet` cannot escape the root either.
    pub fn persist(&self, files: &FileSet) -> ArchiveResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(files.len());
        for (name, content) in files.iter() {
            check_entry_path(name)?;
            let target = self.root.join(name);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, content)?;
            written.push(target);
        }
        Ok(written)
    }

    /// Move the workspace to `destination` and keep it.
    pub fn commit(mut self, destination: &Path) -> io::Result<PathBuf> {
        if destination.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", destination.display()),
            ));
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        if fs::rename(&self.root, destination).is_err() {
            // 다른 파일 시스템: 복사 후 원본은 Drop에서 삭제
            copy_dir(&self.root, destination)?;
            return Ok(destination.to_path_buf());
        }

        self.committed = true;
        Ok(destination.to_path_buf())
    }
}

fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

impl Drop for ExtractionWorkspace {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(err) = fs::remove_dir_all(&self.root) {
            if err.kind() != io::ErrorKind::NotFound {
                log::warn!(
                    "failed to clean up extraction workspace {}: {err}",
                    self.root.display()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveError;
    use tempfile::tempdir;

    fn sample_files() -> FileSet {
        let mut files = FileSet::new();
        files.insert_first("metadata.json", b"{}".to_vec());
        files.insert_first("icons/river.svg", b"<svg/>".to_vec());
        files
    }

    #[test]
    fn removed_on_drop() {
        let parent = tempdir().unwrap();
        let root = {
            let workspace = ExtractionWorkspace::create_in(parent.path()).unwrap();
            workspace.persist(&sample_files()).unwrap();
            assert!(workspace.path().join("icons/river.svg").exists());
            workspace.path().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[test]
    fn commit_keeps_files() {
        let parent = tempdir().unwrap();
        let destination = parent.path().join("out");
        let workspace = ExtractionWorkspace::create_in(parent.path()).unwrap();
        workspace.persist(&sample_files()).unwrap();

        let kept = workspace.commit(&destination).unwrap();
        assert_eq!(fs::read(kept.join("metadata.json")).unwrap(), b"{}");
    }

    #[test]
    fn commit_refuses_existing_destination() {
        let parent = tempdir().unwrap();
        let workspace = ExtractionWorkspace::create_in(parent.path()).unwrap();
        let err = workspace.commit(parent.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn persist_rejects_escaping_paths() {
        let parent = tempdir().unwrap();
        let workspace = ExtractionWorkspace::create_in(parent.path()).unwrap();
        let mut files = FileSet::new();
        files.insert_first("../outside.json", b"{}".to_vec());
        assert!(matches!(
            workspace.persist(&files),
            Err(ArchiveError::UnsafePath(_))
        ));
        assert!(!parent.path().join("outside.json").exists());
    }
}
