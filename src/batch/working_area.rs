use chrono::Utc;
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

use crate::error::CleanupError;

/// Per-batch directory under the output root.
///
/// The name combines a millisecond timestamp, the batch id and a random
/// suffix, so concurrent batches never collide. The directory is removed when
/// the area is released or dropped, unless it was persisted.
#[derive(Debug)]
pub struct WorkingArea {
    dir: Option<TempDir>,
    path: PathBuf,
    name: String,
}

impl WorkingArea {
    pub fn create(root: &Path, batch_id: Uuid) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let prefix = format!("batch-{}-{}-", Utc::now().format("%Y%m%dT%H%M%S%3f"), batch_id);
        let dir = tempfile::Builder::new().prefix(&prefix).tempdir_in(root)?;

        let path = dir.path().to_path_buf();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| prefix.trim_end_matches('-').to_string());
        debug!("Created working area {:?}", path);

        Ok(Self {
            dir: Some(dir),
            path,
            name,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory name, used in public links.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keep the directory on disk; it is no longer cleaned up.
    pub fn persist(mut self) -> PathBuf {
        if let Some(dir) = self.dir.take() {
            let _ = dir.keep();
        }
        self.path.clone()
    }

    /// Remove the directory now.
    pub fn release(mut self) -> Result<(), CleanupError> {
        self.remove()
    }

    fn remove(&mut self) -> Result<(), CleanupError> {
        match self.dir.take() {
            Some(dir) => dir.close().map_err(|source| CleanupError::WorkingArea {
                path: self.path.clone(),
                source,
            }),
            None => Ok(()),
        }
    }
}

impl Drop for WorkingArea {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            warn!("{}", e);
        } else if !self.path.exists() {
            debug!("Removed working area {:?}", self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique_for_same_batch_id() {
        let root = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let a = WorkingArea::create(root.path(), id).unwrap();
        let b = WorkingArea::create(root.path(), id).unwrap();
        assert_ne!(a.name(), b.name());
        assert!(a.name().starts_with("batch-"));
        assert!(a.name().contains(&id.to_string()));
    }

    #[test]
    fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let area = WorkingArea::create(root.path(), Uuid::new_v4()).unwrap();
        let path = area.path().to_path_buf();
        fs::write(path.join("E1.html"), "x").unwrap();
        drop(area);
        assert!(!path.exists());
    }

    #[test]
    fn test_persist_keeps_directory() {
        let root = tempfile::tempdir().unwrap();
        let area = WorkingArea::create(root.path(), Uuid::new_v4()).unwrap();
        let path = area.persist();
        assert!(path.is_dir());
    }

    #[test]
    fn test_release_reports_success() {
        let root = tempfile::tempdir().unwrap();
        let area = WorkingArea::create(root.path(), Uuid::new_v4()).unwrap();
        let path = area.path().to_path_buf();
        area.release().unwrap();
        assert!(!path.exists());
    }
}
