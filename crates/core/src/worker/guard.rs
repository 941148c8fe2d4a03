//! Scoped ownership of a job's input file.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::metrics;
use crate::storage::FileStore;

/// Deletes an upload (disk file and record) when dropped, unless disarmed.
///
/// Created as soon as a job is claimed, so the input is released on every
/// exit path of the job task, including a panic. A job going back to the
/// queue for a retry disarms the guard and the input survives.
pub(crate) struct InputGuard {
    files: Arc<dyn FileStore>,
    upload_id: String,
    path: PathBuf,
    armed: bool,
}

impl InputGuard {
    pub fn new(files: Arc<dyn FileStore>, upload_id: impl Into<String>, path: PathBuf) -> Self {
        Self {
            files,
            upload_id: upload_id.into(),
            path,
            armed: true,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Points the guard at the stored location from the upload record.
    pub fn set_path(&mut self, path: PathBuf) {
        self.path = path;
    }

    /// Keeps the input. Used when the job will run again.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    fn release(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;

        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(file_id = %self.upload_id, "Removed input file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                file_id = %self.upload_id,
                path = %self.path.display(),
                error = %e,
                "Failed to remove input file"
            ),
        }
        if let Err(e) = self.files.delete_upload(&self.upload_id) {
            warn!(file_id = %self.upload_id, error = %e, "Failed to delete upload record");
        }
        metrics::INPUTS_CLEANED.inc();
    }
}

impl Drop for InputGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SqliteFileStore, UploadedFile};
    use chrono::Utc;
    use tempfile::TempDir;

    fn stored_upload(dir: &TempDir, files: &Arc<dyn FileStore>) -> PathBuf {
        let path = dir.path().join("in.png");
        std::fs::write(&path, b"bytes").unwrap();
        files
            .insert_upload(&UploadedFile {
                id: "in.png".to_string(),
                original_name: "in.png".to_string(),
                mime_type: "image/png".to_string(),
                declared_mime: None,
                size_bytes: 5,
                path: path.clone(),
                created_at: Utc::now(),
                reserved: true,
            })
            .unwrap();
        path
    }

    #[test]
    fn test_drop_removes_input() {
        let dir = TempDir::new().unwrap();
        let files: Arc<dyn FileStore> = Arc::new(SqliteFileStore::in_memory().unwrap());
        let path = stored_upload(&dir, &files);

        drop(InputGuard::new(Arc::clone(&files), "in.png", path.clone()));

        assert!(!path.exists());
        assert!(files.get_upload("in.png").unwrap().is_none());
    }

    #[test]
    fn test_disarmed_guard_keeps_input() {
        let dir = TempDir::new().unwrap();
        let files: Arc<dyn FileStore> = Arc::new(SqliteFileStore::in_memory().unwrap());
        let path = stored_upload(&dir, &files);

        let mut guard = InputGuard::new(Arc::clone(&files), "in.png", path.clone());
        guard.disarm();
        drop(guard);

        assert!(path.exists());
        assert!(files.get_upload("in.png").unwrap().is_some());
    }

    #[test]
    fn test_released_during_unwind() {
        let dir = TempDir::new().unwrap();
        let files: Arc<dyn FileStore> = Arc::new(SqliteFileStore::in_memory().unwrap());
        let path = stored_upload(&dir, &files);

        let guard_files = Arc::clone(&files);
        let guard_path = path.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = InputGuard::new(guard_files, "in.png", guard_path);
            panic!("adapter blew up");
        }));

        assert!(result.is_err());
        assert!(!path.exists());
        assert!(files.get_upload("in.png").unwrap().is_none());
    }
}
