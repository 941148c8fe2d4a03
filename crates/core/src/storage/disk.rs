//! On-disk layout for uploads, converted files and per-attempt work dirs.
//!
//! ```text
//! <uploads_dir>/<upload id>
//! <converted_dir>/<converted id>
//! <converted_dir>/.work/<job id>-<attempt>/
//! ```
//!
//! Files only appear under their final name through a rename from the same
//! filesystem, so a reader never observes a partially written file.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::StorageConfig;

const WORK_DIR: &str = ".work";

#[derive(Debug, Clone)]
pub struct DiskStorage {
    uploads_dir: PathBuf,
    converted_dir: PathBuf,
}

impl DiskStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            uploads_dir: config.uploads_dir.clone(),
            converted_dir: config.converted_dir.clone(),
        }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn converted_dir(&self) -> &Path {
        &self.converted_dir
    }

    /// Creates the storage directories.
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(&self.uploads_dir).await?;
        fs::create_dir_all(self.converted_dir.join(WORK_DIR)).await?;
        Ok(())
    }

    pub fn upload_path(&self, upload_id: &str) -> PathBuf {
        self.uploads_dir.join(upload_id)
    }

    pub fn converted_path(&self, converted_id: &str) -> PathBuf {
        self.converted_dir.join(converted_id)
    }

    /// Writes upload bytes under a temporary name, then renames into place.
    pub async fn save_upload(&self, upload_id: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.uploads_dir).await?;
        let final_path = self.upload_path(upload_id);
        let partial = self.uploads_dir.join(format!(".{}.part", upload_id));

        let mut file = fs::File::create(&partial).await?;
        if let Err(e) = async {
            file.write_all(bytes).await?;
            file.sync_all().await
        }
        .await
        {
            let _ = fs::remove_file(&partial).await;
            return Err(e);
        }
        drop(file);

        fs::rename(&partial, &final_path).await?;
        Ok(final_path)
    }

    /// Scratch directory of one attempt of a job.
    pub fn work_dir(&self, job_id: &str, attempt: u32) -> PathBuf {
        self.converted_dir
            .join(WORK_DIR)
            .join(format!("{}-{}", job_id, attempt))
    }

    /// Fresh, empty work directory for one attempt of a job.
    pub async fn create_work_dir(&self, job_id: &str, attempt: u32) -> io::Result<PathBuf> {
        let dir = self.work_dir(job_id, attempt);
        remove_dir_if_exists(&dir).await?;
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Moves a finished output into the converted directory under `converted_id`.
    pub async fn promote(&self, output: &Path, converted_id: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.converted_dir).await?;
        let destination = self.converted_path(converted_id);
        fs::rename(output, &destination).await?;
        Ok(destination)
    }
}

/// Removes a file. Returns `false` when it was already gone.
pub async fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Removes a directory tree, ignoring one that does not exist.
pub async fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> DiskStorage {
        DiskStorage::new(&StorageConfig {
            uploads_dir: dir.path().join("uploads"),
            converted_dir: dir.path().join("converted"),
        })
    }

    #[tokio::test]
    async fn test_save_upload_leaves_no_partial_file() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let path = storage.save_upload("abc.png", b"payload").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");

        let names: Vec<String> = std::fs::read_dir(storage.uploads_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["abc.png".to_string()]);
    }

    #[tokio::test]
    async fn test_work_dir_is_fresh_per_attempt() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let first = storage.create_work_dir("job-1", 1).await.unwrap();
        std::fs::write(first.join("leftover"), b"x").unwrap();

        let again = storage.create_work_dir("job-1", 1).await.unwrap();
        assert_eq!(first, again);
        assert!(!again.join("leftover").exists());

        let second = storage.create_work_dir("job-1", 2).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_promote_moves_output() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.ensure_dirs().await.unwrap();

        let work = storage.create_work_dir("job-1", 1).await.unwrap();
        let output = work.join("output.webp");
        std::fs::write(&output, b"RIFF").unwrap();

        let promoted = storage.promote(&output, "abc.webp").await.unwrap();
        assert_eq!(promoted, storage.converted_path("abc.webp"));
        assert!(promoted.exists());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_remove_helpers_tolerate_missing() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("gone.txt");
        assert!(!remove_file_if_exists(&file).await.unwrap());
        std::fs::write(&file, b"x").unwrap();
        assert!(remove_file_if_exists(&file).await.unwrap());

        remove_dir_if_exists(&dir.path().join("nope")).await.unwrap();
    }
}
