//! SQLite-backed file records.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use super::store::FileStore;
use super::types::{ConvertedFile, StorageError, UploadedFile};
use crate::queue::{format_ts, parse_ts};

fn db_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Database(e.to_string())
}

/// SQLite-backed file store.
pub struct SqliteFileStore {
    conn: Mutex<Connection>,
}

impl SqliteFileStore {
    /// Opens (or creates) the file database at `path`.
    pub fn new(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(db_err)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS uploads (
                id TEXT PRIMARY KEY,
                original_name TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                declared_mime TEXT,
                size_bytes INTEGER NOT NULL,
                path TEXT NOT NULL,
                created_at TEXT NOT NULL,
                reserved INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS converted_files (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                file_name TEXT NOT NULL,
                content_type TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                path TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_converted_job_id ON converted_files(job_id);
            "#,
        )
        .map_err(db_err)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_upload(row: &rusqlite::Row) -> rusqlite::Result<UploadedFile> {
        let size: i64 = row.get(4)?;
        let path: String = row.get(5)?;
        let created_at: String = row.get(6)?;
        Ok(UploadedFile {
            id: row.get(0)?,
            original_name: row.get(1)?,
            mime_type: row.get(2)?,
            declared_mime: row.get(3)?,
            size_bytes: size.max(0) as u64,
            path: PathBuf::from(path),
            created_at: parse_ts(6, &created_at)?,
            reserved: row.get(7)?,
        })
    }

    fn row_to_converted(row: &rusqlite::Row) -> rusqlite::Result<ConvertedFile> {
        let size: i64 = row.get(4)?;
        let path: String = row.get(5)?;
        let created_at: String = row.get(6)?;
        Ok(ConvertedFile {
            id: row.get(0)?,
            job_id: row.get(1)?,
            file_name: row.get(2)?,
            content_type: row.get(3)?,
            size_bytes: size.max(0) as u64,
            path: PathBuf::from(path),
            created_at: parse_ts(6, &created_at)?,
        })
    }

    fn load_upload(conn: &Connection, id: &str) -> Result<Option<UploadedFile>, StorageError> {
        conn.query_row(
            "SELECT id, original_name, mime_type, declared_mime, size_bytes, path, created_at, reserved
             FROM uploads WHERE id = ?",
            params![id],
            Self::row_to_upload,
        )
        .optional()
        .map_err(db_err)
    }
}

impl FileStore for SqliteFileStore {
    fn insert_upload(&self, file: &UploadedFile) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO uploads (id, original_name, mime_type, declared_mime, size_bytes, path, created_at, reserved)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                file.id,
                file.original_name,
                file.mime_type,
                file.declared_mime,
                file.size_bytes as i64,
                file.path.to_string_lossy().into_owned(),
                format_ts(&file.created_at),
                file.reserved,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn get_upload(&self, id: &str) -> Result<Option<UploadedFile>, StorageError> {
        let conn = self.conn()?;
        Self::load_upload(&conn, id)
    }

    fn reserve_upload(&self, id: &str) -> Result<UploadedFile, StorageError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE uploads SET reserved = 1 WHERE id = ? AND reserved = 0",
                params![id],
            )
            .map_err(db_err)?;

        match Self::load_upload(&conn, id)? {
            None => Err(StorageError::NotFound(id.to_string())),
            Some(_) if changed == 0 => Err(StorageError::AlreadyReserved(id.to_string())),
            Some(file) => Ok(file),
        }
    }

    fn release_upload(&self, id: &str) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute("UPDATE uploads SET reserved = 0 WHERE id = ?", params![id])
            .map_err(db_err)?;
        Ok(())
    }

    fn delete_upload(&self, id: &str) -> Result<bool, StorageError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM uploads WHERE id = ?", params![id])
            .map_err(db_err)?;
        Ok(deleted > 0)
    }

    fn insert_converted(&self, file: &ConvertedFile) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO converted_files (id, job_id, file_name, content_type, size_bytes, path, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                file.id,
                file.job_id,
                file.file_name,
                file.content_type,
                file.size_bytes as i64,
                file.path.to_string_lossy().into_owned(),
                format_ts(&file.created_at),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn get_converted(&self, id: &str) -> Result<Option<ConvertedFile>, StorageError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, job_id, file_name, content_type, size_bytes, path, created_at
             FROM converted_files WHERE id = ?",
            params![id],
            Self::row_to_converted,
        )
        .optional()
        .map_err(db_err)
    }
}
