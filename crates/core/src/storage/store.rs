use super::types::{ConvertedFile, StorageError, UploadedFile};

/// Durable records of uploaded and converted files.
pub trait FileStore: Send + Sync {
    fn insert_upload(&self, file: &UploadedFile) -> Result<(), StorageError>;

    fn get_upload(&self, id: &str) -> Result<Option<UploadedFile>, StorageError>;

    /// Marks an upload as claimed by a job. Fails with `AlreadyReserved` if
    /// another job got there first.
    fn reserve_upload(&self, id: &str) -> Result<UploadedFile, StorageError>;

    /// Undoes a reservation whose job could not be enqueued.
    fn release_upload(&self, id: &str) -> Result<(), StorageError>;

    /// Removes the upload record. Returns whether a record existed.
    fn delete_upload(&self, id: &str) -> Result<bool, StorageError>;

    fn insert_converted(&self, file: &ConvertedFile) -> Result<(), StorageError>;

    fn get_converted(&self, id: &str) -> Result<Option<ConvertedFile>, StorageError>;
}
