//! File records and the on-disk layout behind them.

mod disk;
mod sqlite;
mod store;
mod types;

pub use disk::{remove_dir_if_exists, remove_file_if_exists, DiskStorage};
pub use sqlite::SqliteFileStore;
pub use store::FileStore;
pub use types::{
    converted_file_id, new_upload_id, output_file_name, sanitize_file_name, ConvertedFile,
    StorageError, UploadedFile,
};
