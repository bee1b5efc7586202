//! Core types for dropzone.
//!
//! This crate provides the data structures shared by the selection validator
//! and the upload queue: source files, per-file upload records, transfer
//! results, derived statistics and configuration.

mod config;
mod error;
mod file;
mod record;
mod stats;

pub use config::{
    QueueConfig, QueueConfigBuilder, SelectionConfig, SelectionConfigBuilder,
    DEFAULT_CANCEL_GRACE_MS, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_FILES, DEFAULT_MAX_FILE_SIZE,
};
pub use error::{SelectionError, TransferError, DEFAULT_UPLOAD_ERROR};
pub use file::SourceFile;
pub use record::{FileRecord, StatusIcon, UploadResult, UploadStatus};
pub use stats::{format_file_size, UploadStats};
