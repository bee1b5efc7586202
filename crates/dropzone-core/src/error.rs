//! Error types for selection and transfer.

use thiserror::Error;

/// Message recorded when a transfer fails without saying why.
pub const DEFAULT_UPLOAD_ERROR: &str = "Upload failed";

/// Reasons a file selection can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// The selection would exceed the file count limit.
    #[error("At most {max_files} files can be selected ({current} selected, {adding} being added)")]
    TooManyFiles {
        max_files: usize,
        current: usize,
        adding: usize,
    },

    /// A file is larger than the size limit.
    #[error("File \"{name}\" is {size}, exceeding the {limit} limit")]
    FileTooLarge {
        name: String,
        size: String,
        limit: String,
    },

    /// A file matches none of the accepted types.
    #[error("File \"{name}\" has an unsupported type. Supported types: {accepted}")]
    UnsupportedType { name: String, accepted: String },
}

/// Errors a transfer operation can finish with.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The transfer observed its cancellation token and stopped.
    #[error("Upload cancelled")]
    Cancelled,

    /// The transfer failed with a message.
    #[error("{message}")]
    Failed { message: String },

    /// I/O error while reading or writing file data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// Create a failure with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Whether this error is the distinguished cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Message to record on a failed upload, falling back to the default.
    pub fn record_message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            DEFAULT_UPLOAD_ERROR.to_string()
        } else {
            message
        }
    }
}
