//! Queue and selection configuration types.

use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Default number of transfers allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Default delay before transient cancel flags are cleared.
pub const DEFAULT_CANCEL_GRACE_MS: u64 = 500;

/// Default maximum number of files in a selection.
pub const DEFAULT_MAX_FILES: usize = 10;

/// Suggested per-file size limit for hosts that want one (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Configuration for the upload queue.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of transfers outstanding at once.
    #[builder(default = "DEFAULT_MAX_CONCURRENT")]
    pub max_concurrent: usize,

    /// Grace period after a cancel-all before the queue accepts it is idle
    /// again, in milliseconds.
    #[builder(default = "DEFAULT_CANCEL_GRACE_MS")]
    pub cancel_grace_ms: u64,
}

impl QueueConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(0) = self.max_concurrent {
            return Err("max_concurrent must be at least 1".to_string());
        }
        Ok(())
    }
}

impl QueueConfig {
    /// Create a new queue config builder.
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::default()
    }

    /// Create a config with the given concurrency limit.
    ///
    /// A limit of zero is raised to one.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            cancel_grace_ms: DEFAULT_CANCEL_GRACE_MS,
        }
    }

    /// The cancel grace period as a [`Duration`].
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    /// Number of workers to spawn for a batch of `file_count` files.
    pub fn worker_count(&self, file_count: usize) -> usize {
        self.max_concurrent.max(1).min(file_count)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}

/// Configuration for file selection and validation.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct SelectionConfig {
    /// Allow more than one file to be selected.
    #[builder(default = "true")]
    pub multiple: bool,

    /// Accepted extensions (".png") or MIME fragments ("image"). Empty accepts
    /// anything.
    #[builder(default)]
    pub accepted_file_types: Vec<String>,

    /// Maximum number of files in the selection.
    #[builder(default = "DEFAULT_MAX_FILES")]
    pub max_files: usize,

    /// Maximum size of a single file in bytes (None = unlimited).
    #[builder(default)]
    pub max_file_size: Option<u64>,
}

impl SelectionConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(0) = self.max_files {
            return Err("max_files must be at least 1".to_string());
        }
        if let Some(Some(0)) = self.max_file_size {
            return Err("max_file_size cannot be zero".to_string());
        }
        Ok(())
    }
}

impl SelectionConfig {
    /// Create a new selection config builder.
    pub fn builder() -> SelectionConfigBuilder {
        SelectionConfigBuilder::default()
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            multiple: true,
            accepted_file_types: Vec::new(),
            max_files: DEFAULT_MAX_FILES,
            max_file_size: None,
        }
    }
}
