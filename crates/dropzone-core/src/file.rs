//! Source file descriptors handed to the selection and the queue.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// A file offered for upload.
///
/// Only metadata is held here. The bytes are reached through `path` by
/// whatever transfer operation the host supplies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Display name (not unique within a batch).
    pub name: CompactString,
    /// Size in bytes.
    pub size: u64,
    /// MIME type, empty when unknown.
    #[serde(default)]
    pub mime_type: CompactString,
    /// Last modification time, if known.
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    /// Location on disk, if the file is backed by one.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl SourceFile {
    /// Create a file descriptor with a name and size.
    pub fn new(name: impl Into<CompactString>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: CompactString::default(),
            last_modified: None,
            path: None,
        }
    }

    /// Describe a file on disk, reading its metadata.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime_type = mime_guess::from_path(path).first_raw().unwrap_or("");

        Ok(Self {
            name: name.into(),
            size: metadata.len(),
            mime_type: mime_type.into(),
            last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            path: Some(path.to_path_buf()),
        })
    }

    /// Set the MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<CompactString>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Set the last modification time.
    pub fn with_last_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(modified);
        self
    }

    /// Set the backing path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Lower-cased extension including the leading dot, e.g. `".png"`.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(format!(".{}", ext.to_lowercase()))
    }

    /// Whether two descriptors refer to the same content by name and size.
    pub fn same_identity(&self, other: &SourceFile) -> bool {
        self.name == other.name && self.size == other.size
    }
}
