//! A transfer operation that copies files into a local directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use dropzone_core::{TransferError, UploadResult};

use crate::transfer::{BoxFuture, ProgressSink, TransferOperation, TransferRequest};

/// Default chunk size for copies (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Number of "name (n).ext" candidates tried before giving up.
const MAX_RENAME_ATTEMPTS: u32 = 1000;

/// Copies each file's `path` into a destination directory.
///
/// Existing files are never overwritten. A name that is taken gets a numeric
/// suffix, e.g. "report (1).pdf". A successful result carries the written
/// path and byte count as JSON data.
#[derive(Debug, Clone)]
pub struct LocalCopyTransfer {
    destination: PathBuf,
    chunk_size: usize,
    throttle: Option<Duration>,
}

impl LocalCopyTransfer {
    /// Copy into `destination`, which must exist.
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            throttle: None,
        }
    }

    /// Set the chunk size. Zero is treated as one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sleep this long after every chunk.
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = (!throttle.is_zero()).then_some(throttle);
        self
    }

    /// The destination directory.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    async fn copy(&self, request: TransferRequest) -> Result<UploadResult, TransferError> {
        let TransferRequest {
            index,
            file,
            progress,
            cancel,
        } = request;

        let Some(source) = file.path.clone() else {
            return Ok(UploadResult::failed(format!("{} has no local path", file.name)));
        };

        let mut reader = File::open(&source).await?;
        let total = reader.metadata().await?.len();
        let (target, writer) = create_unique(&self.destination, &file.name).await?;
        tracing::debug!(index, source = %source.display(), target = %target.display(), "copying");

        match self
            .pump(&mut reader, writer, total, &progress, &cancel)
            .await
        {
            Ok(bytes) => Ok(UploadResult::ok_with(serde_json::json!({
                "path": target.display().to_string(),
                "bytes": bytes,
            }))),
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&target).await {
                    tracing::warn!(target = %target.display(), error = %remove_err, "failed to remove partial file");
                }
                Err(e)
            }
        }
    }

    async fn pump(
        &self,
        reader: &mut File,
        mut writer: File,
        total: u64,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64, TransferError> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut written = 0u64;
        progress.report_bytes(0, total);

        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                read = reader.read(&mut buf) => read?,
            };
            if read == 0 {
                break;
            }
            writer.write_all(&buf[..read]).await?;
            written += read as u64;
            progress.report_bytes(written, total);

            if let Some(throttle) = self.throttle {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                    _ = tokio::time::sleep(throttle) => {}
                }
            }
        }

        writer.flush().await?;
        writer.sync_all().await?;
        Ok(written)
    }
}

impl TransferOperation for LocalCopyTransfer {
    fn transfer(&self, request: TransferRequest) -> BoxFuture<'_, Result<UploadResult, TransferError>> {
        Box::pin(self.copy(request))
    }
}

/// Create a new file named `name` inside `dir`, renaming on collision.
async fn create_unique(dir: &Path, name: &str) -> Result<(PathBuf, File), TransferError> {
    let base = sanitize_name(name);
    let mut candidate = dir.join(&base);

    for attempt in 1..=MAX_RENAME_ATTEMPTS {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                candidate = dir.join(numbered_name(&base, attempt));
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(TransferError::failed(format!(
        "no free name for {base} in {}",
        dir.display()
    )))
}

/// "file.txt" becomes "file (n).txt"; names without an extension get the
/// suffix at the end.
fn numbered_name(name: &str, n: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({n}).{ext}"),
        _ => format!("{name} ({n})"),
    }
}

/// Keep only the final path component so a file name cannot escape the
/// destination.
fn sanitize_name(name: &str) -> String {
    let last = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if last.is_empty() {
        "upload".to_string()
    } else {
        last
    }
}
