//! Bounded-concurrency upload queue for dropzone.
//!
//! [`UploadQueue`] takes a batch of files and runs at most `max_concurrent`
//! of them at a time through a host-supplied [`TransferOperation`]. Every
//! file gets a [`FileRecord`] that moves through a small state machine:
//!
//! ```text
//! Pending -> Uploading -> Completed | Error
//! Pending | Uploading -> Cancelled
//! ```
//!
//! Terminal records never change again, so a transfer that finishes after
//! [`UploadQueue::cancel_all`] cannot bring its record back.
//!
//! Progress is observed through [`UploadObserver`] callbacks or a broadcast
//! channel from [`UploadQueue::subscribe`]. Each batch finishes with exactly
//! one [`QueueEvent::Complete`] carrying a [`BatchReport`].
//!
//! # Example
//!
//! ```rust,no_run
//! use dropzone_queue::{QueueConfig, SourceFile, TransferRequest, UploadQueue, UploadResult};
//!
//! # async fn run() {
//! let queue = UploadQueue::new(QueueConfig::new(2), |req: TransferRequest| async move {
//!     req.progress.report(50.0);
//!     Ok(UploadResult::ok())
//! });
//!
//! let files = vec![SourceFile::new("a.txt", 10), SourceFile::new("b.txt", 20)];
//! if let Some(handle) = queue.start(files) {
//!     handle.wait().await;
//! }
//! println!("{}", queue.stats().summary());
//! # }
//! ```

mod local;
mod observer;
mod queue;
mod transfer;
mod uploader;

pub use local::LocalCopyTransfer;
pub use observer::{BatchReport, QueueEvent, UploadObserver};
pub use queue::{BatchHandle, UploadQueue};
pub use transfer::{BoxFuture, ProgressSink, TransferOperation, TransferRequest};
pub use uploader::Uploader;

// Re-export core types for convenience
pub use dropzone_core::{
    FileRecord, QueueConfig, SelectionConfig, SelectionError, SourceFile, TransferError,
    UploadResult, UploadStats, UploadStatus,
};

/// Buffer size of the broadcast channel behind [`UploadQueue::subscribe`].
pub const EVENT_CHANNEL_SIZE: usize = 1024;
