//! The transfer operation seam between the queue and the host.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use dropzone_core::{SourceFile, TransferError, UploadResult};

/// Type alias for boxed futures returned by transfer operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything a transfer operation gets for one file.
#[derive(Debug)]
pub struct TransferRequest {
    /// Position of the file in the batch.
    pub index: usize,
    /// The file to transfer.
    pub file: SourceFile,
    /// Where to report progress percentages.
    pub progress: ProgressSink,
    /// Cancelled when the queue tears this transfer down.
    pub cancel: CancellationToken,
}

/// Performs the actual transfer of a single file.
///
/// Implementations should watch `request.cancel` and return
/// [`TransferError::Cancelled`] promptly once it fires. The queue does not
/// rely on it for correctness: a transfer that ignores the token and
/// succeeds late is still recorded as cancelled.
///
/// Any `Fn(TransferRequest) -> impl Future` closure is a transfer operation.
pub trait TransferOperation: Send + Sync + 'static {
    /// Transfer one file.
    fn transfer(&self, request: TransferRequest) -> BoxFuture<'_, Result<UploadResult, TransferError>>;
}

impl<F, Fut> TransferOperation for F
where
    F: Fn(TransferRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<UploadResult, TransferError>> + Send + 'static,
{
    fn transfer(&self, request: TransferRequest) -> BoxFuture<'_, Result<UploadResult, TransferError>> {
        Box::pin(self(request))
    }
}

/// Receives progress percentages (0 to 100) for one file.
///
/// Cheap to clone. Reports after the file has settled are ignored by the
/// queue.
#[derive(Clone)]
pub struct ProgressSink {
    report: Arc<dyn Fn(f64) + Send + Sync>,
}

impl ProgressSink {
    /// Create a sink that forwards every report to `report`.
    pub fn new(report: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self {
            report: Arc::new(report),
        }
    }

    /// A sink that drops every report.
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    /// Report progress as a percentage.
    pub fn report(&self, percent: f64) {
        (self.report)(percent);
    }

    /// Report progress as a byte count out of a total.
    pub fn report_bytes(&self, done: u64, total: u64) {
        let percent = if total == 0 {
            100.0
        } else {
            (done as f64 / total as f64 * 100.0).min(100.0)
        };
        self.report(percent);
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink").finish_non_exhaustive()
    }
}
