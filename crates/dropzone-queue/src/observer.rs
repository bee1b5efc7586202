//! Progress and completion notifications.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use dropzone_core::{FileRecord, SourceFile, UploadResult, UploadStats};

/// Final outcome of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Submitted files whose record completed, in submission order.
    pub successful_files: Vec<SourceFile>,
    /// One result per record, index-aligned with the batch.
    pub results: Vec<UploadResult>,
    /// The final records.
    pub records: Vec<FileRecord>,
}

impl BatchReport {
    /// Counts over the final records.
    pub fn stats(&self) -> UploadStats {
        UploadStats::from_records(&self.records)
    }

    /// Whether every file completed.
    pub fn is_success(&self) -> bool {
        self.successful_files.len() == self.records.len()
    }

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        self.stats().summary()
    }
}

/// Event published by the queue.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// Full snapshot of the batch after a mutation.
    Progress(Vec<FileRecord>),
    /// The batch reached an all-terminal state.
    Complete(BatchReport),
}

/// Callbacks for hosts that prefer push notifications over a channel.
///
/// Callbacks run on a dispatcher task, one batch at a time and in mutation
/// order. They may call back into the queue.
pub trait UploadObserver: Send + Sync + 'static {
    /// Called with a snapshot after every record mutation.
    fn on_progress(&self, _records: &[FileRecord]) {}

    /// Called once per batch when every record is terminal.
    fn on_complete(&self, _report: &BatchReport) {}
}

impl<T: UploadObserver + ?Sized> UploadObserver for Arc<T> {
    fn on_progress(&self, records: &[FileRecord]) {
        (**self).on_progress(records);
    }

    fn on_complete(&self, report: &BatchReport) {
        (**self).on_complete(report);
    }
}
