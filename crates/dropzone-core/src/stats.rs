//! Aggregate statistics over a batch of upload records.

use serde::{Deserialize, Serialize};

use crate::record::{FileRecord, UploadStatus};

/// Counts and progress summary for a batch, computed on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStats {
    /// Number of records in the batch.
    pub total: usize,
    /// Records that completed successfully.
    pub completed: usize,
    /// Records that ended in error.
    pub failed: usize,
    /// Records that were cancelled.
    pub cancelled: usize,
    /// Records currently uploading.
    pub uploading: usize,
    /// Records waiting for a worker.
    pub pending: usize,
    /// Batch-wide progress percentage, rounded.
    pub average_progress: u32,
    /// Completed records as a rounded percentage of the batch.
    pub success_rate: u32,
    /// Every record is terminal and the batch is non-empty.
    pub is_all_completed: bool,
}

impl UploadStats {
    /// Compute statistics from a snapshot of records.
    ///
    /// Completed records contribute 100 to the average, uploading records
    /// their live progress, everything else 0.
    pub fn from_records(records: &[FileRecord]) -> Self {
        let mut stats = Self {
            total: records.len(),
            ..Default::default()
        };
        let mut progress_sum = 0.0;

        for record in records {
            match record.status {
                UploadStatus::Pending => stats.pending += 1,
                UploadStatus::Uploading => {
                    stats.uploading += 1;
                    progress_sum += record.progress;
                }
                UploadStatus::Completed => {
                    stats.completed += 1;
                    progress_sum += 100.0;
                }
                UploadStatus::Error => stats.failed += 1,
                UploadStatus::Cancelled => stats.cancelled += 1,
            }
        }

        if stats.total > 0 {
            stats.average_progress = (progress_sum / stats.total as f64).round() as u32;
            stats.success_rate =
                ((stats.completed as f64 / stats.total as f64) * 100.0).round() as u32;
            stats.is_all_completed =
                stats.completed + stats.failed + stats.cancelled == stats.total;
        }

        stats
    }

    /// Number of records in a terminal status.
    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    /// Human-readable summary, e.g. "3 succeeded, 1 failed, 0 cancelled".
    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} failed, {} cancelled",
            self.completed, self.failed, self.cancelled
        )
    }

    /// Headline for a progress card.
    pub fn overall_title(&self, is_uploading: bool, is_cancelling: bool) -> String {
        if is_cancelling {
            "Cancelling uploads...".to_string()
        } else if is_uploading {
            format!("Uploading ({}/{})", self.completed, self.total)
        } else if self.is_all_completed {
            format!("Finished: {}", self.summary())
        } else {
            "Select files".to_string()
        }
    }
}

/// Format a byte count for display.
pub fn format_file_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
