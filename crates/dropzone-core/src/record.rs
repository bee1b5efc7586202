//! Per-file upload records and transfer results.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::error::DEFAULT_UPLOAD_ERROR;

/// Status of a single file within a batch.
///
/// `Pending` and `Uploading` are the only live states. The other three are
/// terminal and never change again within a batch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UploadStatus {
    #[default]
    Pending,
    Uploading,
    Completed,
    Error,
    Cancelled,
}

impl UploadStatus {
    /// Completed, Error or Cancelled.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Pending or Uploading.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Icon variant a presentation layer would show for this status.
    pub fn icon(self) -> StatusIcon {
        match self {
            Self::Pending => StatusIcon::Pending,
            Self::Uploading => StatusIcon::Uploading,
            Self::Completed => StatusIcon::Success,
            Self::Error => StatusIcon::Error,
            Self::Cancelled => StatusIcon::Cancelled,
        }
    }
}

/// Icon variants for rendering a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StatusIcon {
    Pending,
    Uploading,
    Success,
    Error,
    Cancelled,
}

/// Progress and state of one file in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Display name of the file.
    pub file_name: CompactString,
    /// Percentage transferred, 0 to 100.
    pub progress: f64,
    /// Current status.
    pub status: UploadStatus,
    /// Failure message, only set when `status` is `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileRecord {
    /// A fresh pending record.
    pub fn pending(file_name: impl Into<CompactString>) -> Self {
        Self {
            file_name: file_name.into(),
            progress: 0.0,
            status: UploadStatus::Pending,
            error: None,
        }
    }

    /// Whether the record reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Pending -> Uploading.
    pub fn begin(&mut self) -> bool {
        if self.status != UploadStatus::Pending {
            return false;
        }
        self.status = UploadStatus::Uploading;
        true
    }

    /// Record reported progress while uploading.
    ///
    /// Values are clamped to 0..=100. Regressions and non-finite values are
    /// ignored so that progress never goes backwards.
    pub fn set_progress(&mut self, percent: f64) -> bool {
        if self.status != UploadStatus::Uploading || !percent.is_finite() {
            return false;
        }
        let percent = percent.clamp(0.0, 100.0);
        if percent <= self.progress {
            return false;
        }
        self.progress = percent;
        true
    }

    /// Uploading -> Completed.
    pub fn complete(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.progress = 100.0;
        self.status = UploadStatus::Completed;
        self.error = None;
        true
    }

    /// Uploading -> Error. An empty message is replaced by the default.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        let message = message.into();
        self.progress = 0.0;
        self.status = UploadStatus::Error;
        self.error = Some(if message.trim().is_empty() {
            DEFAULT_UPLOAD_ERROR.to_string()
        } else {
            message
        });
        true
    }

    /// Pending | Uploading -> Cancelled.
    pub fn cancel(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.progress = 0.0;
        self.status = UploadStatus::Cancelled;
        self.error = None;
        true
    }

    /// Short status text for display.
    pub fn status_message(&self) -> String {
        match self.status {
            UploadStatus::Completed => "Uploaded".to_string(),
            UploadStatus::Error => self
                .error
                .clone()
                .unwrap_or_else(|| DEFAULT_UPLOAD_ERROR.to_string()),
            UploadStatus::Cancelled => "Cancelled".to_string(),
            UploadStatus::Uploading => format!("{:.0}%", self.progress),
            UploadStatus::Pending => "Waiting".to_string(),
        }
    }
}

/// Outcome of one transfer, as reported by the transfer operation and as
/// aggregated into the batch report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UploadResult {
    /// Whether the transfer succeeded.
    pub success: bool,
    /// Arbitrary payload returned by the transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    /// A successful result without payload.
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    /// A successful result carrying a payload.
    pub fn ok_with(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failed result with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Failure message, falling back to the default when absent or blank.
    pub fn error_message(&self) -> String {
        match self.error.as_deref() {
            Some(msg) if !msg.trim().is_empty() => msg.to_string(),
            _ => DEFAULT_UPLOAD_ERROR.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(!UploadStatus::Pending.is_terminal());
        assert!(!UploadStatus::Uploading.is_terminal());
        assert!(UploadStatus::Completed.is_terminal());
        assert!(UploadStatus::Error.is_terminal());
        assert!(UploadStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(UploadStatus::Uploading.to_string(), "uploading");
        assert_eq!(UploadStatus::Completed.icon().to_string(), "success");
    }

    #[test]
    fn test_progress_only_moves_forward() {
        let mut record = FileRecord::pending("a.txt");
        assert!(!record.set_progress(10.0), "pending records ignore progress");

        assert!(record.begin());
        assert!(record.set_progress(40.0));
        assert!(!record.set_progress(20.0));
        assert!(!record.set_progress(f64::NAN));
        assert!(record.set_progress(250.0));
        assert_eq!(record.progress, 100.0);
    }

    #[test]
    fn test_terminal_records_are_immutable() {
        let mut record = FileRecord::pending("a.txt");
        record.begin();
        record.set_progress(50.0);
        assert!(record.cancel());
        assert_eq!(record.progress, 0.0);

        assert!(!record.complete());
        assert!(!record.fail("late"));
        assert!(!record.set_progress(90.0));
        assert!(!record.begin());
        assert_eq!(record.status, UploadStatus::Cancelled);
        assert_eq!(record.progress, 0.0);
    }

    #[test]
    fn test_fail_uses_default_message() {
        let mut record = FileRecord::pending("a.txt");
        record.begin();
        assert!(record.fail(""));
        assert_eq!(record.error.as_deref(), Some(DEFAULT_UPLOAD_ERROR));
        assert_eq!(record.status_message(), DEFAULT_UPLOAD_ERROR);
    }

    #[test]
    fn test_upload_result_error_message() {
        assert_eq!(UploadResult::failed("quota").error_message(), "quota");
        assert_eq!(UploadResult::failed(" ").error_message(), DEFAULT_UPLOAD_ERROR);
        assert!(UploadResult::ok().success);
    }

    #[test]
    fn test_record_serialization() {
        let record = FileRecord::pending("a.txt");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"status\":\"pending\""));
        assert!(!json.contains("error"));
    }
}
