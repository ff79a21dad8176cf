use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Work item status as reported by Design Automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "inprogress")]
    InProgress,
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "failedLimitDataSize")]
    FailedLimitDataSize,
    #[serde(rename = "failedLimitProcessingTime")]
    FailedLimitProcessingTime,
    #[serde(rename = "failedDownload")]
    FailedDownload,
    #[serde(rename = "failedInstructions")]
    FailedInstructions,
    #[serde(rename = "failedUpload")]
    FailedUpload,
    #[serde(rename = "failedUploadOptional")]
    FailedUploadOptional,
    #[serde(rename = "success")]
    Success,
    /// A status this client does not know; treated as terminal failure.
    #[serde(other, rename = "unknown")]
    Unknown,
}

impl Status {
    /// Terminal: anything other than pending or in progress. No transition
    /// leaves a terminal status.
    pub fn is_done(&self) -> bool {
        !matches!(self, Status::Pending | Status::InProgress)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }

    pub fn is_failure(&self) -> bool {
        self.is_done() && !self.is_success()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "inprogress",
            Status::Cancelled => "cancelled",
            Status::FailedLimitDataSize => "failedLimitDataSize",
            Status::FailedLimitProcessingTime => "failedLimitProcessingTime",
            Status::FailedDownload => "failedDownload",
            Status::FailedInstructions => "failedInstructions",
            Status::FailedUpload => "failedUpload",
            Status::FailedUploadOptional => "failedUploadOptional",
            Status::Success => "success",
            Status::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamps the service records for a work item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_queued: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_download_started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_instruction_started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_instruction_ended: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_upload_ended: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_finished: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_downloaded: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_uploaded: Option<u64>,
}

impl Statistics {
    /// Time spent waiting in the queue, in seconds.
    pub fn queue_time_secs(&self) -> Option<f64> {
        seconds_between(self.time_queued, self.time_download_started)
    }

    /// Time from input download to output upload, in seconds.
    pub fn processing_time_secs(&self) -> Option<f64> {
        seconds_between(self.time_download_started, self.time_upload_ended)
    }
}

fn seconds_between(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Option<f64> {
    let (start, end) = (start?, end?);
    Some((end - start).num_milliseconds() as f64 / 1000.0)
}

/// One tracking handle. Each poll replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemStatus {
    pub id: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Statistics>,
}

impl WorkItemStatus {
    pub fn is_done(&self) -> bool {
        self.status.is_done()
    }
}

/// Response of a combined submission: handles in submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedStatus {
    pub parts: Vec<WorkItemStatus>,
    pub combinator: WorkItemStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!Status::Pending.is_done());
        assert!(!Status::InProgress.is_done());
        assert!(Status::Success.is_done());
        assert!(Status::Cancelled.is_failure());
        assert!(Status::FailedLimitProcessingTime.is_failure());
        assert!(!Status::Success.is_failure());
    }

    #[test]
    fn test_unknown_status_is_terminal() {
        let status: Status = serde_json::from_str("\"failedSomethingNew\"").unwrap();
        assert_eq!(status, Status::Unknown);
        assert!(status.is_done());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&Status::InProgress).unwrap(),
            "\"inprogress\""
        );
        assert_eq!(
            serde_json::from_str::<Status>("\"failedDownload\"").unwrap(),
            Status::FailedDownload
        );
    }

    #[test]
    fn test_statistics_durations() {
        let json = r#"{
            "timeQueued": "2024-01-01T00:00:00Z",
            "timeDownloadStarted": "2024-01-01T00:00:02.500Z",
            "timeUploadEnded": "2024-01-01T00:00:12.500Z"
        }"#;
        let stats: Statistics = serde_json::from_str(json).unwrap();
        assert_eq!(stats.queue_time_secs(), Some(2.5));
        assert_eq!(stats.processing_time_secs(), Some(10.0));
        assert_eq!(Statistics::default().queue_time_secs(), None);
    }

    #[test]
    fn test_combined_status_deserializes() {
        let json = r#"{
            "parts": [
                {"id": "p1", "status": "pending"},
                {"id": "p2", "status": "inprogress", "progress": "50%"}
            ],
            "combinator": {"id": "c", "status": "pending"}
        }"#;
        let combined: CombinedStatus = serde_json::from_str(json).unwrap();
        assert_eq!(combined.parts.len(), 2);
        assert_eq!(combined.parts[1].progress.as_deref(), Some("50%"));
        assert_eq!(combined.combinator.id, "c");
    }
}
