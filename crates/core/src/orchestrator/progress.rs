//! Progress notifications emitted while a run advances.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::automation::Status;

/// Position of a work item in its submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemRole {
    Part(usize),
    Combinator,
    Single,
}

impl fmt::Display for WorkItemRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItemRole::Part(index) => write!(f, "part {}", index + 1),
            WorkItemRole::Combinator => f.write_str("combinator"),
            WorkItemRole::Single => f.write_str("work item"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Phase {
        message: String,
    },
    WorkItemSubmitted {
        id: String,
        role: WorkItemRole,
    },
    StatusChanged {
        id: String,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<String>,
    },
    WorkItemCompleted {
        id: String,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        queue_time_secs: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        processing_time_secs: Option<f64>,
    },
    ReportSaved {
        id: String,
        path: PathBuf,
    },
    DownloadReady {
        object_key: String,
        url: String,
    },
    Failed {
        message: String,
    },
}

impl ProgressEvent {
    pub fn phase(message: impl Into<String>) -> Self {
        ProgressEvent::Phase {
            message: message.into(),
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Phase { message } => f.write_str(message),
            ProgressEvent::WorkItemSubmitted { id, role } => {
                write!(f, "Submitted {} {}", role, id)
            }
            ProgressEvent::StatusChanged { id, status, progress } => match progress {
                Some(progress) => write!(f, "{}: {} ({})", id, status, progress),
                None => write!(f, "{}: {}", id, status),
            },
            ProgressEvent::WorkItemCompleted {
                id,
                status,
                queue_time_secs,
                processing_time_secs,
            } => {
                write!(f, "{} finished: {}", id, status)?;
                if let Some(secs) = queue_time_secs {
                    write!(f, ", queued {:.1}s", secs)?;
                }
                if let Some(secs) = processing_time_secs {
                    write!(f, ", processed {:.1}s", secs)?;
                }
                Ok(())
            }
            ProgressEvent::ReportSaved { id, path } => {
                write!(f, "Report for {} saved to {}", id, path.display())
            }
            ProgressEvent::DownloadReady { object_key, .. } => {
                write!(f, "{} ready for download", object_key)
            }
            ProgressEvent::Failed { message } => write!(f, "Failed: {}", message),
        }
    }
}

/// Callback invoked for every progress event.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Cloneable handle that forwards events to an optional callback.
#[derive(Clone, Default)]
pub struct ProgressNotifier {
    callback: Option<ProgressCallback>,
}

impl ProgressNotifier {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.callback {
            callback(&event);
        }
    }
}

impl fmt::Debug for ProgressNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressNotifier")
            .field("attached", &self.callback.is_some())
            .finish()
    }
}
