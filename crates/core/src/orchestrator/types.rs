//! Types for the work item orchestrator.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AuthError;
use crate::automation::{AutomationError, GraphError, Status, FINAL_LOCAL_NAME};
use crate::storage::StorageError;

use super::poller::{PollError, TrackedWorkItem};

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Credential could not be obtained.
    #[error("authentication failed: {0}")]
    AuthFailure(#[from] AuthError),

    /// The service rejected or never answered a submission.
    #[error("submission failed: {0}")]
    SubmissionFailure(#[source] AutomationError),

    /// A status query failed while tracking.
    #[error("polling failed: {0}")]
    PollFailure(#[source] PollError),

    /// Required local input does not exist.
    #[error("missing artifact: {}", .0.display())]
    MissingArtifact(PathBuf),

    /// Reports or results could not be collected after completion.
    #[error("assembly failed: {0}")]
    AssemblyFailure(String),

    /// Bucket or registration setup failed.
    #[error("setup failed: {0}")]
    Setup(String),

    /// The caller-level bound on the whole wait was exceeded.
    #[error("work items did not finish within {0:?}")]
    Timeout(Duration),

    #[error("invalid job graph: {0}")]
    InvalidGraph(#[from] GraphError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<StorageError> for OrchestratorError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::MissingArtifact(path) => OrchestratorError::MissingArtifact(path),
            StorageError::Auth(e) => OrchestratorError::AuthFailure(e),
            other => OrchestratorError::Setup(other.to_string()),
        }
    }
}

impl From<PollError> for OrchestratorError {
    fn from(err: PollError) -> Self {
        match err {
            report @ PollError::Report { .. } => {
                OrchestratorError::AssemblyFailure(report.to_string())
            }
            PollError::Auth(e) => OrchestratorError::AuthFailure(e),
            other => OrchestratorError::PollFailure(other),
        }
    }
}

/// Object keys double as local file names in the output folder, so each one
/// must be a single plain path component.
pub(crate) fn check_object_key(key: &str, field: &str) -> Result<(), OrchestratorError> {
    let mut components = Path::new(key).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if key.trim().is_empty() || !plain || key.contains(['/', '\\']) {
        return Err(OrchestratorError::InvalidRequest(format!(
            "{} '{}' must be a plain file name",
            field, key
        )));
    }
    Ok(())
}

impl OrchestratorError {
    /// Classify an error raised while registering bundles or activities.
    pub(crate) fn setup(err: AutomationError) -> Self {
        match err {
            AutomationError::Auth(e) => OrchestratorError::AuthFailure(e),
            AutomationError::MissingPackage(path) => OrchestratorError::MissingArtifact(path),
            AutomationError::Storage(e) => e.into(),
            other => OrchestratorError::Setup(other.to_string()),
        }
    }

    /// Classify an error raised by a submission call.
    pub(crate) fn submission(err: AutomationError) -> Self {
        match err {
            AutomationError::Auth(e) => OrchestratorError::AuthFailure(e),
            other => OrchestratorError::SubmissionFailure(other),
        }
    }

    /// Whether the caller sent something unusable (as opposed to a remote
    /// failure).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OrchestratorError::MissingArtifact(_)
                | OrchestratorError::InvalidGraph(_)
                | OrchestratorError::InvalidRequest(_)
        )
    }
}

/// One input of a merge run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRequest {
    /// Local path of the drawing to plot.
    pub source: PathBuf,
    /// Key of the intermediate (and published object) it is plotted to.
    pub output_key: String,
}

/// Plot every part and merge the results into `output_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub parts: Vec<PartRequest>,
    #[serde(default = "default_merge_output")]
    pub output_key: String,
}

fn default_merge_output() -> String {
    FINAL_LOCAL_NAME.to_string()
}

impl MergeRequest {
    /// One part per source, each plotted to `<stem>.pdf`.
    pub fn from_sources(sources: impl IntoIterator<Item = PathBuf>) -> Self {
        let parts = sources
            .into_iter()
            .map(|source| {
                let stem = source
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "part".to_string());
                PartRequest {
                    output_key: format!("{}.pdf", stem),
                    source,
                }
            })
            .collect();
        Self {
            parts,
            output_key: default_merge_output(),
        }
    }

    /// Storage key of an uploaded source.
    pub fn source_key(source: &Path) -> Option<String> {
        source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    /// Keys of every object the run publishes, in part order then the final
    /// output.
    pub fn result_keys(&self) -> Vec<String> {
        self.parts
            .iter()
            .map(|p| p.output_key.clone())
            .chain(std::iter::once(self.output_key.clone()))
            .collect()
    }

    /// Reject requests whose keys would collide in storage or inside the
    /// combinator's working folder.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.parts.is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "at least one part is required".to_string(),
            ));
        }
        check_object_key(&self.output_key, "output_key")?;

        let mut keys = HashSet::from([self.output_key.as_str()]);
        for part in &self.parts {
            let key = part.output_key.as_str();
            check_object_key(key, "part output_key")?;
            if key == FINAL_LOCAL_NAME {
                return Err(OrchestratorError::InvalidRequest(format!(
                    "'{}' is reserved for the merged output",
                    FINAL_LOCAL_NAME
                )));
            }
            if !keys.insert(key) {
                return Err(OrchestratorError::InvalidRequest(format!(
                    "output key '{}' is used more than once",
                    key
                )));
            }
        }

        let mut sources = HashSet::new();
        for part in &self.parts {
            let key = Self::source_key(&part.source).ok_or_else(|| {
                OrchestratorError::InvalidRequest(format!(
                    "'{}' has no file name",
                    part.source.display()
                ))
            })?;
            if keys.contains(key.as_str()) || !sources.insert(key.clone()) {
                return Err(OrchestratorError::InvalidRequest(format!(
                    "source '{}' collides with another object",
                    key
                )));
            }
        }

        Ok(())
    }
}

/// Fetch a caller-owned item with its references into `output_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRequest {
    pub item_url: String,
    /// Bearer token authorizing the fetch of `item_url`.
    pub user_token: String,
    #[serde(default = "default_reference_output")]
    pub output_key: String,
}

fn default_reference_output() -> String {
    "result.zip".to_string()
}

impl ReferenceRequest {
    pub fn new(item_url: impl Into<String>, user_token: impl Into<String>) -> Self {
        Self {
            item_url: item_url.into(),
            user_token: user_token.into(),
            output_key: default_reference_output(),
        }
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.item_url.trim().is_empty() || self.user_token.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "item_url and user_token are required".to_string(),
            ));
        }
        check_object_key(&self.output_key, "output_key")
    }
}

/// Terminal view of one work item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkItemReport {
    pub id: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
    /// Report text, when the service published one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    /// Where the report was written locally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_time_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_secs: Option<f64>,
}

impl From<TrackedWorkItem> for WorkItemReport {
    fn from(tracked: TrackedWorkItem) -> Self {
        let stats = tracked.status.stats.as_ref();
        Self {
            queue_time_secs: stats.and_then(|s| s.queue_time_secs()),
            processing_time_secs: stats.and_then(|s| s.processing_time_secs()),
            id: tracked.status.id,
            status: tracked.status.status,
            report_url: tracked.status.report_url,
            report: tracked.report,
            report_path: None,
        }
    }
}

/// A downloadable result object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultLocation {
    pub object_key: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

/// Outcome of a merge run. The combinator's status decides `succeeded`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalResult {
    pub succeeded: bool,
    pub combinator: WorkItemReport,
    pub parts: Vec<WorkItemReport>,
    pub downloads: Vec<ResultLocation>,
}

impl FinalResult {
    pub fn download_url(&self, object_key: &str) -> Option<&str> {
        self.downloads
            .iter()
            .find(|d| d.object_key == object_key)
            .map(|d| d.url.as_str())
    }

    pub fn failed_parts(&self) -> impl Iterator<Item = &WorkItemReport> {
        self.parts.iter().filter(|p| p.status.is_failure())
    }
}

/// Outcome of a reference-fetch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceResult {
    pub succeeded: bool,
    pub work_item: WorkItemReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<ResultLocation>,
}
