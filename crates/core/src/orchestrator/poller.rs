//! Tracks submitted work items until they reach a terminal status.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthError, CredentialProvider};
use crate::automation::{AutomationError, DesignAutomation, WorkItemStatus};
use crate::storage::{BlobStore, StorageError};

use super::progress::{ProgressEvent, ProgressNotifier};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("status query for {id} failed: {source}")]
    Status {
        id: String,
        source: AutomationError,
    },

    #[error("report download for {id} failed: {source}")]
    Report { id: String, source: StorageError },

    #[error("credential refresh failed: {0}")]
    Auth(#[from] AuthError),

    #[error("tracking of {id} stopped: {reason}")]
    Aborted { id: String, reason: String },
}

/// Terminal status plus the report text, when one was published.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedWorkItem {
    pub status: WorkItemStatus,
    pub report: Option<String>,
}

/// Result of tracking a whole graph: one outcome per handle, in submission
/// order.
#[derive(Debug)]
pub struct TrackedGraph {
    pub parts: Vec<Result<TrackedWorkItem, PollError>>,
    pub combinator: Result<TrackedWorkItem, PollError>,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Part(usize),
    Combinator,
}

/// Polls work item status at a fixed interval.
#[derive(Clone)]
pub struct StatusPoller {
    service: Arc<dyn DesignAutomation>,
    blobs: Arc<dyn BlobStore>,
    credentials: Arc<CredentialProvider>,
    interval: Duration,
    progress: ProgressNotifier,
}

impl StatusPoller {
    pub fn new(
        service: Arc<dyn DesignAutomation>,
        blobs: Arc<dyn BlobStore>,
        credentials: Arc<CredentialProvider>,
        interval: Duration,
        progress: ProgressNotifier,
    ) -> Self {
        Self {
            service,
            blobs,
            credentials,
            interval,
            progress,
        }
    }

    /// Sleep, re-query, repeat until the status is terminal; then fetch the
    /// report. Each answer replaces the previous view entirely.
    pub async fn await_completion(
        &self,
        handle: WorkItemStatus,
    ) -> Result<TrackedWorkItem, PollError> {
        let mut current = handle;

        while !current.is_done() {
            tokio::time::sleep(self.interval).await;

            let credential = self.credentials.internal().await?;
            let next = self
                .service
                .work_item_status(&credential, &current.id)
                .await
                .map_err(|source| PollError::Status {
                    id: current.id.clone(),
                    source,
                })?;

            if next.status != current.status || next.progress != current.progress {
                debug!("Work item {} is {}", next.id, next.status);
                self.progress.emit(ProgressEvent::StatusChanged {
                    id: next.id.clone(),
                    status: next.status,
                    progress: next.progress.clone(),
                });
            }
            current = next;
        }

        let stats = current.stats.clone().unwrap_or_default();
        let queue_time_secs = stats.queue_time_secs();
        let processing_time_secs = stats.processing_time_secs();
        if current.status.is_success() {
            info!(
                "Work item {} succeeded (queued {:?}s, processed {:?}s)",
                current.id, queue_time_secs, processing_time_secs
            );
        } else {
            warn!("Work item {} finished with {}", current.id, current.status);
        }

        let report = match &current.report_url {
            Some(url) => {
                let bytes = self
                    .blobs
                    .download(url)
                    .await
                    .map_err(|source| PollError::Report {
                        id: current.id.clone(),
                        source,
                    })?;
                Some(String::from_utf8_lossy(&bytes).into_owned())
            }
            None => None,
        };

        self.progress.emit(ProgressEvent::WorkItemCompleted {
            id: current.id.clone(),
            status: current.status,
            queue_time_secs,
            processing_time_secs,
        });

        Ok(TrackedWorkItem {
            status: current,
            report,
        })
    }

    /// Track every handle concurrently and return once all of them are done.
    /// A failure on one handle does not stop the others.
    pub async fn track_all(
        &self,
        parts: Vec<WorkItemStatus>,
        combinator: WorkItemStatus,
    ) -> TrackedGraph {
        let part_ids: Vec<String> = parts.iter().map(|p| p.id.clone()).collect();
        let combinator_id = combinator.id.clone();

        let mut tasks = JoinSet::new();
        for (index, handle) in parts.into_iter().enumerate() {
            let poller = self.clone();
            tasks.spawn(async move { (Slot::Part(index), poller.await_completion(handle).await) });
        }
        let poller = self.clone();
        tasks.spawn(async move { (Slot::Combinator, poller.await_completion(combinator).await) });

        let mut part_results: Vec<Option<Result<TrackedWorkItem, PollError>>> =
            part_ids.iter().map(|_| None).collect();
        let mut combinator_result = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((Slot::Part(index), result)) => part_results[index] = Some(result),
                Ok((Slot::Combinator, result)) => combinator_result = Some(result),
                Err(e) => error!("Poller task failed: {}", e),
            }
        }

        let aborted = |id: &str| PollError::Aborted {
            id: id.to_string(),
            reason: "poller task panicked".to_string(),
        };

        TrackedGraph {
            parts: part_results
                .into_iter()
                .zip(&part_ids)
                .map(|(result, id)| result.unwrap_or_else(|| Err(aborted(id.as_str()))))
                .collect(),
            combinator: combinator_result.unwrap_or_else(|| Err(aborted(combinator_id.as_str()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::Status;
    use crate::testing::{fixtures, MockAutomation, MockBlobStore, MockTokenSource};

    fn poller(service: Arc<MockAutomation>, blobs: Arc<MockBlobStore>) -> StatusPoller {
        StatusPoller::new(
            service,
            blobs,
            Arc::new(CredentialProvider::new(Arc::new(MockTokenSource::new()))),
            Duration::from_millis(5),
            ProgressNotifier::default(),
        )
    }

    #[tokio::test]
    async fn test_await_completion_returns_terminal_status() {
        let service = Arc::new(MockAutomation::new());
        service
            .script_status(
                "w1",
                vec![Status::Pending, Status::InProgress, Status::InProgress, Status::Success],
            )
            .await;
        let poller = poller(service.clone(), Arc::new(MockBlobStore::new()));

        let tracked = poller
            .await_completion(fixtures::pending_handle("w1"))
            .await
            .unwrap();

        assert!(tracked.status.is_done());
        assert_eq!(tracked.status.status, Status::Success);
        assert_eq!(service.status_query_count("w1").await, 4);
    }

    #[tokio::test]
    async fn test_terminal_handle_is_not_requeried() {
        let service = Arc::new(MockAutomation::new());
        let poller = poller(service.clone(), Arc::new(MockBlobStore::new()));
        let mut handle = fixtures::pending_handle("done");
        handle.status = Status::Cancelled;

        let tracked = poller.await_completion(handle).await.unwrap();

        assert_eq!(tracked.status.status, Status::Cancelled);
        assert_eq!(service.status_query_count("done").await, 0);
    }

    #[tokio::test]
    async fn test_report_is_fetched_on_terminal_status() {
        let service = Arc::new(MockAutomation::new());
        let blobs = Arc::new(MockBlobStore::new());
        service
            .script_status("w1", vec![Status::FailedInstructions])
            .await;
        blobs
            .register_download(&fixtures::report_url("w1"), b"error: plot failed".to_vec())
            .await;
        let poller = poller(service, blobs);

        let tracked = poller
            .await_completion(fixtures::pending_handle("w1"))
            .await
            .unwrap();

        assert_eq!(tracked.status.status, Status::FailedInstructions);
        assert_eq!(tracked.report.as_deref(), Some("error: plot failed"));
    }

    #[tokio::test]
    async fn test_transport_error_is_poll_failure() {
        let service = Arc::new(MockAutomation::new());
        service
            .set_next_status_error(AutomationError::ApiError {
                status: 503,
                message: "unavailable".to_string(),
            })
            .await;
        let poller = poller(service, Arc::new(MockBlobStore::new()));

        let result = poller.await_completion(fixtures::pending_handle("w1")).await;

        assert!(matches!(result, Err(PollError::Status { id, .. }) if id == "w1"));
    }

    #[tokio::test]
    async fn test_track_all_waits_for_slowest_handle() {
        let service = Arc::new(MockAutomation::new());
        service.script_status("p0", vec![Status::Success]).await;
        service
            .script_status(
                "p1",
                std::iter::repeat(Status::InProgress)
                    .take(10)
                    .chain([Status::Success])
                    .collect(),
            )
            .await;
        service.script_status("c", vec![Status::InProgress, Status::Success]).await;
        let poller = poller(service.clone(), Arc::new(MockBlobStore::new()));

        let tracked = poller
            .track_all(
                vec![fixtures::pending_handle("p0"), fixtures::pending_handle("p1")],
                fixtures::pending_handle("c"),
            )
            .await;

        assert!(tracked.parts.iter().all(|p| p.as_ref().unwrap().status.is_done()));
        assert_eq!(tracked.parts[1].as_ref().unwrap().status.id, "p1");
        assert!(tracked.combinator.as_ref().unwrap().status.is_done());
        assert_eq!(service.status_query_count("p1").await, 11);
    }
}
