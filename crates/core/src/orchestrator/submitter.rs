//! Sends work items to the service and hands back tracking handles.

use std::sync::Arc;

use tracing::info;

use crate::auth::Credential;
use crate::automation::{
    AutomationError, CombinedStatus, DesignAutomation, JobGraph, WorkItem, WorkItemStatus,
};

use super::progress::{ProgressEvent, ProgressNotifier, WorkItemRole};
use super::OrchestratorError;

pub struct WorkItemSubmitter {
    service: Arc<dyn DesignAutomation>,
    progress: ProgressNotifier,
}

impl WorkItemSubmitter {
    pub fn new(service: Arc<dyn DesignAutomation>, progress: ProgressNotifier) -> Self {
        Self { service, progress }
    }

    /// Submit the whole graph in one request. The answer must carry exactly
    /// one handle per part, in submission order, plus the combinator's.
    pub async fn submit(
        &self,
        graph: &JobGraph,
        credential: &Credential,
    ) -> Result<CombinedStatus, OrchestratorError> {
        let submitted = self
            .service
            .submit_combined(credential, graph)
            .await
            .map_err(OrchestratorError::submission)?;

        if submitted.parts.len() != graph.part_count() {
            return Err(OrchestratorError::SubmissionFailure(
                AutomationError::UnexpectedResponse(format!(
                    "submitted {} parts, got {} handles",
                    graph.part_count(),
                    submitted.parts.len()
                )),
            ));
        }

        for (index, part) in submitted.parts.iter().enumerate() {
            info!("Submitted part {} as {}", index + 1, part.id);
            self.progress.emit(ProgressEvent::WorkItemSubmitted {
                id: part.id.clone(),
                role: WorkItemRole::Part(index),
            });
        }
        info!("Submitted combinator as {}", submitted.combinator.id);
        self.progress.emit(ProgressEvent::WorkItemSubmitted {
            id: submitted.combinator.id.clone(),
            role: WorkItemRole::Combinator,
        });

        Ok(submitted)
    }

    pub async fn submit_single(
        &self,
        item: &WorkItem,
        credential: &Credential,
    ) -> Result<WorkItemStatus, OrchestratorError> {
        let submitted = self
            .service
            .submit_work_item(credential, item)
            .await
            .map_err(OrchestratorError::submission)?;

        info!("Submitted {} as {}", item.activity_id(), submitted.id);
        self.progress.emit(ProgressEvent::WorkItemSubmitted {
            id: submitted.id.clone(),
            role: WorkItemRole::Single,
        });
        Ok(submitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockAutomation};

    #[tokio::test]
    async fn test_one_handle_per_part_in_order() {
        let service = Arc::new(MockAutomation::new());
        let submitter = WorkItemSubmitter::new(service.clone(), ProgressNotifier::default());
        let graph = fixtures::job_graph(&["first.pdf", "second.pdf", "third.pdf"]);

        let submitted = submitter
            .submit(&graph, &fixtures::credential())
            .await
            .unwrap();

        assert_eq!(submitted.parts.len(), 3);
        let ids: Vec<_> = submitted.parts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["part-0", "part-1", "part-2"]);
        assert_eq!(submitted.combinator.id, "combinator");
        assert_eq!(service.submitted_graphs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_handle_count_mismatch_is_submission_failure() {
        let service = Arc::new(MockAutomation::new());
        service.drop_part_handles(1).await;
        let submitter = WorkItemSubmitter::new(service, ProgressNotifier::default());

        let result = submitter
            .submit(
                &fixtures::job_graph(&["first.pdf", "second.pdf"]),
                &fixtures::credential(),
            )
            .await;

        assert!(matches!(
            result,
            Err(OrchestratorError::SubmissionFailure(
                AutomationError::UnexpectedResponse(_)
            ))
        ));
    }

    #[tokio::test]
    async fn test_service_error_is_submission_failure() {
        let service = Arc::new(MockAutomation::new());
        service
            .set_next_submit_error(AutomationError::ApiError {
                status: 400,
                message: "bad activity".to_string(),
            })
            .await;
        let submitter = WorkItemSubmitter::new(service, ProgressNotifier::default());

        let result = submitter
            .submit(&fixtures::job_graph(&["first.pdf"]), &fixtures::credential())
            .await;

        assert!(matches!(result, Err(OrchestratorError::SubmissionFailure(_))));
    }
}
