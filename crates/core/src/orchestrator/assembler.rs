//! Waits for a submitted graph to finish and collects reports and results.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::automation::{CombinedStatus, WorkItemStatus};
use crate::config::OutputConfig;
use crate::storage::{ObjectResolver, StorageError};

use super::poller::{StatusPoller, TrackedWorkItem};
use super::progress::{ProgressEvent, ProgressNotifier};
use super::types::{
    check_object_key, FinalResult, ReferenceResult, ResultLocation, WorkItemReport,
};
use super::OrchestratorError;

pub struct ResultAssembler {
    poller: StatusPoller,
    resolver: Arc<ObjectResolver>,
    output: OutputConfig,
    progress: ProgressNotifier,
}

impl ResultAssembler {
    pub fn new(
        poller: StatusPoller,
        resolver: Arc<ObjectResolver>,
        output: OutputConfig,
        progress: ProgressNotifier,
    ) -> Self {
        Self {
            poller,
            resolver,
            output,
            progress,
        }
    }

    /// Join every part and the combinator, save their reports, and resolve
    /// `result_keys` when the combinator succeeded. A failed part is logged
    /// but does not decide the outcome.
    ///
    /// If any handle could not be tracked, the reports that did arrive are
    /// still saved before the first error is returned.
    pub async fn assemble(
        &self,
        submitted: CombinedStatus,
        result_keys: &[String],
    ) -> Result<FinalResult, OrchestratorError> {
        let tracked = self
            .poller
            .track_all(submitted.parts, submitted.combinator)
            .await;

        let mut first_error = None;
        let mut parts = Vec::with_capacity(tracked.parts.len());
        for result in tracked.parts {
            match result {
                Ok(item) => {
                    let report = self.save_report(item, "").await?;
                    if report.status.is_failure() {
                        warn!("Part {} failed with {}", report.id, report.status);
                    }
                    parts.push(report);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        let combinator = match tracked.combinator {
            Ok(item) => Some(self.save_report(item, "combinator_").await?),
            Err(e) => {
                first_error.get_or_insert(e);
                None
            }
        };

        let combinator = match (first_error, combinator) {
            (None, Some(combinator)) => combinator,
            (Some(e), _) => return Err(e.into()),
            (None, None) => {
                return Err(OrchestratorError::AssemblyFailure(
                    "combinator was not tracked".to_string(),
                ))
            }
        };

        let succeeded = combinator.status.is_success();
        let downloads = if succeeded {
            self.progress.emit(ProgressEvent::phase("Collecting results"));
            let mut downloads = Vec::with_capacity(result_keys.len());
            for key in result_keys {
                downloads.push(self.resolve(key).await?);
            }
            downloads
        } else {
            self.progress.emit(ProgressEvent::Failed {
                message: format!("combinator {} ended {}", combinator.id, combinator.status),
            });
            Vec::new()
        };

        info!(
            "Run finished: combinator {} {}, {} of {} parts succeeded",
            combinator.id,
            combinator.status,
            parts.iter().filter(|p| p.status.is_success()).count(),
            parts.len()
        );

        Ok(FinalResult {
            succeeded,
            combinator,
            parts,
            downloads,
        })
    }

    /// Single work item counterpart of `assemble`.
    pub async fn assemble_single(
        &self,
        submitted: WorkItemStatus,
        result_key: &str,
    ) -> Result<ReferenceResult, OrchestratorError> {
        let tracked = self.poller.await_completion(submitted).await?;
        let work_item = self.save_report(tracked, "").await?;
        let succeeded = work_item.status.is_success();

        let download = if succeeded {
            Some(self.resolve(result_key).await?)
        } else {
            self.progress.emit(ProgressEvent::Failed {
                message: format!("work item {} ended {}", work_item.id, work_item.status),
            });
            None
        };

        Ok(ReferenceResult {
            succeeded,
            work_item,
            download,
        })
    }

    /// Write the report as `{ok|err}_{prefix}{id}.log` in the output folder.
    async fn save_report(
        &self,
        tracked: TrackedWorkItem,
        prefix: &str,
    ) -> Result<WorkItemReport, OrchestratorError> {
        let mut report = WorkItemReport::from(tracked);
        let Some(text) = &report.report else {
            return Ok(report);
        };

        let outcome = if report.status.is_success() { "ok" } else { "err" };
        let path = self
            .output
            .dir
            .join(format!("{}_{}{}.log", outcome, prefix, report.id));
        write_file(&path, text.as_bytes())
            .await
            .map_err(|e| {
                OrchestratorError::AssemblyFailure(format!(
                    "cannot write report {}: {}",
                    path.display(),
                    e
                ))
            })?;

        self.progress.emit(ProgressEvent::ReportSaved {
            id: report.id.clone(),
            path: path.clone(),
        });
        report.report_path = Some(path);
        Ok(report)
    }

    /// Sign `key` and, if configured, download it into the output folder.
    async fn resolve(&self, key: &str) -> Result<ResultLocation, OrchestratorError> {
        check_object_key(key, "result key").map_err(|_| {
            OrchestratorError::AssemblyFailure(format!(
                "refusing to write {} outside {}",
                key,
                self.output.dir.display()
            ))
        })?;

        let url = self.resolver.signed_url(key).await.map_err(|e| match e {
            StorageError::Auth(e) => OrchestratorError::AuthFailure(e),
            other => OrchestratorError::AssemblyFailure(format!("cannot sign {}: {}", key, other)),
        })?;

        let local_path = if self.output.download_results {
            let dest = self.output.dir.join(key);
            let path = self.resolver.download_to(&url, &dest).await.map_err(|e| {
                OrchestratorError::AssemblyFailure(format!("cannot download {}: {}", key, e))
            })?;
            Some(path)
        } else {
            None
        };

        self.progress.emit(ProgressEvent::DownloadReady {
            object_key: key.to_string(),
            url: url.clone(),
        });

        Ok(ResultLocation {
            object_key: key.to_string(),
            url,
            local_path,
        })
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await
}
