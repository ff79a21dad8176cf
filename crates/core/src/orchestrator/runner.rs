//! Work item orchestrator implementation.
//!
//! A merge run goes through:
//! - Setup: bucket, app bundle and activity registration (once per process)
//! - Upload: inputs are stored, result objects reserved
//! - Submit: parts and combinator go out in a single request
//! - Track: one poller task per work item, joined before assembly

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use tracing::info;

use crate::auth::{ApsTokenClient, CredentialProvider, TokenSource};
use crate::automation::{DaClient, DesignAutomation, JobGraph, Registrar, WorkItemBuilder};
use crate::config::Config;
use crate::storage::{BlobStore, ObjectResolver, OssClient};

use super::assembler::ResultAssembler;
use super::poller::StatusPoller;
use super::progress::{ProgressCallback, ProgressEvent, ProgressNotifier};
use super::submitter::WorkItemSubmitter;
use super::types::{FinalResult, MergeRequest, OrchestratorError, ReferenceRequest, ReferenceResult};

/// Runs merge and reference-fetch jobs against Design Automation.
///
/// Every run publishes into fixed object keys of one bucket and one output
/// folder, so runs on the same orchestrator execute one at a time.
pub struct WorkItemOrchestrator {
    config: Config,
    credentials: Arc<CredentialProvider>,
    resolver: Arc<ObjectResolver>,
    service: Arc<dyn DesignAutomation>,
    registrar: Registrar,
    builder: WorkItemBuilder,
    progress: ProgressNotifier,
    merge_activity: OnceCell<String>,
    reference_activity: OnceCell<String>,
    run_lock: Mutex<()>,
}

impl WorkItemOrchestrator {
    pub fn new(
        config: &Config,
        token_source: Arc<dyn TokenSource>,
        service: Arc<dyn DesignAutomation>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let credentials = Arc::new(CredentialProvider::new(token_source));
        let resolver = Arc::new(ObjectResolver::new(
            Arc::clone(&blobs),
            Arc::clone(&credentials),
            config.storage.clone(),
        ));
        let registrar = Registrar::new(
            Arc::clone(&service),
            blobs,
            Arc::clone(&credentials),
            config.automation.clone(),
        );

        Self {
            config: config.clone(),
            credentials,
            resolver,
            service,
            registrar,
            builder: WorkItemBuilder::new(config.automation.clone()),
            progress: ProgressNotifier::default(),
            merge_activity: OnceCell::new(),
            reference_activity: OnceCell::new(),
            run_lock: Mutex::new(()),
        }
    }

    /// Orchestrator backed by the real APS services.
    pub fn from_config(config: &Config) -> Result<Self, OrchestratorError> {
        let token_source = ApsTokenClient::new(&config.aps)?;
        let blobs = OssClient::new(&config.aps)?;
        let service = DaClient::new(&config.aps).map_err(OrchestratorError::setup)?;

        Ok(Self::new(
            config,
            Arc::new(token_source),
            Arc::new(service),
            Arc::new(blobs),
        ))
    }

    /// Receive progress events from every subsequent run.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = ProgressNotifier::new(callback);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<ObjectResolver> {
        &self.resolver
    }

    /// Register the merge bundle (when a package is configured) and the merge
    /// activity. Runs once; later calls return the registered id.
    pub async fn prepare_merge(&self) -> Result<String, OrchestratorError> {
        self.merge_activity
            .get_or_try_init(|| async {
                if let Some(package) = &self.config.automation.bundle_zip {
                    self.progress.emit(ProgressEvent::phase("Setting up app bundle"));
                    self.registrar
                        .ensure_app_bundle(package)
                        .await
                        .map_err(OrchestratorError::setup)?;
                }
                self.progress.emit(ProgressEvent::phase("Setting up activity"));
                let registration = self
                    .registrar
                    .ensure_activity(&self.registrar.merge_activity())
                    .await
                    .map_err(OrchestratorError::setup)?;
                Ok::<_, OrchestratorError>(registration.id)
            })
            .await
            .cloned()
    }

    pub async fn prepare_reference(&self) -> Result<String, OrchestratorError> {
        self.reference_activity
            .get_or_try_init(|| async {
                self.progress.emit(ProgressEvent::phase("Setting up activity"));
                let registration = self
                    .registrar
                    .ensure_activity(&self.registrar.reference_activity())
                    .await
                    .map_err(OrchestratorError::setup)?;
                Ok::<_, OrchestratorError>(registration.id)
            })
            .await
            .cloned()
    }

    /// Plot every part, merge the intermediates, and collect the results.
    ///
    /// Inputs are checked on disk before any request is made.
    pub async fn run_merge(&self, request: &MergeRequest) -> Result<FinalResult, OrchestratorError> {
        request.validate()?;
        ObjectResolver::check_artifacts(request.parts.iter().map(|p| p.source.as_path()))?;

        let _running = self.run_lock.lock().await;
        let result = self.execute_merge(request).await;
        if let Err(e) = &result {
            self.progress.emit(ProgressEvent::Failed {
                message: e.to_string(),
            });
        }
        result
    }

    async fn execute_merge(&self, request: &MergeRequest) -> Result<FinalResult, OrchestratorError> {
        self.progress.emit(ProgressEvent::phase("Setting up storage"));
        self.resolver.ensure_bucket().await?;
        self.prepare_merge().await?;

        self.progress.emit(ProgressEvent::phase("Uploading inputs"));
        let mut inputs = Vec::with_capacity(request.parts.len());
        for part in &request.parts {
            let key = MergeRequest::source_key(&part.source).ok_or_else(|| {
                OrchestratorError::InvalidRequest(format!(
                    "'{}' has no file name",
                    part.source.display()
                ))
            })?;
            inputs.push(self.resolver.upload_file(&part.source, &key).await?);
        }

        let mut intermediates = Vec::with_capacity(request.parts.len());
        for part in &request.parts {
            let reserved = self.resolver.reserve(&part.output_key).await?;
            intermediates.push((part.output_key.clone(), reserved));
        }
        let output = self.resolver.reserve(&request.output_key).await?;

        let credential = self.credentials.internal().await?;
        let parts = request
            .parts
            .iter()
            .zip(&inputs)
            .map(|(part, input)| self.builder.part_work_item(input, &part.output_key, &credential))
            .collect();
        let combinator = self
            .builder
            .combinator_work_item(&intermediates, &output, &credential);
        let graph = JobGraph::new(parts, combinator)?;

        self.progress.emit(ProgressEvent::phase("Submitting work items"));
        info!(
            "Submitting {} parts and a combinator to {}",
            graph.part_count(),
            self.service.name()
        );
        let submitted = WorkItemSubmitter::new(Arc::clone(&self.service), self.progress.clone())
            .submit(&graph, &credential)
            .await?;

        self.progress.emit(ProgressEvent::phase("Waiting for work items"));
        let assembler = self.assembler();
        let result_keys = request.result_keys();
        self.bounded(assembler.assemble(submitted, &result_keys)).await
    }

    /// Fetch a caller-owned item with its references into a zip.
    pub async fn run_reference(
        &self,
        request: &ReferenceRequest,
    ) -> Result<ReferenceResult, OrchestratorError> {
        request.validate()?;

        let _running = self.run_lock.lock().await;
        let result = self.execute_reference(request).await;
        if let Err(e) = &result {
            self.progress.emit(ProgressEvent::Failed {
                message: e.to_string(),
            });
        }
        result
    }

    async fn execute_reference(
        &self,
        request: &ReferenceRequest,
    ) -> Result<ReferenceResult, OrchestratorError> {
        self.progress.emit(ProgressEvent::phase("Setting up storage"));
        self.resolver.ensure_bucket().await?;
        self.prepare_reference().await?;

        let output = self.resolver.reserve(&request.output_key).await?;
        let credential = self.credentials.internal().await?;
        let item = self.builder.reference_work_item(
            &request.item_url,
            &request.user_token,
            &output,
            &credential,
        );

        self.progress.emit(ProgressEvent::phase("Submitting work item"));
        let submitted = WorkItemSubmitter::new(Arc::clone(&self.service), self.progress.clone())
            .submit_single(&item, &credential)
            .await?;

        self.progress.emit(ProgressEvent::phase("Waiting for work item"));
        let assembler = self.assembler();
        self.bounded(assembler.assemble_single(submitted, &request.output_key))
            .await
    }

    /// Delete every bucket the application owns.
    pub async fn purge_buckets(&self) -> Result<Vec<String>, OrchestratorError> {
        let _running = self.run_lock.lock().await;
        self.progress.emit(ProgressEvent::phase("Deleting buckets"));
        Ok(self.resolver.purge_buckets().await?)
    }

    fn assembler(&self) -> ResultAssembler {
        let poller = StatusPoller::new(
            Arc::clone(&self.service),
            Arc::clone(self.resolver.store()),
            Arc::clone(&self.credentials),
            Duration::from_millis(self.config.poller.interval_ms),
            self.progress.clone(),
        );
        ResultAssembler::new(
            poller,
            Arc::clone(&self.resolver),
            self.config.output.clone(),
            self.progress.clone(),
        )
    }

    /// Apply the configured upper bound on the whole wait, if any.
    async fn bounded<T>(
        &self,
        wait: impl std::future::Future<Output = Result<T, OrchestratorError>>,
    ) -> Result<T, OrchestratorError> {
        match self.config.poller.max_wait_secs {
            Some(secs) => {
                let limit = Duration::from_secs(secs);
                tokio::time::timeout(limit, wait)
                    .await
                    .map_err(|_| OrchestratorError::Timeout(limit))?
            }
            None => wait.await,
        }
    }
}
