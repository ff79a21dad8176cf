//! Design Automation: work items, the combined fan-in graph, and the
//! app bundle / activity registry they run against.

mod builder;
mod client;
mod graph;
mod registry;
mod types;
mod workitem;

pub use builder::*;
pub use client::DaClient;
pub use graph::{GraphError, JobGraph, INTERMEDIATE_PREFIX};
pub use registry::*;
pub use types::*;
pub use workitem::*;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::{AuthError, Credential};
use crate::storage::StorageError;

/// Errors that can occur when talking to Design Automation.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Service returned an error.
    #[error("Design Automation error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("App bundle package not found: {}", .0.display())]
    MissingPackage(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The remote job execution service.
#[async_trait]
pub trait DesignAutomation: Send + Sync {
    /// Name of this service implementation
    fn name(&self) -> &str;

    async fn submit_work_item(
        &self,
        credential: &Credential,
        item: &WorkItem,
    ) -> Result<WorkItemStatus, AutomationError>;

    /// Submit parts and combinator in one request. Handles come back in
    /// submission order.
    async fn submit_combined(
        &self,
        credential: &Credential,
        graph: &JobGraph,
    ) -> Result<CombinedStatus, AutomationError>;

    async fn work_item_status(
        &self,
        credential: &Credential,
        id: &str,
    ) -> Result<WorkItemStatus, AutomationError>;

    /// `None` when no bundle is registered under `qualified_id`.
    async fn get_app_bundle(
        &self,
        credential: &Credential,
        qualified_id: &str,
    ) -> Result<Option<AppBundle>, AutomationError>;

    async fn create_app_bundle(
        &self,
        credential: &Credential,
        bundle: &AppBundle,
    ) -> Result<AppBundleDetails, AutomationError>;

    async fn create_app_bundle_version(
        &self,
        credential: &Credential,
        bundle: &AppBundle,
    ) -> Result<AppBundleDetails, AutomationError>;

    /// Upload a bundle package to the form endpoint returned on creation.
    async fn upload_app_bundle(
        &self,
        upload: &UploadParameters,
        package: Vec<u8>,
    ) -> Result<(), AutomationError>;

    /// `None` when no activity is registered under `qualified_id`.
    async fn get_activity(
        &self,
        credential: &Credential,
        qualified_id: &str,
    ) -> Result<Option<Activity>, AutomationError>;

    async fn create_activity(
        &self,
        credential: &Credential,
        activity: &Activity,
    ) -> Result<Activity, AutomationError>;

    async fn create_activity_version(
        &self,
        credential: &Credential,
        activity: &Activity,
    ) -> Result<Activity, AutomationError>;

    async fn create_alias(
        &self,
        credential: &Credential,
        kind: RegistryKind,
        id: &str,
        alias: &Alias,
    ) -> Result<(), AutomationError>;

    async fn update_alias(
        &self,
        credential: &Credential,
        kind: RegistryKind,
        id: &str,
        alias: &Alias,
    ) -> Result<(), AutomationError>;
}
