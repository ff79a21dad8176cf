//! Mock Design Automation service for testing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::auth::Credential;
use crate::automation::{
    Activity, Alias, AppBundle, AppBundleDetails, AutomationError, CombinedStatus,
    DesignAutomation, JobGraph, RegistryKind, Status, UploadParameters, WorkItem, WorkItemStatus,
};

use super::fixtures;
use super::MockBlobStore;

const UPLOAD_PREFIX: &str = "https://upload.test/";
const PACKAGE_PREFIX: &str = "https://packages.test/";

#[derive(Debug, Clone)]
struct RegisteredBundle {
    engine: String,
    version: u32,
}

/// Mock implementation of the DesignAutomation trait.
///
/// Provides controllable behavior for testing:
/// - Scripted status sequences per work item id
/// - Recorded submissions and status queries
/// - An in-memory bundle and activity registry
/// - Injected submission and status failures
///
/// Handle ids are predictable: the first combined submission yields
/// `part-0`, `part-1`, ... and `combinator`; later ones `part-<n>-<i>` and
/// `combinator-<n>`. Single submissions yield `workitem-<n>`.
///
/// Unscripted work items answer `inprogress` once, then `success`. A script
/// is consumed one status per query and its last status repeats.
///
/// # Example
///
/// ```rust,ignore
/// let service = MockAutomation::new();
/// service.script_status("part-1", vec![Status::InProgress, Status::FailedDownload]).await;
///
/// // ... run the orchestrator ...
///
/// assert_eq!(service.status_query_count("part-1").await, 2);
/// ```
#[derive(Debug, Default)]
pub struct MockAutomation {
    scripts: Arc<RwLock<HashMap<String, VecDeque<Status>>>>,
    queries: Arc<RwLock<HashMap<String, usize>>>,
    failing_status: Arc<RwLock<HashSet<String>>>,
    next_status_error: Arc<RwLock<Option<AutomationError>>>,
    next_submit_error: Arc<RwLock<Option<AutomationError>>>,
    dropped_handles: Arc<RwLock<usize>>,
    graphs: Arc<RwLock<Vec<JobGraph>>>,
    items: Arc<RwLock<Vec<WorkItem>>>,
    combined_submissions: AtomicUsize,
    single_submissions: AtomicUsize,
    bundles: Arc<RwLock<HashMap<String, RegisteredBundle>>>,
    activities: Arc<RwLock<HashMap<String, Activity>>>,
    packages: Arc<RwLock<Vec<Vec<u8>>>>,
    activity_lookups: AtomicUsize,
    package_store: Option<Arc<MockBlobStore>>,
}

impl MockAutomation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish uploaded bundle packages through `store`, so registration can
    /// download and compare them.
    pub fn with_package_store(mut self, store: Arc<MockBlobStore>) -> Self {
        self.package_store = Some(store);
        self
    }

    /// Statuses returned by successive queries for `id`.
    pub async fn script_status(&self, id: &str, statuses: Vec<Status>) {
        self.scripts
            .write()
            .await
            .insert(id.to_string(), statuses.into());
    }

    pub async fn status_query_count(&self, id: &str) -> usize {
        self.queries.read().await.get(id).copied().unwrap_or(0)
    }

    /// Every status query for `id` fails.
    pub async fn fail_status_for(&self, id: &str) {
        self.failing_status.write().await.insert(id.to_string());
    }

    pub async fn set_next_status_error(&self, error: AutomationError) {
        *self.next_status_error.write().await = Some(error);
    }

    pub async fn set_next_submit_error(&self, error: AutomationError) {
        *self.next_submit_error.write().await = Some(error);
    }

    /// Answer combined submissions with `count` fewer part handles.
    pub async fn drop_part_handles(&self, count: usize) {
        *self.dropped_handles.write().await = count;
    }

    pub async fn submitted_graphs(&self) -> Vec<JobGraph> {
        self.graphs.read().await.clone()
    }

    pub async fn submitted_work_items(&self) -> Vec<WorkItem> {
        self.items.read().await.clone()
    }

    pub async fn uploaded_packages(&self) -> Vec<Vec<u8>> {
        self.packages.read().await.clone()
    }

    /// Current version of the activity registered as `name`.
    pub async fn activity_version(&self, name: &str) -> Option<u32> {
        self.activities
            .read()
            .await
            .get(name)
            .and_then(|activity| activity.version)
    }

    pub async fn activity_lookup_count(&self) -> usize {
        self.activity_lookups.load(Ordering::SeqCst)
    }

    async fn take_submit_error(&self) -> Result<(), AutomationError> {
        match self.next_submit_error.write().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn upload_parameters(name: &str, version: u32) -> UploadParameters {
        UploadParameters {
            endpoint_url: format!("{}{}/{}", UPLOAD_PREFIX, name, version),
            form_data: [("key".to_string(), format!("{}/{}.zip", name, version))]
                .into_iter()
                .collect(),
        }
    }
}

/// `owner.name+label` -> `name`
fn unqualified(id: &str) -> &str {
    let without_owner = id.split_once('.').map(|(_, rest)| rest).unwrap_or(id);
    without_owner
        .split_once('+')
        .map(|(name, _)| name)
        .unwrap_or(without_owner)
}

fn not_found(what: &str) -> AutomationError {
    AutomationError::ApiError {
        status: 404,
        message: format!("{} not found", what),
    }
}

#[async_trait]
impl DesignAutomation for MockAutomation {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit_work_item(
        &self,
        _credential: &Credential,
        item: &WorkItem,
    ) -> Result<WorkItemStatus, AutomationError> {
        self.take_submit_error().await?;
        self.items.write().await.push(item.clone());
        let n = self.single_submissions.fetch_add(1, Ordering::SeqCst);
        Ok(fixtures::pending_handle(&format!("workitem-{}", n)))
    }

    async fn submit_combined(
        &self,
        _credential: &Credential,
        graph: &JobGraph,
    ) -> Result<CombinedStatus, AutomationError> {
        self.take_submit_error().await?;
        self.graphs.write().await.push(graph.clone());

        let n = self.combined_submissions.fetch_add(1, Ordering::SeqCst);
        let returned = graph
            .part_count()
            .saturating_sub(*self.dropped_handles.read().await);
        let parts = (0..returned)
            .map(|i| match n {
                0 => fixtures::pending_handle(&format!("part-{}", i)),
                _ => fixtures::pending_handle(&format!("part-{}-{}", n, i)),
            })
            .collect();
        let combinator = match n {
            0 => fixtures::pending_handle("combinator"),
            _ => fixtures::pending_handle(&format!("combinator-{}", n)),
        };

        Ok(CombinedStatus { parts, combinator })
    }

    async fn work_item_status(
        &self,
        _credential: &Credential,
        id: &str,
    ) -> Result<WorkItemStatus, AutomationError> {
        *self.queries.write().await.entry(id.to_string()).or_default() += 1;

        if let Some(error) = self.next_status_error.write().await.take() {
            return Err(error);
        }
        if self.failing_status.read().await.contains(id) {
            return Err(AutomationError::ApiError {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }

        let status = {
            let mut scripts = self.scripts.write().await;
            let script = scripts
                .entry(id.to_string())
                .or_insert_with(|| VecDeque::from([Status::InProgress, Status::Success]));
            let next = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().copied()
            };
            next.unwrap_or(Status::Success)
        };

        let mut handle = fixtures::pending_handle(id);
        handle.status = status;
        if status.is_done() {
            handle.report_url = Some(fixtures::report_url(id));
            handle.stats = Some(fixtures::stats());
        }
        Ok(handle)
    }

    async fn get_app_bundle(
        &self,
        _credential: &Credential,
        qualified_id: &str,
    ) -> Result<Option<AppBundle>, AutomationError> {
        let name = unqualified(qualified_id);
        Ok(self.bundles.read().await.get(name).map(|bundle| AppBundle {
            id: qualified_id.to_string(),
            engine: bundle.engine.clone(),
            description: None,
            version: Some(bundle.version),
            package: Some(format!("{}{}/{}", PACKAGE_PREFIX, name, bundle.version)),
        }))
    }

    async fn create_app_bundle(
        &self,
        _credential: &Credential,
        bundle: &AppBundle,
    ) -> Result<AppBundleDetails, AutomationError> {
        let mut bundles = self.bundles.write().await;
        if bundles.contains_key(&bundle.id) {
            return Err(AutomationError::ApiError {
                status: 409,
                message: format!("app bundle {} already exists", bundle.id),
            });
        }
        bundles.insert(
            bundle.id.clone(),
            RegisteredBundle {
                engine: bundle.engine.clone(),
                version: 1,
            },
        );
        Ok(AppBundleDetails {
            version: 1,
            upload_parameters: Self::upload_parameters(&bundle.id, 1),
        })
    }

    async fn create_app_bundle_version(
        &self,
        _credential: &Credential,
        bundle: &AppBundle,
    ) -> Result<AppBundleDetails, AutomationError> {
        let mut bundles = self.bundles.write().await;
        let registered = bundles
            .get_mut(&bundle.id)
            .ok_or_else(|| not_found(&bundle.id))?;
        registered.version += 1;
        registered.engine = bundle.engine.clone();
        Ok(AppBundleDetails {
            version: registered.version,
            upload_parameters: Self::upload_parameters(&bundle.id, registered.version),
        })
    }

    async fn upload_app_bundle(
        &self,
        upload: &UploadParameters,
        package: Vec<u8>,
    ) -> Result<(), AutomationError> {
        let target = upload
            .endpoint_url
            .strip_prefix(UPLOAD_PREFIX)
            .ok_or_else(|| not_found(&upload.endpoint_url))?;
        if let Some(store) = &self.package_store {
            store
                .register_download(&format!("{}{}", PACKAGE_PREFIX, target), package.clone())
                .await;
        }
        self.packages.write().await.push(package);
        Ok(())
    }

    async fn get_activity(
        &self,
        _credential: &Credential,
        qualified_id: &str,
    ) -> Result<Option<Activity>, AutomationError> {
        self.activity_lookups.fetch_add(1, Ordering::SeqCst);
        let name = unqualified(qualified_id);
        Ok(self.activities.read().await.get(name).map(|activity| Activity {
            id: qualified_id.to_string(),
            ..activity.clone()
        }))
    }

    async fn create_activity(
        &self,
        _credential: &Credential,
        activity: &Activity,
    ) -> Result<Activity, AutomationError> {
        let mut activities = self.activities.write().await;
        if activities.contains_key(&activity.id) {
            return Err(AutomationError::ApiError {
                status: 409,
                message: format!("activity {} already exists", activity.id),
            });
        }
        let created = Activity {
            version: Some(1),
            ..activity.clone()
        };
        activities.insert(activity.id.clone(), created.clone());
        Ok(created)
    }

    async fn create_activity_version(
        &self,
        _credential: &Credential,
        activity: &Activity,
    ) -> Result<Activity, AutomationError> {
        let mut activities = self.activities.write().await;
        let current = activities
            .get(&activity.id)
            .ok_or_else(|| not_found(&activity.id))?;
        let created = Activity {
            version: Some(current.version.unwrap_or(1) + 1),
            ..activity.clone()
        };
        activities.insert(activity.id.clone(), created.clone());
        Ok(created)
    }

    async fn create_alias(
        &self,
        _credential: &Credential,
        kind: RegistryKind,
        id: &str,
        _alias: &Alias,
    ) -> Result<(), AutomationError> {
        let known = match kind {
            RegistryKind::AppBundle => self.bundles.read().await.contains_key(id),
            RegistryKind::Activity => self.activities.read().await.contains_key(id),
        };
        if known {
            Ok(())
        } else {
            Err(not_found(id))
        }
    }

    async fn update_alias(
        &self,
        credential: &Credential,
        kind: RegistryKind,
        id: &str,
        alias: &Alias,
    ) -> Result<(), AutomationError> {
        self.create_alias(credential, kind, id, alias).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unqualified() {
        assert_eq!(unqualified("xrefgetapp.mergepdf+prod"), "mergepdf");
        assert_eq!(unqualified("mergepdf"), "mergepdf");
    }

    #[tokio::test]
    async fn test_default_status_sequence() {
        let service = MockAutomation::new();
        let credential = fixtures::credential();

        let first = service.work_item_status(&credential, "x").await.unwrap();
        let second = service.work_item_status(&credential, "x").await.unwrap();
        let third = service.work_item_status(&credential, "x").await.unwrap();

        assert_eq!(first.status, Status::InProgress);
        assert!(first.report_url.is_none());
        assert_eq!(second.status, Status::Success);
        assert_eq!(third.status, Status::Success);
        assert!(second.report_url.is_some());
        assert_eq!(service.status_query_count("x").await, 3);
    }
}
