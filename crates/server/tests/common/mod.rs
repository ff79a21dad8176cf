//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock Design Automation, storage and token services injected.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use darunner_core::{
    testing::{MockAutomation, MockBlobStore, MockTokenSource},
    ProgressEvent, WorkItemOrchestrator,
};
use darunner_server::api::WsBroadcaster;
use darunner_server::state::AppState;

/// Re-export fixtures for test convenience
pub use darunner_core::testing::fixtures;

/// Test fixture for E2E testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_merge_run() {
///     let fixture = TestFixture::new();
///     let source = fixture.drawing("first.dwg");
///
///     let response = fixture.post("/api/v1/runs", json!({
///         "parts": [{ "source": source, "output_key": "first.pdf" }]
///     })).await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    pub router: Router,
    /// Mock Design Automation - script statuses, inspect submissions
    pub service: Arc<MockAutomation>,
    /// Mock object storage
    pub blobs: Arc<MockBlobStore>,
    pub ws_broadcaster: WsBroadcaster,
    /// Reports and downloads land here
    pub output_dir: TempDir,
    /// Drawings written by `drawing`
    pub source_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub fn new() -> Self {
        let output_dir = TempDir::new().expect("Failed to create output dir");
        let source_dir = TempDir::new().expect("Failed to create source dir");
        let config = fixtures::config(output_dir.path());

        let service = Arc::new(MockAutomation::new());
        let blobs = Arc::new(MockBlobStore::new());
        let ws_broadcaster = WsBroadcaster::default();

        let broadcaster_for_callback = ws_broadcaster.clone();
        let orchestrator = WorkItemOrchestrator::new(
            &config,
            Arc::new(MockTokenSource::new()),
            service.clone(),
            blobs.clone(),
        )
        .with_progress(Arc::new(move |event: &ProgressEvent| {
            broadcaster_for_callback.progress(event);
        }));

        let state = Arc::new(AppState::new(
            config,
            Arc::new(orchestrator),
            ws_broadcaster.clone(),
        ));
        let router = darunner_server::api::create_router(state);

        Self {
            router,
            service,
            blobs,
            ws_broadcaster,
            output_dir,
            source_dir,
        }
    }

    /// Write a drawing into the source folder and return its path.
    pub fn drawing(&self, name: &str) -> PathBuf {
        let path = self.source_dir.path().join(name);
        std::fs::write(&path, b"drawing").expect("Failed to write drawing");
        path
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
