//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides mock implementations of the external service traits,
//! allowing full pipeline runs without APS credentials or network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use darunner_core::testing::{MockAutomation, MockBlobStore, MockTokenSource};
//!
//! let service = Arc::new(MockAutomation::new());
//! let blobs = Arc::new(MockBlobStore::new());
//!
//! // Script the remote side
//! service.script_status("part-1", vec![Status::FailedDownload]).await;
//!
//! let orchestrator = WorkItemOrchestrator::new(
//!     &config,
//!     Arc::new(MockTokenSource::new()),
//!     service.clone(),
//!     blobs.clone(),
//! );
//! ```

mod mock_automation;
mod mock_blob_store;
mod mock_token_source;

pub use mock_automation::MockAutomation;
pub use mock_blob_store::{MockBlobStore, FALLBACK_BODY};
pub use mock_token_source::MockTokenSource;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use chrono::{Duration, TimeZone, Utc};

    use crate::auth::Credential;
    use crate::automation::{JobGraph, Statistics, Status, WorkItemBuilder, WorkItemStatus};
    use crate::config::{
        ApsConfig, AutomationConfig, Config, OutputConfig, PollerConfig, ServerConfig,
        StorageConfig,
    };
    use crate::storage::BlobReference;

    pub const BUCKET: &str = "test-bucket";

    /// Credential valid for an hour.
    pub fn credential() -> Credential {
        Credential::new("test-token", Utc::now() + Duration::hours(1))
    }

    /// Handle as returned right after submission.
    pub fn pending_handle(id: &str) -> WorkItemStatus {
        WorkItemStatus {
            id: id.to_string(),
            status: Status::Pending,
            progress: None,
            report_url: None,
            stats: None,
        }
    }

    pub fn report_url(id: &str) -> String {
        format!("https://reports.test/{}.txt", id)
    }

    /// Statistics of a work item that queued for 3s and processed for 12s.
    pub fn stats() -> Statistics {
        let queued = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Statistics {
            time_queued: Some(queued),
            time_download_started: Some(queued + Duration::seconds(3)),
            time_instruction_started: Some(queued + Duration::seconds(5)),
            time_instruction_ended: Some(queued + Duration::seconds(13)),
            time_upload_ended: Some(queued + Duration::seconds(15)),
            time_finished: Some(queued + Duration::seconds(16)),
            bytes_downloaded: Some(2048),
            bytes_uploaded: Some(1024),
        }
    }

    /// Graph with one part per intermediate key, merged into `final.pdf`.
    pub fn job_graph(keys: &[&str]) -> JobGraph {
        let builder = WorkItemBuilder::new(AutomationConfig::default());
        let credential = credential();

        let parts = keys
            .iter()
            .map(|key| {
                let source = key.replace(".pdf", ".dwg");
                builder.part_work_item(&BlobReference::new(BUCKET, &source), key, &credential)
            })
            .collect();
        let intermediates: Vec<(String, BlobReference)> = keys
            .iter()
            .map(|key| (key.to_string(), BlobReference::new(BUCKET, *key)))
            .collect();
        let combinator = builder.combinator_work_item(
            &intermediates,
            &BlobReference::new(BUCKET, "final.pdf"),
            &credential,
        );

        JobGraph::new(parts, combinator).unwrap()
    }

    /// Configuration with fast polling, writing into `output_dir`.
    pub fn config(output_dir: &Path) -> Config {
        Config {
            aps: ApsConfig {
                client_id: "test-client".to_string(),
                client_secret: "test-secret".to_string(),
                auth_url: "http://127.0.0.1:9/token".to_string(),
                oss_url: "http://127.0.0.1:9/oss/v2".to_string(),
                da_url: "http://127.0.0.1:9/da/v3".to_string(),
                timeout_secs: 5,
            },
            storage: StorageConfig {
                bucket_key: BUCKET.to_string(),
                ..StorageConfig::default()
            },
            automation: AutomationConfig::default(),
            poller: PollerConfig {
                interval_ms: 10,
                max_wait_secs: None,
            },
            output: OutputConfig {
                dir: output_dir.to_path_buf(),
                download_results: true,
            },
            server: ServerConfig::default(),
        }
    }
}
