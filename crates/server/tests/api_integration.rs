//! API integration tests against mock remote services.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestFixture;
use darunner_core::automation::Status;
use darunner_server::api::WsMessage;

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/health").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_hides_secret() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/config").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["aps"]["client_id"], "test-client");
    assert_eq!(response.body["aps"]["client_secret_configured"], true);
    assert!(response.body["aps"].get("client_secret").is_none());
    assert_eq!(response.body["storage"]["bucket_key"], "test-bucket");
}

#[tokio::test]
async fn test_merge_run_returns_final_result() {
    let fixture = TestFixture::new();
    let first = fixture.drawing("first.dwg");
    let second = fixture.drawing("second.dwg");

    let response = fixture
        .post(
            "/api/v1/runs",
            json!({
                "parts": [
                    { "source": first, "output_key": "first.pdf" },
                    { "source": second, "output_key": "second.pdf" }
                ]
            }),
        )
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["succeeded"], true);
    assert_eq!(response.body["combinator"]["status"], "success");
    assert_eq!(response.body["parts"].as_array().unwrap().len(), 2);

    let downloads = response.body["downloads"].as_array().unwrap();
    let merged = downloads
        .iter()
        .find(|d| d["object_key"] == "final.pdf")
        .expect("final.pdf should be listed");
    assert!(!merged["url"].as_str().unwrap().is_empty());
    assert_eq!(fixture.service.submitted_graphs().await.len(), 1);
}

#[tokio::test]
async fn test_failed_part_is_listed_in_result() {
    let fixture = TestFixture::new();
    fixture
        .service
        .script_status("part-1", vec![Status::FailedDownload])
        .await;
    let first = fixture.drawing("first.dwg");
    let second = fixture.drawing("second.dwg");

    let response = fixture
        .post(
            "/api/v1/runs",
            json!({
                "parts": [
                    { "source": first, "output_key": "first.pdf" },
                    { "source": second, "output_key": "second.pdf" }
                ]
            }),
        )
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["succeeded"], true);
    assert_eq!(response.body["parts"][1]["status"], "failedDownload");
}

#[tokio::test]
async fn test_missing_input_is_bad_request() {
    let fixture = TestFixture::new();
    let absent = fixture.source_dir.path().join("absent.dwg");

    let response = fixture
        .post(
            "/api/v1/runs",
            json!({ "parts": [{ "source": absent, "output_key": "absent.pdf" }] }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("absent.dwg"));
    assert_eq!(fixture.blobs.request_count(), 0);
}

#[tokio::test]
async fn test_empty_run_is_bad_request() {
    let fixture = TestFixture::new();

    let response = fixture.post("/api/v1/runs", json!({ "parts": [] })).await;

    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_output_key_with_path_is_bad_request() {
    let fixture = TestFixture::new();
    let first = fixture.drawing("first.dwg");

    let response = fixture
        .post(
            "/api/v1/runs",
            json!({
                "parts": [{ "source": first, "output_key": "first.pdf" }],
                "output_key": "../escaped.pdf"
            }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert_eq!(fixture.blobs.request_count(), 0);
}

#[tokio::test]
async fn test_handle_mismatch_is_bad_gateway() {
    let fixture = TestFixture::new();
    fixture.service.drop_part_handles(1).await;
    let first = fixture.drawing("first.dwg");

    let response = fixture
        .post(
            "/api/v1/runs",
            json!({ "parts": [{ "source": first, "output_key": "first.pdf" }] }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let fixture = TestFixture::new();

    let response = fixture.post_raw("/api/v1/runs", "{ not json").await;

    assert!(response.status.is_client_error());
}

#[tokio::test]
async fn test_reference_work_item() {
    let fixture = TestFixture::new();

    let response = fixture
        .post(
            "/api/v1/workitems",
            json!({
                "item_url": "https://items.test/project/drawing.dwg",
                "user_token": "user-token"
            }),
        )
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["succeeded"], true);
    assert_eq!(response.body["work_item"]["id"], "workitem-0");
    assert_eq!(response.body["download"]["object_key"], "result.zip");
}

#[tokio::test]
async fn test_reference_work_item_without_token_is_bad_request() {
    let fixture = TestFixture::new();

    let response = fixture
        .post(
            "/api/v1/workitems",
            json!({ "item_url": "https://items.test/drawing.dwg", "user_token": "" }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_run_progress_reaches_broadcaster() {
    let fixture = TestFixture::new();
    let mut rx = fixture.ws_broadcaster.subscribe();
    let first = fixture.drawing("first.dwg");

    let response = fixture
        .post(
            "/api/v1/runs",
            json!({ "parts": [{ "source": first, "output_key": "first.pdf" }] }),
        )
        .await;
    assert_status!(response, StatusCode::OK);

    let mut types = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let WsMessage::Progress { event } = msg {
            let json = serde_json::to_value(&event).unwrap();
            types.push(json["type"].as_str().unwrap().to_string());
        }
    }
    assert!(types.contains(&"work_item_submitted".to_string()));
    assert!(types.contains(&"work_item_completed".to_string()));
    assert!(types.contains(&"download_ready".to_string()));
}
