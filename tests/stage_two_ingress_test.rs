//! Caption webhook (Stage-2) two-phase protocol through the real router.

mod common;

use axum::http::StatusCode;
use common::*;
use reelflow_core::models::Workflow;
use reelflow_core::state_machine::WorkflowStatus;
use serde_json::json;
use std::sync::atomic::Ordering;

const CAPTION_URL: &str = "https://caption.test/p1/export.mp4";

#[tokio::test]
async fn test_phase_a_requests_export_without_advancing_status() {
    let harness = TestHarness::new();
    harness.seed_caption_stage("carz", "wf1", "p1").await;

    let (status, body) = harness
        .post_json("/webhooks/caption/carz", &json!({ "projectId": "p1", "status": "completed" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Export triggered - awaiting completion webhook");
    assert_eq!(harness.caption.exports(), 1);
    assert_eq!(
        harness.caption.export_webhooks.lock()[0],
        "https://hooks.test/webhooks/caption/carz"
    );

    let workflow = harness.workflow("carz", "wf1").await;
    assert_eq!(workflow.status, WorkflowStatus::CaptionProcessing);
    assert!(workflow.export_requested_at.is_some());
    assert!(harness.ledger.is_empty(), "phase A must not occupy the project's ledger key");
}

#[tokio::test]
async fn test_repeated_phase_a_inside_window_is_noop() {
    let harness = TestHarness::new();
    harness.seed_caption_stage("carz", "wf1", "p1").await;
    let event = json!({ "projectId": "p1", "status": "completed" });

    harness.post_json("/webhooks/caption/carz", &event).await;
    let (status, body) = harness.post_json("/webhooks/caption/carz", &event).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Export already triggered - waiting for completion");
    assert_eq!(harness.caption.exports(), 1);
}

#[tokio::test]
async fn test_phase_b_after_phase_a_completes_workflow() {
    let harness = TestHarness::new();
    harness.seed_caption_stage("carz", "wf1", "p1").await;

    harness
        .post_json("/webhooks/caption/carz", &json!({ "projectId": "p1", "status": "completed" }))
        .await;
    let (status, body) = harness
        .post_json(
            "/webhooks/caption/carz",
            &json!({ "id": "p1", "status": "ready", "downloadUrl": CAPTION_URL }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Video processing queued");
    assert_eq!(body["workflow_id"], "wf1");

    let workflow = harness.wait_for_status("carz", "wf1", WorkflowStatus::Completed).await;
    assert_eq!(workflow.caption_asset_url.as_deref(), Some(CAPTION_URL));
    assert_eq!(
        workflow.final_asset_url.as_deref(),
        Some("https://cdn.test/carz/caption-videos/wf1.mp4")
    );
    assert_eq!(workflow.platforms_used, Some(6));
    assert_eq!(workflow.post_ids.len(), 6);
    assert!(workflow.completed_at.is_some());
    assert!(workflow.scheduled_for.is_some());

    assert_eq!(harness.scheduling.call_count(), 1);
    let request = harness.scheduling.requests.lock()[0].clone();
    assert_eq!(request.idempotency_key, "carz:wf1");
    assert_eq!(request.title, "How Owner Financing Works");
    assert!(request.caption.contains("#cars"));
}

#[tokio::test]
async fn test_phase_b_redelivery_is_replayed() {
    let harness = TestHarness::new();
    harness.seed_caption_stage("carz", "wf1", "p1").await;
    let event = json!({ "projectId": "p1", "status": "completed", "media_url": CAPTION_URL });

    let first = harness.post_json("/webhooks/caption/carz", &event).await;
    harness.drain_background_tasks().await;
    let second = harness.post_json("/webhooks/caption/carz", &event).await;
    harness.drain_background_tasks().await;

    assert_eq!(first, second);
    assert_eq!(harness.scheduling.call_count(), 1);
    assert_eq!(harness.storage.call_count(), 1);
    assert_eq!(harness.workflow("carz", "wf1").await.status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn test_export_retries_with_backoff() {
    let harness = TestHarness::new();
    harness.caption.export_failures.store(2, Ordering::SeqCst);
    harness.seed_caption_stage("carz", "wf1", "p1").await;

    let (status, _) = harness
        .post_json("/webhooks/caption/carz", &json!({ "projectId": "p1", "status": "done" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(harness.caption.exports(), 3);
    assert_eq!(harness.workflow("carz", "wf1").await.status, WorkflowStatus::CaptionProcessing);
}

#[tokio::test]
async fn test_export_exhaustion_fails_workflow() {
    let harness = TestHarness::new();
    harness.caption.export_failures.store(10, Ordering::SeqCst);
    harness.seed_caption_stage("carz", "wf1", "p1").await;

    let (status, _) = harness
        .post_json("/webhooks/caption/carz", &json!({ "projectId": "p1", "status": "completed" }))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(harness.caption.exports(), 3);
    let workflow = harness.workflow("carz", "wf1").await;
    assert_eq!(workflow.status, WorkflowStatus::Failed);
    assert!(workflow.error.as_deref().unwrap().contains("after 3 attempts"));
    assert_eq!(workflow.avatar_asset_url.as_deref(), Some("https://x/video.mp4"));
    assert_eq!(harness.notifier.count(), 1);
    assert_eq!(harness.dead_letters.len(), 1);
}

#[tokio::test]
async fn test_failure_status_records_cause() {
    let harness = TestHarness::new();
    harness.seed_caption_stage("carz", "wf1", "p1").await;

    let (status, body) = harness
        .post_json(
            "/webhooks/caption/carz",
            &json!({ "projectId": "p1", "status": "failed", "failureReason": "render crashed" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Failure recorded");
    let workflow = harness.workflow("carz", "wf1").await;
    assert_eq!(workflow.status, WorkflowStatus::Failed);
    assert_eq!(workflow.error.as_deref(), Some("render crashed"));
    assert_eq!(harness.notifier.count(), 1);
}

#[tokio::test]
async fn test_intermediate_status_is_echoed() {
    let harness = TestHarness::new();
    harness.seed_caption_stage("carz", "wf1", "p1").await;

    let (status, body) = harness
        .post_json("/webhooks/caption/carz", &json!({ "projectId": "p1", "status": "transcribing" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Status: transcribing");
    assert_eq!(harness.workflow("carz", "wf1").await.status, WorkflowStatus::CaptionProcessing);
    assert_eq!(harness.caption.exports(), 0);
}

#[tokio::test]
async fn test_unknown_project_is_not_found() {
    let harness = TestHarness::new();
    harness.seed_caption_stage("carz", "wf1", "p1").await;

    let (status, _) = harness
        .post_json("/webhooks/caption/carz", &json!({ "projectId": "p404", "status": "completed" }))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(harness.caption.exports(), 0);
}

#[tokio::test]
async fn test_project_lookup_is_tenant_scoped() {
    let harness = TestHarness::new();
    harness.seed_caption_stage("carz", "wf1", "p1").await;

    let (status, _) = harness
        .post_json(
            "/webhooks/caption/ownerfi",
            &json!({ "projectId": "p1", "status": "completed", "downloadUrl": CAPTION_URL }),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let workflow = harness.workflow("carz", "wf1").await;
    assert_eq!(workflow.status, WorkflowStatus::CaptionProcessing);
    assert!(workflow.caption_asset_url.is_none());
}

#[tokio::test]
async fn test_missing_project_id_is_bad_request() {
    let harness = TestHarness::new();
    let (status, _) = harness
        .post_json("/webhooks/caption/carz", &json!({ "status": "completed" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_completed_workflow_ignores_late_export() {
    let harness = TestHarness::new();
    let mut workflow = Workflow::avatar_processing("carz", "wf1", "v1");
    workflow.status = WorkflowStatus::Completed;
    workflow.caption_external_id = Some("p1".to_string());
    harness.seed(workflow).await;

    let (status, body) = harness
        .post_json(
            "/webhooks/caption/carz",
            &json!({ "projectId": "p1", "status": "completed", "downloadUrl": CAPTION_URL }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "Workflow already in completed status - duplicate webhook ignored"
    );
    assert_eq!(harness.scheduling.call_count(), 0);
    assert!(harness.ledger.is_empty());
}

#[tokio::test]
async fn test_export_after_recorded_failure_replays_failure() {
    let harness = TestHarness::new();
    harness.seed_caption_stage("carz", "wf1", "p1").await;
    harness
        .post_json("/webhooks/caption/carz", &json!({ "projectId": "p1", "status": "error" }))
        .await;

    let (status, body) = harness
        .post_json(
            "/webhooks/caption/carz",
            &json!({ "projectId": "p1", "status": "completed", "downloadUrl": CAPTION_URL }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Failure recorded");
    let workflow = harness.workflow("carz", "wf1").await;
    assert_eq!(workflow.status, WorkflowStatus::Failed);
    assert_eq!(workflow.error.as_deref(), Some("Caption processing failed"));
    assert!(workflow.caption_asset_url.is_none());
    assert_eq!(harness.notifier.count(), 1);
}

#[tokio::test]
async fn test_failed_workflow_answers_already_failed() {
    let harness = TestHarness::new();
    harness.seed_caption_stage("carz", "wf1", "p1").await;
    harness.context.fail_workflow("carz", "wf1", "operator stopped").await;

    let (status, body) = harness
        .post_json("/webhooks/caption/carz", &json!({ "projectId": "p1", "status": "completed" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Workflow already failed");
    assert_eq!(harness.caption.exports(), 0);
}

#[tokio::test]
async fn test_export_pending_workflow_accepts_export() {
    let harness = TestHarness::new();
    let mut workflow = Workflow::avatar_processing("podcast", "wf1", "v1");
    workflow.status = WorkflowStatus::ExportPending;
    workflow.caption_external_id = Some("p1".to_string());
    harness.seed(workflow).await;

    let (status, _) = harness
        .post_json(
            "/webhooks/caption/podcast",
            &json!({ "project_id": "p1", "status": "completed", "videoUrl": CAPTION_URL }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    harness.wait_for_status("podcast", "wf1", WorkflowStatus::Completed).await;
}
