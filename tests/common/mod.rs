//! Shared test harness: an in-memory orchestrator behind the real router, with
//! call-counting doubles for every outbound collaborator.

#![allow(dead_code)]

pub mod doubles;

pub use doubles::*;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use reelflow_core::config::ReelflowConfig;
use reelflow_core::models::Workflow;
use reelflow_core::orchestration::{OrchestratorContext, Services, Stores};
use reelflow_core::state_machine::WorkflowStatus;
use reelflow_core::store::{
    DeadLetterLog, IdempotencyLedger, InMemoryDeadLetterLog, InMemoryIdempotencyLedger,
    InMemoryWorkflowStore, WorkflowStore,
};
use reelflow_core::web::{create_app, AppState};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Configuration with fast retries for tests
pub fn test_config() -> ReelflowConfig {
    let mut config = ReelflowConfig::default();
    config.environment = "test".to_string();
    config.server.public_base_url = "https://hooks.test".to_string();
    config.orchestration.export_backoff_base_ms = 1;
    config.orchestration.notifier_timeout_ms = 200;
    config.orchestration.stage_trigger_timeout_ms = 2_000;
    config
}

pub struct TestHarness {
    pub context: Arc<OrchestratorContext>,
    pub app: Router,
    pub workflows: Arc<InMemoryWorkflowStore>,
    pub ledger: Arc<InMemoryIdempotencyLedger>,
    pub dead_letters: Arc<InMemoryDeadLetterLog>,
    pub caption: Arc<FakeCaptionService>,
    pub scheduling: Arc<FakeSchedulingService>,
    pub storage: Arc<FakeAssetStorage>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::build(test_config(), None)
    }

    pub fn with_config(config: ReelflowConfig) -> Self {
        Self::build(config, None)
    }

    /// Harness whose idempotency ledger is replaced by `ledger`
    pub fn with_ledger(ledger: Arc<dyn IdempotencyLedger>) -> Self {
        Self::build(test_config(), Some(ledger))
    }

    fn build(config: ReelflowConfig, ledger_override: Option<Arc<dyn IdempotencyLedger>>) -> Self {
        let workflows = Arc::new(InMemoryWorkflowStore::new());
        let ledger = Arc::new(InMemoryIdempotencyLedger::new());
        let dead_letters = Arc::new(InMemoryDeadLetterLog::new());
        let caption = Arc::new(FakeCaptionService::new("p1"));
        let scheduling = Arc::new(FakeSchedulingService::default());
        let storage = Arc::new(FakeAssetStorage::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let stores = Stores {
            workflows: workflows.clone() as Arc<dyn WorkflowStore>,
            ledger: ledger_override.unwrap_or_else(|| ledger.clone() as Arc<dyn IdempotencyLedger>),
            dead_letters: dead_letters.clone() as Arc<dyn DeadLetterLog>,
        };
        let services = Services {
            caption: caption.clone(),
            scheduling: scheduling.clone(),
            storage: storage.clone(),
            notifier: notifier.clone(),
        };

        let context = Arc::new(OrchestratorContext::new(Arc::new(config), stores, services));
        let app = create_app(AppState::new(context.clone()));

        Self {
            context,
            app,
            workflows,
            ledger,
            dead_letters,
            caption,
            scheduling,
            storage,
            notifier,
        }
    }

    pub async fn seed(&self, workflow: Workflow) -> Workflow {
        self.workflows.create(workflow).await.unwrap()
    }

    /// Seed a workflow that has reached `caption_processing` with project `project_id`
    pub async fn seed_caption_stage(&self, tenant: &str, id: &str, project_id: &str) -> Workflow {
        let mut workflow = Workflow::avatar_processing(tenant, id, "v1").with_title("How Owner Financing Works");
        workflow.status = WorkflowStatus::CaptionProcessing;
        workflow.avatar_asset_url = Some("https://x/video.mp4".to_string());
        workflow.caption_external_id = Some(project_id.to_string());
        self.seed(workflow).await
    }

    pub async fn workflow(&self, tenant: &str, id: &str) -> Workflow {
        self.workflows.get(tenant, id).await.unwrap().unwrap()
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        self.send(Method::POST, path, serde_json::to_vec(body).unwrap(), &[]).await
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = self
            .app
            .clone()
            .oneshot(request.body(Body::from(body)).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Poll until the workflow reaches `status` (background tasks write back asynchronously)
    pub async fn wait_for_status(&self, tenant: &str, id: &str, status: WorkflowStatus) -> Workflow {
        let deadline = Utc::now() + chrono::Duration::seconds(5);
        loop {
            let workflow = self.workflow(tenant, id).await;
            if workflow.status == status {
                return workflow;
            }
            assert!(
                Utc::now() < deadline,
                "workflow {id} stuck in {} waiting for {status}",
                workflow.status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait for every detached post-processing task to finish
    pub async fn drain_background_tasks(&self) {
        self.context.tasks.close();
        tokio::time::timeout(Duration::from_secs(5), self.context.tasks.wait())
            .await
            .expect("background tasks did not finish");
        self.context.tasks.reopen();
    }
}

pub fn avatar_success(video_id: &str, callback_id: &str, url: &str) -> Value {
    serde_json::json!({
        "event_type": "avatar_video.success",
        "event_data": { "video_id": video_id, "callback_id": callback_id, "url": url }
    })
}

pub fn avatar_failure(video_id: &str, callback_id: &str, msg: &str) -> Value {
    serde_json::json!({
        "event_type": "avatar_video.fail",
        "event_data": { "video_id": video_id, "callback_id": callback_id, "msg": msg }
    })
}
