//! Call-counting doubles for the outbound collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reelflow_core::error::{OrchestratorError, Result};
use reelflow_core::models::{CachedResponse, ClaimOutcome, IdempotencyKey};
use reelflow_core::services::{
    AssetStorage, CaptionProjectRequest, CaptionService, FailureAlert, FailureNotifier,
    PlatformOutcome, ScheduleRequest, ScheduleResponse, SchedulingService,
};
use reelflow_core::store::IdempotencyLedger;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

/// Caption service double; `create_project` is the Stage-2 trigger
pub struct FakeCaptionService {
    project_id: String,
    pub create_calls: AtomicUsize,
    pub export_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub fail_create: AtomicBool,
    pub hang_create: AtomicBool,
    /// Number of upcoming export calls that fail
    pub export_failures: AtomicU32,
    pub media_url: Mutex<Option<String>>,
    pub project_requests: Mutex<Vec<CaptionProjectRequest>>,
    pub export_webhooks: Mutex<Vec<String>>,
}

impl FakeCaptionService {
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            create_calls: AtomicUsize::new(0),
            export_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
            hang_create: AtomicBool::new(false),
            export_failures: AtomicU32::new(0),
            media_url: Mutex::new(None),
            project_requests: Mutex::new(Vec::new()),
            export_webhooks: Mutex::new(Vec::new()),
        }
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn exports(&self) -> usize {
        self.export_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptionService for FakeCaptionService {
    async fn create_project(&self, request: &CaptionProjectRequest) -> Result<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.project_requests.lock().push(request.clone());
        if self.hang_create.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(OrchestratorError::upstream("caption", "HTTP 503 - unavailable"));
        }
        Ok(self.project_id.clone())
    }

    async fn request_export(&self, _project_id: &str, webhook_url: &str) -> Result<()> {
        self.export_calls.fetch_add(1, Ordering::SeqCst);
        self.export_webhooks.lock().push(webhook_url.to_string());
        let remaining = self.export_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.export_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(OrchestratorError::upstream("caption", "HTTP 500 - export failed"));
        }
        Ok(())
    }

    async fn fetch_media_url(&self, _project_id: &str) -> Result<Option<String>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.media_url.lock().clone())
    }
}

/// Scheduling double: every requested platform succeeds unless told otherwise
#[derive(Default)]
pub struct FakeSchedulingService {
    pub calls: AtomicUsize,
    pub reject_all: AtomicBool,
    pub requests: Mutex<Vec<ScheduleRequest>>,
}

impl FakeSchedulingService {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchedulingService for FakeSchedulingService {
    async fn schedule(&self, request: &ScheduleRequest) -> Result<ScheduleResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let reject = self.reject_all.load(Ordering::SeqCst);
        Ok(ScheduleResponse {
            outcomes: request
                .slots
                .iter()
                .map(|slot| PlatformOutcome {
                    platform: slot.platform,
                    post_id: (!reject).then(|| format!("post-{}", slot.platform)),
                    error: reject.then(|| "account not connected".to_string()),
                })
                .collect(),
        })
    }
}

/// Storage double; uploads from any URL in `failing_sources` fail
#[derive(Default)]
pub struct FakeAssetStorage {
    pub calls: AtomicUsize,
    pub uploads: Mutex<Vec<(String, String)>>,
    pub failing_sources: Mutex<HashSet<String>>,
}

impl FakeAssetStorage {
    pub fn fail_source(&self, url: &str) {
        self.failing_sources.lock().insert(url.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetStorage for FakeAssetStorage {
    async fn upload_from_url(&self, source_url: &str, path: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_sources.lock().contains(source_url) {
            return Err(OrchestratorError::upstream("storage", "download of source asset failed: HTTP 403"));
        }
        self.uploads.lock().push((source_url.to_string(), path.to_string()));
        Ok(format!("https://cdn.test/{path}"))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub alerts: Mutex<Vec<FailureAlert>>,
    pub fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.alerts.lock().len()
    }
}

#[async_trait]
impl FailureNotifier for RecordingNotifier {
    async fn notify(&self, alert: &FailureAlert) -> Result<()> {
        self.alerts.lock().push(alert.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(OrchestratorError::upstream("alerts", "alert channel down"));
        }
        Ok(())
    }
}

/// Ledger whose every operation fails
pub struct FailingLedger;

#[async_trait]
impl IdempotencyLedger for FailingLedger {
    async fn lookup(&self, _key: &IdempotencyKey, _now: DateTime<Utc>) -> Result<Option<ClaimOutcome>> {
        Err(OrchestratorError::store("ledger unavailable"))
    }

    async fn claim(
        &self,
        _key: &IdempotencyKey,
        _request_hash: &str,
        _lease_seconds: u64,
        _now: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        Err(OrchestratorError::store("ledger unavailable"))
    }

    async fn complete(
        &self,
        _key: &IdempotencyKey,
        _response: CachedResponse,
        _ttl_seconds: u64,
        _now: DateTime<Utc>,
    ) -> Result<()> {
        Err(OrchestratorError::store("ledger unavailable"))
    }

    async fn release(&self, _key: &IdempotencyKey) -> Result<()> {
        Err(OrchestratorError::store("ledger unavailable"))
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<u64> {
        Err(OrchestratorError::store("ledger unavailable"))
    }
}
