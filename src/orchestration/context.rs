//! # Orchestrator Context
//!
//! The process-wide handles every stage needs: configuration, the three stores,
//! the outbound collaborators, the asset-probe breaker and the tracker for
//! detached post-processing tasks. Built once at startup and shared behind an
//! `Arc`.

use crate::config::{ReelflowConfig, TenantProfile};
use crate::constants::ServiceKind;
use crate::error::{OrchestratorError, Result};
use crate::logging::{log_error, log_workflow_operation};
use crate::models::{CachedResponse, ClaimOutcome, IdempotencyKey, Workflow};
use crate::resilience::CircuitBreaker;
use crate::services::{
    notify_best_effort, AssetStorage, CaptionService, FailureAlert, FailureNotifier,
    HttpAssetStorage, HttpCaptionService, HttpSchedulingService, SchedulingService,
    TracingNotifier, WebhookNotifier,
};
use crate::state_machine::WorkflowEvent;
use crate::store::{
    DeadLetterLog, IdempotencyLedger, InMemoryDeadLetterLog, InMemoryIdempotencyLedger,
    InMemoryWorkflowStore, PgDeadLetterLog, PgIdempotencyLedger, PgWorkflowStore,
    TransitionOutcome, WorkflowStore,
};
use chrono::Utc;
use dashmap::DashSet;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Shared persistence handles
#[derive(Clone)]
pub struct Stores {
    pub workflows: Arc<dyn WorkflowStore>,
    pub ledger: Arc<dyn IdempotencyLedger>,
    pub dead_letters: Arc<dyn DeadLetterLog>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            workflows: Arc::new(InMemoryWorkflowStore::new()),
            ledger: Arc::new(InMemoryIdempotencyLedger::new()),
            dead_letters: Arc::new(InMemoryDeadLetterLog::new()),
        }
    }

    /// PostgreSQL-backed stores sharing one pool
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            workflows: Arc::new(PgWorkflowStore::new(pool.clone())),
            ledger: Arc::new(PgIdempotencyLedger::new(pool.clone())),
            dead_letters: Arc::new(PgDeadLetterLog::new(pool)),
        }
    }
}

/// Outbound collaborators
#[derive(Clone)]
pub struct Services {
    pub caption: Arc<dyn CaptionService>,
    pub scheduling: Arc<dyn SchedulingService>,
    pub storage: Arc<dyn AssetStorage>,
    pub notifier: Arc<dyn FailureNotifier>,
}

impl Services {
    /// HTTP clients for every collaborator named in `config`
    pub fn from_config(config: &ReelflowConfig) -> Result<Self> {
        let notifier: Arc<dyn FailureNotifier> = match config.alerts.webhook_url.as_deref() {
            Some(url) if !url.is_empty() => Arc::new(WebhookNotifier::new(
                url,
                config.orchestration.notifier_timeout(),
            )?),
            _ => Arc::new(TracingNotifier),
        };

        Ok(Self {
            caption: Arc::new(HttpCaptionService::new(&config.caption_service)?),
            scheduling: Arc::new(HttpSchedulingService::new(&config.scheduling_service)?),
            storage: Arc::new(HttpAssetStorage::new(&config.storage)?),
            notifier,
        })
    }
}

/// What to do with an idempotency claim once a delivery has been handled
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Settlement {
    /// Side effects ran; cache the response for redeliveries
    Complete(CachedResponse),
    /// Nothing ran; drop the claim so a redelivery is processed again
    Release(CachedResponse),
}

/// Result of the up-front ledger check
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Admission {
    Proceed,
    Reply(CachedResponse),
}

pub struct OrchestratorContext {
    pub config: Arc<ReelflowConfig>,
    pub stores: Stores,
    pub services: Services,
    pub asset_probe: CircuitBreaker,
    pub tasks: TaskTracker,
    /// `(tenant, workflow_id)` of post-processing runs in progress
    pub(crate) active_jobs: DashSet<(String, String)>,
}

impl OrchestratorContext {
    pub fn new(config: Arc<ReelflowConfig>, stores: Stores, services: Services) -> Self {
        let asset_probe = CircuitBreaker::new(
            "caption_asset_probe",
            config.orchestration.asset_probe.clone(),
        );
        Self {
            config,
            stores,
            services,
            asset_probe,
            tasks: TaskTracker::new(),
            active_jobs: DashSet::new(),
        }
    }

    pub fn tenant(&self, tenant: &str) -> Result<&TenantProfile> {
        self.config
            .tenant(tenant)
            .ok_or_else(|| OrchestratorError::not_found(format!("unknown tenant {tenant}")))
    }

    /// Atomically claim `key`, translating an existing record into a reply.
    ///
    /// Ledger errors propagate: without a working ledger no side effect may run.
    /// The claim is leased; a process that dies before settling stops blocking
    /// redeliveries once the lease lapses.
    pub(crate) async fn admit(&self, key: &IdempotencyKey, request_hash: &str) -> Result<Admission> {
        let outcome = self
            .stores
            .ledger
            .claim(
                key,
                request_hash,
                self.config.orchestration.claim_lease_seconds,
                Utc::now(),
            )
            .await?;

        Ok(match outcome {
            ClaimOutcome::Claimed => Admission::Proceed,
            ClaimOutcome::InFlight { .. } => {
                debug!(key = %key, "Delivery already in flight");
                Admission::Reply(in_flight_reply())
            }
            ClaimOutcome::Completed {
                response,
                request_hash: first_hash,
            } => {
                if first_hash != request_hash {
                    warn!(key = %key, "Duplicate delivery with a different body; replaying first response");
                }
                Admission::Reply(response)
            }
        })
    }

    /// Record the settlement of a claimed key and return the response to send
    pub(crate) async fn settle(&self, key: &IdempotencyKey, settlement: Settlement) -> CachedResponse {
        match settlement {
            Settlement::Complete(response) => {
                if let Err(e) = self
                    .stores
                    .ledger
                    .complete(
                        key,
                        response.clone(),
                        self.config.orchestration.idempotency_ttl_seconds,
                        Utc::now(),
                    )
                    .await
                {
                    log_error("idempotency", "complete", &e.to_string(), Some(&key.to_string()));
                }
                response
            }
            Settlement::Release(response) => {
                self.release(key).await;
                response
            }
        }
    }

    pub(crate) async fn release(&self, key: &IdempotencyKey) {
        if let Err(e) = self.stores.ledger.release(key).await {
            log_error("idempotency", "release", &e.to_string(), Some(&key.to_string()));
        }
    }

    /// Move `(tenant, id)` to `failed` with `reason` and alert.
    ///
    /// Checkpoints are untouched. Returns `None` when the workflow was already
    /// terminal or could not be updated; neither case is an error for the caller.
    pub async fn fail_workflow(&self, tenant: &str, id: &str, reason: &str) -> Option<Workflow> {
        let outcome = self
            .stores
            .workflows
            .transition(tenant, id, WorkflowEvent::fail_with_error(reason), Utc::now())
            .await;

        let workflow = match outcome {
            Ok(TransitionOutcome::Applied { workflow, .. }) => workflow,
            Ok(TransitionOutcome::Rejected { workflow, reason: why }) => {
                debug!(tenant, workflow_id = id, status = %workflow.status, reason = %why, "Workflow not failed");
                return None;
            }
            Err(e) => {
                log_error(
                    "orchestrator",
                    "fail_workflow",
                    &e.to_string(),
                    Some(&format!("{tenant}:{id} reason={reason}")),
                );
                return None;
            }
        };

        log_workflow_operation("failed", tenant, id, workflow.status.as_str(), Some(reason));
        self.notify_failure(&workflow, reason).await;
        Some(workflow)
    }

    async fn notify_failure(&self, workflow: &Workflow, reason: &str) {
        let alerts_enabled = self
            .config
            .tenant(&workflow.tenant)
            .map_or(true, |profile| profile.alerts_enabled);
        if !alerts_enabled {
            return;
        }
        let alert = FailureAlert::new(
            workflow.tenant.clone(),
            workflow.id.clone(),
            workflow.preferred_title().map(str::to_string),
            reason,
        );
        notify_best_effort(
            self.services.notifier.as_ref(),
            alert,
            self.config.orchestration.notifier_timeout(),
        )
        .await;
    }

    /// Webhook URL an external service should call back for `tenant`
    pub fn callback_url(&self, service: ServiceKind, tenant: &str) -> String {
        self.config.webhook_url(service, tenant)
    }
}

pub(crate) fn in_flight_reply() -> CachedResponse {
    CachedResponse::ok(json!({ "success": true, "message": "already processing" }))
}

pub(crate) fn message_reply(message: impl Into<String>) -> CachedResponse {
    CachedResponse::ok(json!({ "success": true, "message": message.into() }))
}
