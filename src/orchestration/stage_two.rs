//! # Stage-2 Ingress
//!
//! Handles the caption service's two-phase completion protocol.
//!
//! Phase A (`completed` without a download URL) requests an export and answers
//! immediately; the export marker on the workflow makes repeated Phase A
//! deliveries inside the retry window no-ops. Phase B (download URL present)
//! checkpoints the URL, moves the workflow to `video_processing` and hands the
//! rest to a detached post-processing task.
//!
//! Phase A never writes the idempotency ledger: both phases carry the same
//! project id, and a cached Phase A reply would swallow the Phase B delivery.

use super::context::{message_reply, Admission, OrchestratorContext, Settlement};
use super::post_processor::PostProcessJob;
use crate::constants::ServiceKind;
use crate::error::{OrchestratorError, Result};
use crate::logging::{log_webhook_operation, log_workflow_operation};
use crate::models::{CachedResponse, CaptionEvent, CaptionStatus, ClaimOutcome, IdempotencyKey, Workflow};
use crate::state_machine::{StateMachineError, WorkflowEvent, WorkflowStatus};
use crate::store::TransitionOutcome;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const DEFAULT_FAILURE_REASON: &str = "Caption processing failed";

impl OrchestratorContext {
    /// Handle one verified caption delivery for `tenant`
    pub async fn handle_caption_event(
        self: &Arc<Self>,
        tenant: &str,
        event: CaptionEvent,
        request_hash: &str,
    ) -> Result<CachedResponse> {
        let started = Instant::now();
        self.tenant(tenant)?;

        let key = IdempotencyKey::new(ServiceKind::Caption, event.project_id.clone(), tenant);
        match self.stores.ledger.lookup(&key, Utc::now()).await? {
            Some(ClaimOutcome::Completed { response, .. }) => {
                log_webhook_operation("caption", tenant, Some(&event.project_id), "duplicate", None);
                return Ok(response);
            }
            Some(ClaimOutcome::InFlight { .. }) => {
                return Ok(super::context::in_flight_reply());
            }
            Some(ClaimOutcome::Claimed) | None => {}
        }

        let result = self.process_caption_event(tenant, &key, &event, request_hash).await;
        let outcome = if result.is_ok() { "handled" } else { "error" };
        log_webhook_operation(
            "caption",
            tenant,
            Some(&event.project_id),
            outcome,
            Some(started.elapsed().as_millis() as u64),
        );
        result
    }

    async fn process_caption_event(
        self: &Arc<Self>,
        tenant: &str,
        key: &IdempotencyKey,
        event: &CaptionEvent,
        request_hash: &str,
    ) -> Result<CachedResponse> {
        let workflow = self
            .stores
            .workflows
            .find_by_caption_id(tenant, &event.project_id)
            .await?
            .ok_or_else(|| {
                OrchestratorError::not_found(format!(
                    "no workflow for caption project {} under tenant {tenant}",
                    event.project_id
                ))
            })?;

        if let Some(reply) = status_guard(&workflow) {
            debug!(tenant, workflow_id = %workflow.id, status = %workflow.status, "Caption event ignored by status guard");
            return Ok(reply);
        }

        match (&event.status, event.download_url.as_deref()) {
            (CaptionStatus::Completed, None) => self.request_export(&workflow).await,
            (CaptionStatus::Completed, Some(url)) => {
                self.with_claim(key, request_hash, self.accept_export(&workflow, url))
                    .await
            }
            (CaptionStatus::Failed, _) => {
                let reason = event.error.as_deref().unwrap_or(DEFAULT_FAILURE_REASON);
                self.with_claim(key, request_hash, async {
                    self.fail_workflow(tenant, &workflow.id, reason).await;
                    Ok(Settlement::Complete(message_reply("Failure recorded")))
                })
                .await
            }
            (CaptionStatus::Intermediate(_), _) => {
                debug!(tenant, workflow_id = %workflow.id, status = %event.raw_status, "Intermediate caption status");
                Ok(CachedResponse::ok(json!({
                    "success": true,
                    "message": format!("Status: {}", event.raw_status),
                })))
            }
        }
    }

    /// Run `body` under an idempotency claim on `key`; `body` is not polled unless the claim succeeds
    async fn with_claim<Fut>(&self, key: &IdempotencyKey, request_hash: &str, body: Fut) -> Result<CachedResponse>
    where
        Fut: std::future::Future<Output = Result<Settlement>>,
    {
        if let Admission::Reply(response) = self.admit(key, request_hash).await? {
            return Ok(response);
        }
        match body.await {
            Ok(settlement) => Ok(self.settle(key, settlement).await),
            Err(e) => {
                self.release(key).await;
                Err(e)
            }
        }
    }

    /// Phase A: mark the export as requested, then call the export endpoint
    async fn request_export(&self, workflow: &Workflow) -> Result<CachedResponse> {
        let orchestration = &self.config.orchestration;
        let marked = self
            .stores
            .workflows
            .transition(
                &workflow.tenant,
                &workflow.id,
                WorkflowEvent::ExportRequested {
                    retry_window_secs: orchestration.export_retry_window_seconds,
                },
                Utc::now(),
            )
            .await?;

        match marked {
            TransitionOutcome::Applied { .. } => {}
            TransitionOutcome::Rejected {
                reason: StateMachineError::ExportAlreadyRequested { requested_at },
                ..
            } => {
                info!(
                    tenant = %workflow.tenant,
                    workflow_id = %workflow.id,
                    requested_at = %requested_at,
                    "Export already requested inside the retry window"
                );
                return Ok(message_reply("Export already triggered - waiting for completion"));
            }
            TransitionOutcome::Rejected { reason, .. } => return Err(reason.into()),
        }

        let project_id = workflow
            .caption_external_id
            .as_deref()
            .ok_or_else(|| OrchestratorError::Internal(format!("workflow {} has no caption project", workflow.id)))?;
        let webhook_url = self.callback_url(ServiceKind::Caption, &workflow.tenant);

        let mut attempt = 1;
        loop {
            match self.services.caption.request_export(project_id, &webhook_url).await {
                Ok(()) => break,
                Err(e) if attempt < orchestration.export_max_attempts => {
                    let delay = orchestration.export_backoff(attempt);
                    warn!(
                        tenant = %workflow.tenant,
                        workflow_id = %workflow.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Export request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    let reason = format!("export request failed after {attempt} attempts: {e}");
                    self.fail_workflow(&workflow.tenant, &workflow.id, &reason).await;
                    return Err(e);
                }
            }
        }

        log_workflow_operation(
            "export_requested",
            &workflow.tenant,
            &workflow.id,
            workflow.status.as_str(),
            Some(project_id),
        );
        Ok(CachedResponse::ok(json!({
            "success": true,
            "message": "Export triggered - awaiting completion webhook",
            "project_id": project_id,
        })))
    }

    /// Phase B: checkpoint the exported asset and detach post-processing
    async fn accept_export(self: &Arc<Self>, workflow: &Workflow, asset_url: &str) -> Result<Settlement> {
        let outcome = self
            .stores
            .workflows
            .transition(
                &workflow.tenant,
                &workflow.id,
                WorkflowEvent::CaptionExported {
                    asset_url: asset_url.to_string(),
                },
                Utc::now(),
            )
            .await?;

        let workflow = match outcome {
            TransitionOutcome::Applied { workflow, .. } => workflow,
            TransitionOutcome::Rejected { workflow, .. } => {
                return Ok(Settlement::Release(message_reply(format!(
                    "Workflow already in {} status - duplicate webhook ignored",
                    workflow.status
                ))));
            }
        };
        log_workflow_operation("caption_checkpoint", &workflow.tenant, &workflow.id, workflow.status.as_str(), Some(asset_url));

        self.spawn_post_processing(PostProcessJob {
            tenant: workflow.tenant.clone(),
            workflow_id: workflow.id.clone(),
            caption_asset_url: asset_url.to_string(),
            project_id: workflow.caption_external_id.clone(),
        });

        Ok(Settlement::Complete(CachedResponse::ok(json!({
            "success": true,
            "message": "Video processing queued",
            "workflow_id": workflow.id,
        }))))
    }
}

/// Reply for workflows that no longer accept caption events
fn status_guard(workflow: &Workflow) -> Option<CachedResponse> {
    match workflow.status {
        status if status.accepts_caption_events() => None,
        WorkflowStatus::Failed => Some(message_reply("Workflow already failed")),
        WorkflowStatus::VideoProcessing | WorkflowStatus::Posting | WorkflowStatus::Completed => {
            Some(message_reply(format!(
                "Workflow already in {} status - duplicate webhook ignored",
                workflow.status
            )))
        }
        _ => Some(message_reply(format!(
            "Workflow in {} status - caption event not expected yet",
            workflow.status
        ))),
    }
}
