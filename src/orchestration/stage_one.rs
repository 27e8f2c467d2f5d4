//! # Stage-1 Ingress
//!
//! Handles avatar-service callbacks. A success event checkpoints the avatar
//! asset URL first, then creates the caption project inside a bounded wait. Any
//! failure after the checkpoint moves the workflow to `failed` with the URL kept.

use super::context::{message_reply, Admission, OrchestratorContext, Settlement};
use super::title::caption_project_title;
use crate::constants::ServiceKind;
use crate::error::{OrchestratorError, Result};
use crate::logging::{log_webhook_operation, log_workflow_operation};
use crate::models::{AvatarEvent, AvatarOutcome, CachedResponse, IdempotencyKey, Workflow};
use crate::services::CaptionProjectRequest;
use crate::state_machine::{WorkflowEvent, WorkflowStatus};
use crate::store::not_found;
use chrono::Utc;
use serde_json::json;
use std::time::Instant;
use tracing::{info, warn};

const DEFAULT_FAILURE_REASON: &str = "Avatar video generation failed";
const MISSING_ASSET_REASON: &str = "avatar completed without asset url";

impl OrchestratorContext {
    /// Handle one verified avatar delivery for `tenant`
    pub async fn handle_avatar_event(
        &self,
        tenant: &str,
        event: AvatarEvent,
        request_hash: &str,
    ) -> Result<CachedResponse> {
        let started = Instant::now();
        self.tenant(tenant)?;

        let key = IdempotencyKey::new(ServiceKind::Avatar, event.video_id.clone(), tenant);
        if let Admission::Reply(response) = self.admit(&key, request_hash).await? {
            log_webhook_operation("avatar", tenant, Some(&event.video_id), "duplicate", None);
            return Ok(response);
        }

        let result = self.process_avatar_event(tenant, &event).await;
        let elapsed = Some(started.elapsed().as_millis() as u64);
        match result {
            Ok(settlement) => {
                log_webhook_operation("avatar", tenant, Some(&event.video_id), "handled", elapsed);
                Ok(self.settle(&key, settlement).await)
            }
            Err(e) => {
                log_webhook_operation("avatar", tenant, Some(&event.video_id), "error", elapsed);
                self.release(&key).await;
                Err(e)
            }
        }
    }

    async fn process_avatar_event(&self, tenant: &str, event: &AvatarEvent) -> Result<Settlement> {
        let workflow_id = event.callback_id.as_str();
        let workflow = self
            .stores
            .workflows
            .get(tenant, workflow_id)
            .await?
            .ok_or_else(|| not_found(tenant, workflow_id))?;

        if !workflow.status.accepts_avatar_events() {
            info!(
                tenant,
                workflow_id,
                status = %workflow.status,
                "Avatar event for workflow past the avatar stage ignored"
            );
            return Ok(Settlement::Release(message_reply(format!(
                "Workflow already in {} status - duplicate webhook ignored",
                workflow.status
            ))));
        }

        self.start_avatar_stage(&workflow, &event.video_id).await?;

        match (event.outcome, event.asset_url.as_deref()) {
            (AvatarOutcome::Failure, _) => {
                let reason = event.error.as_deref().unwrap_or(DEFAULT_FAILURE_REASON);
                self.fail_workflow(tenant, workflow_id, reason).await;
                Ok(Settlement::Complete(failure_recorded(workflow_id)))
            }
            (AvatarOutcome::Success, None) => {
                self.fail_workflow(tenant, workflow_id, MISSING_ASSET_REASON).await;
                Ok(Settlement::Complete(failure_recorded(workflow_id)))
            }
            (AvatarOutcome::Success, Some(asset_url)) => {
                self.checkpoint_and_trigger(tenant, workflow_id, asset_url).await
            }
        }
    }

    /// Advance `queued` to `avatar_processing` and re-point the avatar job id
    async fn start_avatar_stage(&self, workflow: &Workflow, video_id: &str) -> Result<()> {
        let differs = workflow
            .avatar_external_id
            .as_deref()
            .is_some_and(|current| current != video_id);
        if workflow.status == WorkflowStatus::AvatarProcessing && !differs {
            return Ok(());
        }
        if differs {
            warn!(
                tenant = %workflow.tenant,
                workflow_id = %workflow.id,
                previous = workflow.avatar_external_id.as_deref(),
                current = video_id,
                "Avatar job id replaced by a newer delivery"
            );
        }

        self.stores
            .workflows
            .transition(
                &workflow.tenant,
                &workflow.id,
                WorkflowEvent::AvatarStarted {
                    external_id: video_id.to_string(),
                },
                Utc::now(),
            )
            .await?
            .into_applied()?;
        Ok(())
    }

    async fn checkpoint_and_trigger(&self, tenant: &str, workflow_id: &str, asset_url: &str) -> Result<Settlement> {
        let workflow = self
            .stores
            .workflows
            .transition(
                tenant,
                workflow_id,
                WorkflowEvent::AvatarCompleted {
                    asset_url: asset_url.to_string(),
                },
                Utc::now(),
            )
            .await?
            .into_applied()?;
        log_workflow_operation("avatar_checkpoint", tenant, workflow_id, workflow.status.as_str(), Some(asset_url));

        let timeout = self.config.orchestration.stage_trigger_timeout();
        let trigger = tokio::time::timeout(timeout, self.trigger_caption_stage(&workflow, asset_url)).await;

        let error = match trigger {
            Ok(Ok(workflow)) => {
                log_workflow_operation(
                    "caption_submitted",
                    tenant,
                    workflow_id,
                    workflow.status.as_str(),
                    workflow.caption_external_id.as_deref(),
                );
                return Ok(Settlement::Complete(CachedResponse::ok(json!({
                    "success": true,
                    "workflow_id": workflow_id,
                }))));
            }
            Ok(Err(e)) => e,
            Err(_) => OrchestratorError::Timeout(format!(
                "caption stage trigger exceeded {}ms",
                timeout.as_millis()
            )),
        };

        self.fail_workflow(tenant, workflow_id, &error.to_string()).await;
        Err(error)
    }

    /// Create the caption project for the checkpointed avatar asset
    async fn trigger_caption_stage(&self, workflow: &Workflow, asset_url: &str) -> Result<Workflow> {
        let profile = self.tenant(&workflow.tenant)?;
        let raw_title = workflow
            .preferred_title()
            .map(str::to_string)
            .unwrap_or_else(|| profile.fallback_title(&workflow.id));

        let request = CaptionProjectRequest {
            title: caption_project_title(&raw_title),
            video_url: asset_url.to_string(),
            webhook_url: self.callback_url(ServiceKind::Caption, &workflow.tenant),
            language: "en".to_string(),
        };
        let project_id = self.services.caption.create_project(&request).await?;

        self.stores
            .workflows
            .transition(
                &workflow.tenant,
                &workflow.id,
                WorkflowEvent::CaptionSubmitted { project_id },
                Utc::now(),
            )
            .await?
            .into_applied()
    }
}

fn failure_recorded(workflow_id: &str) -> CachedResponse {
    CachedResponse::ok(json!({
        "success": true,
        "message": "Failure recorded",
        "workflow_id": workflow_id,
    }))
}
