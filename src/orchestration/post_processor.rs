//! # Async Post-Processor
//!
//! Runs detached from the webhook that accepted the exported caption asset.
//! Nobody awaits it, so every failure is written back to the workflow as
//! `failed`. Each step persists its result before the next begins, so a
//! restarted process can resume from the last checkpoint alone: the stalled
//! sweep rebuilds the job from the stored record and re-runs it.

use super::context::OrchestratorContext;
use super::title::decode_entities;
use crate::error::{OrchestratorError, Result};
use crate::logging::{log_error, log_workflow_operation};
use crate::models::{clamped_seconds, Workflow};
use crate::resilience::CircuitBreakerError;
use crate::scheduling::same_day_slots;
use crate::services::ScheduleRequest;
use crate::state_machine::{WorkflowEvent, WorkflowStatus};
use crate::store::not_found;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Statuses owned by the post-processor
const RESUMABLE: [WorkflowStatus; 2] = [WorkflowStatus::VideoProcessing, WorkflowStatus::Posting];

/// Inputs of one post-processing run
#[derive(Debug, Clone, PartialEq)]
pub struct PostProcessJob {
    pub tenant: String,
    pub workflow_id: String,
    /// Download URL delivered with the caption export callback
    pub caption_asset_url: String,
    /// Caption project id, used to fetch a fresh URL if the delivered one expired
    pub project_id: Option<String>,
}

impl PostProcessJob {
    /// Rebuild the job for a stored workflow from its caption checkpoints
    pub fn from_checkpoints(workflow: &Workflow) -> Option<Self> {
        Some(Self {
            tenant: workflow.tenant.clone(),
            workflow_id: workflow.id.clone(),
            caption_asset_url: workflow.caption_asset_url.clone()?,
            project_id: workflow.caption_external_id.clone(),
        })
    }
}

impl OrchestratorContext {
    /// Detach post-processing for `job` on the context's task tracker
    pub fn spawn_post_processing(self: &Arc<Self>, job: PostProcessJob) {
        let context = Arc::clone(self);
        let span = tracing::info_span!(
            "post_process",
            tenant = %job.tenant,
            workflow_id = %job.workflow_id
        );
        self.tasks.spawn(
            async move {
                context.run_post_processing(job).await;
            }
            .instrument(span),
        );
    }

    /// Run `job` to completion, recording any failure on the workflow.
    ///
    /// A job whose workflow is already being post-processed in this process
    /// returns immediately.
    pub async fn run_post_processing(&self, job: PostProcessJob) {
        let slot = (job.tenant.clone(), job.workflow_id.clone());
        if !self.active_jobs.insert(slot.clone()) {
            debug!(tenant = %job.tenant, workflow_id = %job.workflow_id, "Post-processing already running");
            return;
        }
        let outcome = AssertUnwindSafe(self.post_process(&job)).catch_unwind().await;
        self.active_jobs.remove(&slot);

        let reason = match outcome {
            Ok(Ok(workflow)) => {
                info!(
                    platforms_used = workflow.platforms_used,
                    post_ids = ?workflow.post_ids,
                    "Post-processing completed"
                );
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "post-processing task panicked".to_string(),
        };

        log_error(
            "post_processor",
            "run",
            &reason,
            Some(&format!("{}:{}", job.tenant, job.workflow_id)),
        );
        self.fail_workflow(&job.tenant, &job.workflow_id, &reason).await;
    }

    async fn post_process(&self, job: &PostProcessJob) -> Result<Workflow> {
        let workflow = self
            .stores
            .workflows
            .get(&job.tenant, &job.workflow_id)
            .await?
            .ok_or_else(|| not_found(&job.tenant, &job.workflow_id))?;

        if workflow.is_terminal() {
            debug!(status = %workflow.status, "Workflow already terminal; nothing to post-process");
            return Ok(workflow);
        }

        // Interrupted after the upload checkpoint: only scheduling is left
        if let (WorkflowStatus::Posting, Some(final_asset_url)) =
            (workflow.status, workflow.final_asset_url.clone())
        {
            info!(final_asset_url = %final_asset_url, "Resuming at scheduling");
            return self.schedule_posts(&workflow, &final_asset_url).await;
        }

        let final_asset_url = match workflow.final_asset_url.clone() {
            Some(url) => url,
            None => self.upload_final_asset(&workflow, job).await?,
        };

        let workflow = self
            .stores
            .workflows
            .transition(
                &job.tenant,
                &job.workflow_id,
                WorkflowEvent::Uploaded {
                    final_asset_url: final_asset_url.clone(),
                },
                Utc::now(),
            )
            .await?
            .into_applied()?;
        log_workflow_operation("uploaded", &job.tenant, &job.workflow_id, workflow.status.as_str(), Some(&final_asset_url));

        self.schedule_posts(&workflow, &final_asset_url).await
    }

    /// Re-drive `tenant`'s workflows idle in `video_processing`/`posting` for
    /// longer than the stall threshold, returning how many were resumed.
    ///
    /// A stalled workflow without a caption asset checkpoint cannot be resumed
    /// and is failed instead.
    pub async fn resume_stalled(self: &Arc<Self>, tenant: &str, now: DateTime<Utc>) -> Result<usize> {
        let threshold = clamped_seconds(self.config.orchestration.stall_threshold_seconds);
        let cutoff = now.checked_sub_signed(threshold).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let stalled = self
            .stores
            .workflows
            .list_stalled(tenant, &RESUMABLE, cutoff)
            .await?;

        let mut resumed = 0;
        for workflow in stalled {
            match PostProcessJob::from_checkpoints(&workflow) {
                Some(job) => {
                    log_workflow_operation(
                        "resume_stalled",
                        tenant,
                        &workflow.id,
                        workflow.status.as_str(),
                        Some(&format!("idle since {}", workflow.updated_at)),
                    );
                    self.spawn_post_processing(job);
                    resumed += 1;
                }
                None => {
                    self.fail_workflow(tenant, &workflow.id, "stalled without a caption asset checkpoint")
                        .await;
                }
            }
        }
        Ok(resumed)
    }

    /// Copy the caption asset to durable storage, re-fetching its URL once on failure
    async fn upload_final_asset(&self, workflow: &Workflow, job: &PostProcessJob) -> Result<String> {
        let path = workflow.storage_path();
        let first_error = match self
            .services
            .storage
            .upload_from_url(&job.caption_asset_url, &path)
            .await
        {
            Ok(url) => return Ok(url),
            Err(e) => e,
        };

        let Some(project_id) = job.project_id.as_deref() else {
            return Err(first_error);
        };
        warn!(error = %first_error, project_id, "Upload from callback URL failed; fetching a fresh media URL");

        let fresh = self
            .asset_probe
            .call(|| self.services.caption.fetch_media_url(project_id))
            .await
            .map_err(|e| match e {
                CircuitBreakerError::OperationFailed(inner) => inner,
                CircuitBreakerError::Timeout { timeout, .. } => OrchestratorError::Timeout(format!(
                    "media URL probe exceeded {}ms",
                    timeout.as_millis()
                )),
                other => OrchestratorError::upstream("caption", other.to_string()),
            })?;

        match fresh {
            Some(url) if url != job.caption_asset_url => {
                self.services.storage.upload_from_url(&url, &path).await
            }
            _ => Err(first_error),
        }
    }

    async fn schedule_posts(&self, workflow: &Workflow, asset_url: &str) -> Result<Workflow> {
        let profile = self.tenant(&workflow.tenant)?;
        let caption = workflow
            .caption
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| profile.caption_with_hashtags(&profile.default_caption));
        let title = workflow
            .preferred_title()
            .map(decode_entities)
            .unwrap_or_else(|| profile.fallback_title(&workflow.id));

        let slots = same_day_slots(
            &profile.platforms,
            profile.tz()?,
            Utc::now(),
            self.config.orchestration.schedule_lead_minutes,
        );
        let scheduled_for = slots.iter().map(|slot| slot.scheduled_for).min();

        let request = ScheduleRequest {
            tenant: workflow.tenant.clone(),
            asset_url: asset_url.to_string(),
            caption,
            title,
            timezone: profile.timezone.clone(),
            slots,
            idempotency_key: workflow.scheduling_key(),
        };
        let response = self.services.scheduling.schedule(&request).await?;

        if response.succeeded() == 0 {
            let errors = response.errors();
            let detail = if errors.is_empty() {
                "no post ids returned".to_string()
            } else {
                errors.join("; ")
            };
            return Err(OrchestratorError::upstream(
                "scheduling",
                format!("no platform accepted the post: {detail}"),
            ));
        }

        let workflow = self
            .stores
            .workflows
            .transition(
                &workflow.tenant,
                &workflow.id,
                WorkflowEvent::Posted {
                    post_ids: response.post_ids(),
                    platforms_used: u32::try_from(response.succeeded()).unwrap_or(u32::MAX),
                    scheduled_for,
                },
                Utc::now(),
            )
            .await?
            .into_applied()?;
        log_workflow_operation("completed", &workflow.tenant, &workflow.id, workflow.status.as_str(), None);
        Ok(workflow)
    }
}
