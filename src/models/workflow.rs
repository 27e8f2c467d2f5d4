//! # Workflow Model
//!
//! Persisted record of one content item moving through the avatar, caption and
//! posting stages.
//!
//! ## Overview
//!
//! A `Workflow` is created by an external trigger and mutated only by the
//! ingress handlers and the post-processor. Every lookup and mutation is scoped
//! by `(tenant, id)`; the bare `id` is also the callback token that the avatar
//! service echoes back.
//!
//! ## Checkpoints
//!
//! `avatar_asset_url`, `caption_asset_url` and `final_asset_url` are recovery
//! anchors. Once written they are never cleared, including on failure, so
//! operator tooling can resume a `failed` workflow from the last artifact.
//!
//! ## Database Schema
//!
//! Maps to `reelflow_workflows`, keyed by `(tenant, workflow_id)`, with the
//! full record stored as JSONB and the lookup columns (`status`,
//! `caption_external_id`) denormalized for indexing.

use crate::state_machine::WorkflowStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One applied event in the workflow's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: WorkflowStatus,
    pub to: WorkflowStatus,
    pub event: String,
    pub at: DateTime<Utc>,
}

/// A single video-production job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub tenant: String,
    pub status: WorkflowStatus,

    // Correlation ids for the in-flight external job at each stage
    pub avatar_external_id: Option<String>,
    pub caption_external_id: Option<String>,

    // Checkpoints
    pub avatar_asset_url: Option<String>,
    pub caption_asset_url: Option<String>,
    pub final_asset_url: Option<String>,

    pub error: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub post_ids: Vec<String>,
    pub platforms_used: Option<u32>,
    pub scheduled_for: Option<DateTime<Utc>>,

    /// Posting title; falls back to `source_title` then the tenant default
    pub title: Option<String>,
    /// Title of the source content item (article, listing, episode)
    pub source_title: Option<String>,
    /// Posting caption; falls back to the tenant default
    pub caption: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub avatar_started_at: Option<DateTime<Utc>>,
    pub avatar_completed_at: Option<DateTime<Utc>>,
    pub caption_submitted_at: Option<DateTime<Utc>>,
    /// Export marker; guards the Phase A export trigger
    pub export_requested_at: Option<DateTime<Utc>>,
    pub caption_completed_at: Option<DateTime<Utc>>,
    pub posting_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub history: Vec<StageTransition>,
}

impl Workflow {
    /// New `queued` workflow with an empty checkpoint set
    pub fn new(tenant: impl Into<String>, id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            tenant: tenant.into(),
            status: WorkflowStatus::Queued,
            avatar_external_id: None,
            caption_external_id: None,
            avatar_asset_url: None,
            caption_asset_url: None,
            final_asset_url: None,
            error: None,
            failed_at: None,
            post_ids: Vec::new(),
            platforms_used: None,
            scheduled_for: None,
            title: None,
            source_title: None,
            caption: None,
            created_at: now,
            updated_at: now,
            avatar_started_at: None,
            avatar_completed_at: None,
            caption_submitted_at: None,
            export_requested_at: None,
            caption_completed_at: None,
            posting_at: None,
            completed_at: None,
            history: Vec::new(),
        }
    }

    /// Created by a trigger that already submitted the avatar job
    pub fn avatar_processing(
        tenant: impl Into<String>,
        id: impl Into<String>,
        avatar_external_id: impl Into<String>,
    ) -> Self {
        let mut workflow = Self::new(tenant, id);
        workflow.status = WorkflowStatus::AvatarProcessing;
        workflow.avatar_external_id = Some(avatar_external_id.into());
        workflow.avatar_started_at = Some(workflow.created_at);
        workflow
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_source_title(mut self, source_title: impl Into<String>) -> Self {
        self.source_title = Some(source_title.into());
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// First non-empty of `title` and `source_title`
    pub fn preferred_title(&self) -> Option<&str> {
        [self.title.as_deref(), self.source_title.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|t| !t.is_empty())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Storage object path for the durable copy of the final asset
    pub fn storage_path(&self) -> String {
        format!("{}/caption-videos/{}.mp4", self.tenant, self.id)
    }

    /// Idempotency key sent with the scheduling request
    pub fn scheduling_key(&self) -> String {
        format!("{}:{}", self.tenant, self.id)
    }
}
