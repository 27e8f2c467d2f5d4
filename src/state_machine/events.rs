use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events that drive workflow state transitions
///
/// Each event is produced by exactly one external webhook delivery or one
/// internal completion signal, except [`WorkflowEvent::ExportPending`], which
/// only operator tooling emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// Avatar job accepted; also re-points the avatar correlation id while in the avatar stage
    AvatarStarted { external_id: String },
    /// Avatar asset is available; checkpoints its URL
    AvatarCompleted { asset_url: String },
    /// Caption project created for the avatar asset
    CaptionSubmitted { project_id: String },
    /// Export requested; refused if a previous request is younger than the window
    ExportRequested { retry_window_secs: u64 },
    /// Operator tooling parked the workflow waiting for an export callback.
    /// Never emitted by the ingress handlers; a phase-A export request keeps
    /// `caption_processing` and records the export marker instead.
    ExportPending,
    /// Exported caption asset is available; checkpoints its URL
    CaptionExported { asset_url: String },
    /// Durable copy uploaded
    Uploaded { final_asset_url: String },
    /// Scheduling service accepted the posts
    Posted {
        post_ids: Vec<String>,
        platforms_used: u32,
        scheduled_for: Option<DateTime<Utc>>,
    },
    /// Stop the workflow with a recorded cause
    Fail { error: String },
}

impl WorkflowEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AvatarStarted { .. } => "avatar_started",
            Self::AvatarCompleted { .. } => "avatar_completed",
            Self::CaptionSubmitted { .. } => "caption_submitted",
            Self::ExportRequested { .. } => "export_requested",
            Self::ExportPending => "export_pending",
            Self::CaptionExported { .. } => "caption_exported",
            Self::Uploaded { .. } => "uploaded",
            Self::Posted { .. } => "posted",
            Self::Fail { .. } => "fail",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail { error } => Some(error),
            _ => None,
        }
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail {
            error: error.into(),
        }
    }
}
