//! # Outbound Collaborators
//!
//! Traits for the services the orchestrator calls, with `reqwest` clients for
//! production. The orchestration layer only sees the traits, so tests swap in
//! call-counting doubles.

pub mod caption;
pub mod notifier;
pub mod scheduling;
pub mod storage;

pub use caption::HttpCaptionService;
pub use notifier::{notify_best_effort, FailureAlert, TracingNotifier, WebhookNotifier};
pub use scheduling::HttpSchedulingService;
pub use storage::HttpAssetStorage;

use crate::error::Result;
use crate::scheduling::{Platform, PlatformSlot};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Caption project creation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionProjectRequest {
    pub title: String,
    pub video_url: String,
    /// Callback URL the caption service notifies on completion
    pub webhook_url: String,
    pub language: String,
}

#[async_trait]
pub trait CaptionService: Send + Sync {
    /// Create a caption project; returns the project id
    async fn create_project(&self, request: &CaptionProjectRequest) -> Result<String>;

    /// Ask the service to render the final asset; it calls `webhook_url` when done
    async fn request_export(&self, project_id: &str, webhook_url: &str) -> Result<()>;

    /// Current download URL of an exported project, if any
    async fn fetch_media_url(&self, project_id: &str) -> Result<Option<String>>;
}

/// A single scheduling call covering every platform of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub tenant: String,
    pub asset_url: String,
    pub caption: String,
    pub title: String,
    pub timezone: String,
    pub slots: Vec<PlatformSlot>,
    /// Repeated requests with the same key must not create duplicate posts
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformOutcome {
    pub platform: Platform,
    pub post_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub outcomes: Vec<PlatformOutcome>,
}

impl ScheduleResponse {
    pub fn post_ids(&self) -> Vec<String> {
        self.outcomes.iter().filter_map(|o| o.post_id.clone()).collect()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.post_id.is_some()).count()
    }

    pub fn errors(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| format!("{}: {}", o.platform, e)))
            .collect()
    }
}

#[async_trait]
pub trait SchedulingService: Send + Sync {
    async fn schedule(&self, request: &ScheduleRequest) -> Result<ScheduleResponse>;
}

#[async_trait]
pub trait AssetStorage: Send + Sync {
    /// Copy the object at `source_url` to `path`; returns its public URL
    async fn upload_from_url(&self, source_url: &str, path: &str) -> Result<String>;
}

#[async_trait]
pub trait FailureNotifier: Send + Sync {
    async fn notify(&self, alert: &FailureAlert) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_response_summaries() {
        let response = ScheduleResponse {
            outcomes: vec![
                PlatformOutcome { platform: Platform::Tiktok, post_id: Some("p1".into()), error: None },
                PlatformOutcome { platform: Platform::Twitter, post_id: None, error: Some("no account".into()) },
            ],
        };
        assert_eq!(response.post_ids(), vec!["p1".to_string()]);
        assert_eq!(response.succeeded(), 1);
        assert_eq!(response.errors(), vec!["twitter: no account".to_string()]);
    }
}
