//! Inbound webhook payload normalization.
//!
//! The external services are loose about field names; everything past this
//! module sees one canonical shape per service.

use crate::error::{OrchestratorError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

const PROJECT_ID_ALIASES: &[&str] = &["projectId", "project_id", "id"];
const DOWNLOAD_URL_ALIASES: &[&str] = &[
    "downloadUrl",
    "directUrl",
    "media_url",
    "mediaUrl",
    "video_url",
    "videoUrl",
    "download_url",
];
const ERROR_ALIASES: &[&str] = &["error", "message", "msg", "failureReason"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarOutcome {
    Success,
    Failure,
}

impl AvatarOutcome {
    /// Accepts the bare and the dotted (`avatar_video.success`) forms
    pub fn parse(event_type: &str) -> Option<Self> {
        let normalized = event_type
            .trim()
            .strip_prefix("avatar_video.")
            .unwrap_or(event_type.trim());
        match normalized {
            "success" => Some(Self::Success),
            "fail" | "failed" => Some(Self::Failure),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawAvatarPayload {
    event_type: Option<String>,
    event_data: Option<RawAvatarEventData>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAvatarEventData {
    video_id: Option<Value>,
    callback_id: Option<Value>,
    url: Option<String>,
    msg: Option<String>,
    error: Option<String>,
}

/// Canonical Stage-1 event
#[derive(Debug, Clone, PartialEq)]
pub struct AvatarEvent {
    pub outcome: AvatarOutcome,
    pub video_id: String,
    pub callback_id: String,
    pub asset_url: Option<String>,
    pub error: Option<String>,
}

impl AvatarEvent {
    /// Parse a raw body.
    ///
    /// `video_id` is checked first: it is the idempotency key, and nothing else
    /// about the payload matters without it.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let raw: RawAvatarPayload = serde_json::from_slice(body)
            .map_err(|e| OrchestratorError::validation(format!("malformed avatar payload: {e}")))?;
        let data = raw.event_data.unwrap_or_default();

        let video_id = identifier(data.video_id.as_ref())
            .ok_or_else(|| OrchestratorError::validation("Missing video_id in event_data"))?;
        let callback_id = identifier(data.callback_id.as_ref())
            .ok_or_else(|| OrchestratorError::validation("Missing callback_id in event_data"))?;

        let event_type = raw.event_type.unwrap_or_default();
        let outcome = AvatarOutcome::parse(&event_type).ok_or_else(|| {
            OrchestratorError::validation(format!("Unsupported avatar event type: {event_type:?}"))
        })?;

        Ok(Self {
            outcome,
            video_id,
            callback_id,
            asset_url: non_empty(data.url),
            error: non_empty(data.msg).or_else(|| non_empty(data.error)),
        })
    }
}

/// Caption project status, folded from the service's vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionStatus {
    Completed,
    Failed,
    Intermediate(String),
}

impl CaptionStatus {
    pub fn parse(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "completed" | "done" | "ready" => Self::Completed,
            "failed" | "error" => Self::Failed,
            _ => Self::Intermediate(status.to_string()),
        }
    }
}

/// Canonical Stage-2 event
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionEvent {
    pub project_id: String,
    pub status: CaptionStatus,
    pub raw_status: String,
    pub download_url: Option<String>,
    pub error: Option<String>,
}

impl CaptionEvent {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let object: Map<String, Value> = serde_json::from_slice(body)
            .map_err(|e| OrchestratorError::validation(format!("malformed caption payload: {e}")))?;

        let project_id = PROJECT_ID_ALIASES
            .iter()
            .find_map(|key| identifier(object.get(*key)))
            .ok_or_else(|| OrchestratorError::validation("Missing projectId in webhook payload"))?;

        let raw_status = object
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            project_id,
            status: CaptionStatus::parse(&raw_status),
            raw_status,
            download_url: first_string(&object, DOWNLOAD_URL_ALIASES),
            error: first_string(&object, ERROR_ALIASES),
        })
    }
}

/// Identifiers may arrive as strings or numbers
fn identifier(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => non_empty(Some(s.clone())),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_string(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| non_empty(object.get(*key).and_then(Value::as_str).map(str::to_string)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
