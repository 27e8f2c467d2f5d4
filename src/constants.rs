//! # System Constants
//!
//! Service identifiers, header names, and the default operational bounds of the
//! video-production orchestrator. Configuration overrides most of the durations;
//! the values here are the compiled-in defaults.

use serde::{Deserialize, Serialize};
use std::fmt;

/// External collaborator that delivered (or is called for) a given event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Avatar video synthesis (Stage-1 webhook)
    Avatar,
    /// Caption / B-roll enhancement (Stage-2 webhook)
    Caption,
    /// Multi-platform scheduling (outbound only)
    Scheduling,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Avatar => "avatar",
            ServiceKind::Caption => "caption",
            ServiceKind::Scheduling => "scheduling",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avatar" => Ok(Self::Avatar),
            "caption" => Ok(Self::Caption),
            "scheduling" => Ok(Self::Scheduling),
            _ => Err(format!("Invalid service kind: {s}")),
        }
    }
}

/// Default timing bounds
pub mod timeouts {
    /// Upper bound on the synchronous Stage-2 trigger raced inside the Stage-1 webhook
    pub const STAGE_TRIGGER_TIMEOUT_MS: u64 = 25_000;
    /// Upper bound on a single failure-alert delivery
    pub const NOTIFIER_TIMEOUT_MS: u64 = 5_000;
    /// Upper bound on a fresh-URL probe against the caption service
    pub const ASSET_PROBE_TIMEOUT_MS: u64 = 10_000;
    /// Default outbound HTTP request timeout
    pub const HTTP_REQUEST_TIMEOUT_MS: u64 = 30_000;
    /// Inbound request timeout applied by the router
    pub const WEBHOOK_REQUEST_TIMEOUT_MS: u64 = 60_000;
    /// How long shutdown waits for detached post-processing tasks
    pub const SHUTDOWN_GRACE_MS: u64 = 30_000;
}

/// Retry and dedup windows
pub mod windows {
    /// Completed idempotency records are honoured for this long
    pub const IDEMPOTENCY_TTL_SECONDS: u64 = 24 * 60 * 60;
    /// An unsettled claim blocks redeliveries for at most this long
    pub const CLAIM_LEASE_SECONDS: u64 = 3 * 60;
    /// Workflows idle this long in `video_processing`/`posting` are resumed
    pub const STALL_THRESHOLD_SECONDS: u64 = 10 * 60;
    /// How often the stalled-workflow sweep runs
    pub const STALL_SWEEP_INTERVAL_SECONDS: u64 = 5 * 60;
    /// A second export trigger inside this window is treated as a duplicate
    pub const EXPORT_RETRY_WINDOW_SECONDS: u64 = 5 * 60;
    /// Attempts made against the caption export endpoint before giving up
    pub const EXPORT_MAX_ATTEMPTS: u32 = 3;
    /// Base delay for exponential export backoff (2s, 4s, ...)
    pub const EXPORT_BACKOFF_BASE_MS: u64 = 2_000;
    /// Minimum lead time when computing same-day posting slots
    pub const SCHEDULE_LEAD_MINUTES: i64 = 15;
}

/// Inbound header names
pub mod headers {
    /// Signature header names accepted for any service, checked in order
    pub const SIGNATURE_HEADERS: &[&str] = &[
        "x-webhook-signature",
        "x-avatar-signature",
        "x-caption-signature",
        "x-signature",
    ];
}

/// Caption project title limit imposed by the enhancement service
pub const CAPTION_TITLE_MAX_CHARS: usize = 50;

/// Maximum inbound webhook body accepted by the router
pub const MAX_WEBHOOK_BODY_BYTES: usize = 2 * 1024 * 1024;
