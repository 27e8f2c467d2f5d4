//! # Idempotency Record
//!
//! Dedup entry keyed by `(service, external_id, tenant)`. A record is first
//! written as an in-flight claim and later completed with the response that was
//! returned to the webhook caller; redeliveries receive that response verbatim.
//!
//! An in-flight claim only holds a short lease. If the claiming process dies
//! before settling, the lease lapses and the next redelivery claims the key
//! again. Completion extends the record to the full retention TTL.

use crate::constants::ServiceKind;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub service: ServiceKind,
    pub external_id: String,
    pub tenant: String,
}

impl IdempotencyKey {
    pub fn new(
        service: ServiceKind,
        external_id: impl Into<String>,
        tenant: impl Into<String>,
    ) -> Self {
        Self {
            service,
            external_id: external_id.into(),
            tenant: tenant.into(),
        }
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.service, self.tenant, self.external_id)
    }
}

/// Response returned to the first delivery, replayed to every duplicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status_code: u16,
    pub body: Value,
}

impl CachedResponse {
    pub fn ok(body: Value) -> Self {
        Self {
            status_code: 200,
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: IdempotencyKey,
    /// Hex SHA-256 of the raw request body of the claiming delivery
    pub request_hash: String,
    /// `None` while the claiming delivery is still in flight
    pub response: Option<CachedResponse>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn in_flight(
        key: IdempotencyKey,
        request_hash: impl Into<String>,
        lease_seconds: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            request_hash: request_hash.into(),
            response: None,
            created_at: now,
            completed_at: None,
            expires_at: expiry_after(now, lease_seconds),
        }
    }

    /// Store `response` and keep the record for `ttl_seconds` from `now`
    pub fn complete(&mut self, response: CachedResponse, ttl_seconds: u64, now: DateTime<Utc>) {
        self.response = Some(response);
        self.completed_at = Some(now);
        self.expires_at = expiry_after(now, ttl_seconds);
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_completed(&self) -> bool {
        self.response.is_some()
    }
}

/// Result of an atomic claim attempt against the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// This delivery owns the key and may execute side effects
    Claimed,
    /// Another delivery holds the key and has not finished
    InFlight { request_hash: String },
    /// The key was already processed; replay this response
    Completed {
        response: CachedResponse,
        request_hash: String,
    },
}

/// `seconds` as a chrono duration, saturating instead of overflowing
pub fn clamped_seconds(seconds: u64) -> Duration {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// `now + seconds`, saturating at the latest representable instant
pub fn expiry_after(now: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    now.checked_add_signed(clamped_seconds(seconds))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Hex SHA-256 of a request body
pub fn hash_request(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display_includes_all_parts() {
        let key = IdempotencyKey::new(ServiceKind::Avatar, "v1", "ownerfi");
        assert_eq!(key.to_string(), "avatar:ownerfi:v1");
    }

    #[test]
    fn test_record_expiry() {
        let now = Utc::now();
        let record = IdempotencyRecord::in_flight(
            IdempotencyKey::new(ServiceKind::Caption, "p1", "carz"),
            "abc",
            60,
            now,
        );
        assert!(!record.is_completed());
        assert!(!record.is_expired(now + Duration::seconds(59)));
        assert!(record.is_expired(now + Duration::seconds(60)));
    }

    #[test]
    fn test_completion_extends_lease_to_ttl() {
        let now = Utc::now();
        let mut record = IdempotencyRecord::in_flight(
            IdempotencyKey::new(ServiceKind::Avatar, "v1", "ownerfi"),
            "abc",
            30,
            now,
        );
        assert!(record.is_expired(now + Duration::seconds(30)));

        record.complete(CachedResponse::ok(serde_json::json!({})), 3_600, now + Duration::seconds(5));
        assert!(record.is_completed());
        assert!(!record.is_expired(now + Duration::seconds(3_000)));
        assert!(record.is_expired(now + Duration::seconds(3_605)));
    }

    #[test]
    fn test_huge_ttl_saturates_instead_of_panicking() {
        let now = Utc::now();
        assert_eq!(clamped_seconds(u64::MAX), Duration::MAX);
        assert_eq!(clamped_seconds(i64::MAX as u64 / 10), Duration::MAX);
        assert_eq!(clamped_seconds(90), Duration::seconds(90));
        assert_eq!(expiry_after(now, u64::MAX), DateTime::<Utc>::MAX_UTC);

        let record = IdempotencyRecord::in_flight(
            IdempotencyKey::new(ServiceKind::Caption, "p1", "carz"),
            "abc",
            u64::MAX,
            now,
        );
        assert!(!record.is_expired(now + Duration::days(365 * 100)));
    }

    #[test]
    fn test_hash_request_is_stable_hex() {
        let a = hash_request(br#"{"video_id":"v1"}"#);
        let b = hash_request(br#"{"video_id":"v1"}"#);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_request(br#"{"video_id":"v2"}"#));
    }
}
