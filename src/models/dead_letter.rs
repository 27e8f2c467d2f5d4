//! Append-only record of a webhook delivery that ended in an internal error.

use crate::constants::{headers::SIGNATURE_HEADERS, ServiceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

const REDACTED: &str = "[redacted]";

/// What the caller sent, kept for manual replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub method: String,
    pub uri: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl RequestSnapshot {
    /// Header names are lowercased; signature and authorization values are redacted
    pub fn new<I, K, V>(method: impl Into<String>, uri: impl Into<String>, headers: I, body: &[u8]) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(name, value)| {
                let name = name.as_ref().to_ascii_lowercase();
                let value = if is_sensitive_header(&name) {
                    REDACTED.to_string()
                } else {
                    value.into()
                };
                (name, value)
            })
            .collect();

        Self {
            method: method.into(),
            uri: uri.into(),
            headers,
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }
}

fn is_sensitive_header(name: &str) -> bool {
    SIGNATURE_HEADERS.contains(&name) || name == "authorization" || name == "cookie"
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub service: ServiceKind,
    pub tenant: String,
    pub request: RequestSnapshot,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl DeadLetterEntry {
    pub fn new(
        service: ServiceKind,
        tenant: impl Into<String>,
        request: RequestSnapshot,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            service,
            tenant: tenant.into(),
            request,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}
