//! Webhook signature verification.
//!
//! A signature is accepted when it is the hex HMAC-SHA256 of the raw body under
//! the service's secret (optionally prefixed `sha256=`), or when it equals the
//! shared secret itself, which is how the caption service authenticates.

use crate::constants::headers::SIGNATURE_HEADERS;
use crate::error::{OrchestratorError, Result};
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify `body` against the first signature header present.
///
/// With no secret configured verification is disabled and every request passes.
pub fn verify_request(secret: Option<&str>, headers: &HeaderMap, body: &[u8]) -> Result<()> {
    let Some(secret) = secret else {
        return Ok(());
    };

    let provided = SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| OrchestratorError::VerificationError("missing signature header".to_string()))?;

    if signature_matches(secret, body, provided) {
        Ok(())
    } else {
        Err(OrchestratorError::VerificationError(
            "signature does not match payload".to_string(),
        ))
    }
}

fn signature_matches(secret: &str, body: &[u8], provided: &str) -> bool {
    let candidate = provided.strip_prefix("sha256=").unwrap_or(provided);
    if let Ok(expected) = hex::decode(candidate) {
        if let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) {
            mac.update(body);
            if mac.verify_slice(&expected).is_ok() {
                return true;
            }
        }
    }
    constant_time_eq(provided.as_bytes(), secret.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Hex HMAC-SHA256 of `body` under `secret`, as senders compute it
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
