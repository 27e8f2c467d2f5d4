//! # Webhook Handlers
//!
//! `POST /webhooks/{service}/{tenant}` for the avatar and caption services.
//!
//! Each handler body runs inside [`guarded`]: an error or a panic anywhere in it
//! becomes a well-formed error response, and every 500 is paired with a
//! dead-letter entry carrying a snapshot of the request.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};

use crate::constants::ServiceKind;
use crate::error::{OrchestratorError, Result};
use crate::logging::log_error;
use crate::models::{hash_request, AvatarEvent, CachedResponse, CaptionEvent, DeadLetterEntry, RequestSnapshot};
use crate::web::errors::ApiError;
use crate::web::signature::verify_request;
use crate::web::state::AppState;

/// Inbound request parts kept for the dead-letter snapshot
struct Delivery {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

/// Avatar-service callback: POST /webhooks/avatar/{tenant}
pub async fn avatar_webhook(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery = Delivery { method, uri, headers, body };
    let context = &state.context;

    let outcome = guarded(async {
        context.tenant(&tenant)?;
        let event = AvatarEvent::from_slice(&delivery.body)?;
        verify_request(
            context.config.signatures.secret_for(ServiceKind::Avatar),
            &delivery.headers,
            &delivery.body,
        )?;
        context
            .handle_avatar_event(&tenant, event, &hash_request(&delivery.body))
            .await
    })
    .await;

    respond(&state, ServiceKind::Avatar, &tenant, &delivery, outcome).await
}

/// Caption-service callback: POST /webhooks/caption/{tenant}
pub async fn caption_webhook(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery = Delivery { method, uri, headers, body };
    let context = &state.context;

    let outcome = guarded(async {
        context.tenant(&tenant)?;
        let event = CaptionEvent::from_slice(&delivery.body)?;
        verify_request(
            context.config.signatures.secret_for(ServiceKind::Caption),
            &delivery.headers,
            &delivery.body,
        )?;
        context
            .handle_caption_event(&tenant, event, &hash_request(&delivery.body))
            .await
    })
    .await;

    respond(&state, ServiceKind::Caption, &tenant, &delivery, outcome).await
}

/// Webhook validation preflight: OPTIONS /webhooks/{service}/{tenant}
pub async fn webhook_preflight() -> Response {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
            (header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("POST, OPTIONS")),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type")),
        ],
    )
        .into_response()
}

/// Run a handler body, converting a panic into an internal error
async fn guarded<F>(body: F) -> Result<CachedResponse>
where
    F: Future<Output = Result<CachedResponse>>,
{
    match AssertUnwindSafe(body).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            Err(OrchestratorError::Internal(format!("handler panicked: {detail}")))
        }
    }
}

async fn respond(
    state: &AppState,
    service: ServiceKind,
    tenant: &str,
    delivery: &Delivery,
    outcome: Result<CachedResponse>,
) -> Response {
    let error = match outcome {
        Ok(response) => return reply(response),
        Err(error) => error,
    };

    let api_error = ApiError::from(&error);
    match &api_error {
        ApiError::BadRequest { .. } | ApiError::Unauthorized { .. } => {
            debug!(%service, tenant, error = %error, "Webhook rejected");
        }
        ApiError::NotFound { .. } => {
            warn!(%service, tenant, error = %error, "Webhook for unknown workflow or tenant");
        }
        ApiError::Internal => {
            log_error("webhook", service.as_str(), &error.to_string(), Some(tenant));
            dead_letter(state, service, tenant, delivery, &error).await;
        }
    }
    api_error.into_response()
}

/// Append to the dead-letter log; a failing log is reported and swallowed
async fn dead_letter(state: &AppState, service: ServiceKind, tenant: &str, delivery: &Delivery, error: &OrchestratorError) {
    let snapshot = RequestSnapshot::new(
        delivery.method.as_str(),
        delivery.uri.to_string(),
        delivery
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned())),
        &delivery.body,
    );
    let entry = DeadLetterEntry::new(service, tenant, snapshot, error.to_string());
    let entry_id = entry.id;

    match state.context.stores.dead_letters.append(entry).await {
        Ok(()) => debug!(%service, tenant, dead_letter_id = %entry_id, "Dead-letter entry written"),
        Err(e) => log_error("dead_letter", "append", &e.to_string(), Some(&error.to_string())),
    }
}

fn reply(response: CachedResponse) -> Response {
    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::OK);
    (status, Json(response.body)).into_response()
}
