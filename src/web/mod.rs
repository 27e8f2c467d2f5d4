//! # Webhook Ingress
//!
//! axum router for the brand-scoped webhook endpoints
//! (`/webhooks/{service}/{tenant}`) and the liveness probe.

pub mod errors;
pub mod handlers;
pub mod signature;
pub mod state;

pub use errors::ApiError;
pub use state::AppState;

use crate::constants::MAX_WEBHOOK_BODY_BYTES;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

/// Build the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let common_middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_millis(
            state.config().server.request_timeout_ms,
        )))
        .layer(cors);

    let app = Router::new()
        .merge(health_routes())
        .merge(webhook_routes())
        .layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY_BYTES))
        .layer(common_middleware)
        .with_state(state);

    info!("Webhook router created");
    app
}

fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::basic_health))
}

fn webhook_routes() -> Router<AppState> {
    use handlers::webhooks;

    Router::new()
        .route(
            "/webhooks/avatar/:tenant",
            post(webhooks::avatar_webhook).options(webhooks::webhook_preflight),
        )
        .route(
            "/webhooks/caption/:tenant",
            post(webhooks::caption_webhook).options(webhooks::webhook_preflight),
        )
}
