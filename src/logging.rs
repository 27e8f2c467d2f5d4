//! # Structured Logging Module
//!
//! Environment-aware structured logging. Production emits JSON lines for log
//! shipping; every other environment gets human-readable console output.
//! `RUST_LOG` overrides the per-environment default level.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process; later calls are no-ops
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let layer = if environment == "production" {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(filter)
                .boxed()
        };

        // A subscriber may already be installed (test harness, embedding host)
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
pub fn get_environment() -> String {
    std::env::var("REELFLOW_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for workflow state changes
pub fn log_workflow_operation(
    operation: &str,
    tenant: &str,
    workflow_id: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        tenant = %tenant,
        workflow_id = %workflow_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "WORKFLOW_OPERATION"
    );
}

/// Log structured data for an inbound webhook delivery
pub fn log_webhook_operation(
    service: &str,
    tenant: &str,
    external_id: Option<&str>,
    outcome: &str,
    duration_ms: Option<u64>,
) {
    tracing::info!(
        service = %service,
        tenant = %tenant,
        external_id = external_id,
        outcome = %outcome,
        duration_ms = duration_ms,
        timestamp = %Utc::now().to_rfc3339(),
        "WEBHOOK_OPERATION"
    );
}

/// Log structured errors with context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
