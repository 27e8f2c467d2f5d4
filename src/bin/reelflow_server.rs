//! # Reelflow Server
//!
//! Runs the webhook ingress and the detached post-processing tasks.
//!
//! ## Usage
//!
//! ```bash
//! REELFLOW_ENV=production REELFLOW__DATABASE__URL=postgres://... reelflow-server
//! ```

use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use reelflow_core::config::ReelflowConfig;
use reelflow_core::logging;
use reelflow_core::orchestration::{OrchestratorContext, Services, Stores};
use reelflow_core::store::postgres;
use reelflow_core::web::{create_app, AppState};

const LEDGER_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_structured_logging();

    info!("Starting Reelflow server");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(ReelflowConfig::load().context("failed to load configuration")?);
    info!(
        environment = %config.environment,
        tenants = config.tenants.len(),
        bind_address = %config.server.bind_address,
        "Configuration loaded"
    );

    let stores = match config.database.url.as_deref() {
        Some(url) => {
            let pool = postgres::connect(url, config.database.max_connections)
                .await
                .context("failed to connect to PostgreSQL")?;
            Stores::postgres(pool)
        }
        None => {
            warn!("No database URL configured; using in-memory stores (state is lost on restart)");
            Stores::in_memory()
        }
    };
    let services = Services::from_config(&config).context("failed to build service clients")?;
    let context = Arc::new(OrchestratorContext::new(Arc::clone(&config), stores, services));

    let shutdown = CancellationToken::new();
    let purge_task = tokio::spawn(purge_ledger(Arc::clone(&context), shutdown.clone()));
    let sweep_task = tokio::spawn(resume_stalled_workflows(Arc::clone(&context), shutdown.clone()));

    let app = create_app(AppState::new(Arc::clone(&context)));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_address))?;
    info!(address = %config.server.bind_address, "Webhook server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown signal received, draining post-processing tasks");
    shutdown.cancel();
    context.tasks.close();
    let grace = config.orchestration.shutdown_grace();
    if tokio::time::timeout(grace, context.tasks.wait()).await.is_err() {
        warn!(
            remaining = context.tasks.len(),
            grace_ms = grace.as_millis() as u64,
            "Post-processing tasks still running at shutdown; the stalled sweep resumes them after restart"
        );
    }
    if let Err(e) = purge_task.await {
        error!(error = %e, "Ledger purge task ended abnormally");
    }
    if let Err(e) = sweep_task.await {
        error!(error = %e, "Stalled workflow sweep ended abnormally");
    }

    info!("Reelflow server shutdown complete");
    Ok(())
}

/// Periodically delete expired idempotency records
async fn purge_ledger(context: Arc<OrchestratorContext>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(LEDGER_PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                match context.stores.ledger.purge_expired(Utc::now()).await {
                    Ok(0) => {}
                    Ok(purged) => info!(purged, "Expired idempotency records purged"),
                    Err(e) => logging::log_error("idempotency", "purge_expired", &e.to_string(), None),
                }
            }
        }
    }
}

/// Periodically resume workflows left in post-processing; the first pass runs at startup
async fn resume_stalled_workflows(context: Arc<OrchestratorContext>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(context.config.orchestration.stall_sweep_interval());
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                for tenant in context.config.tenants.keys() {
                    match context.resume_stalled(tenant, Utc::now()).await {
                        Ok(0) => {}
                        Ok(resumed) => info!(tenant = %tenant, resumed, "Stalled workflows resumed"),
                        Err(e) => logging::log_error("post_processor", "resume_stalled", &e.to_string(), Some(tenant.as_str())),
                    }
                }
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
