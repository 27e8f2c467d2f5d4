//! Failure alerts.
//!
//! Alerting is best-effort: [`notify_best_effort`] bounds every delivery with a
//! timeout and swallows whatever goes wrong, so a broken alert channel can never
//! turn a handled failure into an unhandled one.

use super::FailureNotifier;
use crate::error::{OrchestratorError, Result};
use crate::logging::log_error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureAlert {
    pub tenant: String,
    pub workflow_id: String,
    pub title: Option<String>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl FailureAlert {
    pub fn new(
        tenant: impl Into<String>,
        workflow_id: impl Into<String>,
        title: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            workflow_id: workflow_id.into(),
            title,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Writes alerts to the log only
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl FailureNotifier for TracingNotifier {
    async fn notify(&self, alert: &FailureAlert) -> Result<()> {
        warn!(
            tenant = %alert.tenant,
            workflow_id = %alert.workflow_id,
            title = alert.title.as_deref(),
            reason = %alert.reason,
            "Video workflow failed"
        );
        Ok(())
    }
}

/// POSTs each alert as JSON to a configured webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OrchestratorError::ConfigurationError(format!("alert client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FailureNotifier for WebhookNotifier {
    async fn notify(&self, alert: &FailureAlert) -> Result<()> {
        let response = self.client.post(&self.url).json(alert).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OrchestratorError::upstream(
                "alerts",
                format!("alert webhook answered HTTP {}", status.as_u16()),
            ));
        }
        debug!(tenant = %alert.tenant, workflow_id = %alert.workflow_id, "Failure alert delivered");
        Ok(())
    }
}

/// Deliver `alert`, bounded by `timeout`; never returns an error
pub async fn notify_best_effort(notifier: &dyn FailureNotifier, alert: FailureAlert, timeout: Duration) {
    match tokio::time::timeout(timeout, notifier.notify(&alert)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log_error(
            "notifier",
            "notify",
            &e.to_string(),
            Some(&format!("{}:{}", alert.tenant, alert.workflow_id)),
        ),
        Err(_) => log_error(
            "notifier",
            "notify",
            &format!("alert delivery timed out after {}ms", timeout.as_millis()),
            Some(&format!("{}:{}", alert.tenant, alert.workflow_id)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing(AtomicUsize);

    #[async_trait]
    impl FailureNotifier for Failing {
        async fn notify(&self, _alert: &FailureAlert) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(OrchestratorError::upstream("alerts", "down"))
        }
    }

    struct Hanging;

    #[async_trait]
    impl FailureNotifier for Hanging {
        async fn notify(&self, _alert: &FailureAlert) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    fn alert() -> FailureAlert {
        FailureAlert::new("ownerfi", "wf1", Some("Title".into()), "caption service 500")
    }

    #[tokio::test]
    async fn test_errors_are_swallowed() {
        let notifier = Failing(AtomicUsize::new(0));
        notify_best_effort(&notifier, alert(), Duration::from_millis(100)).await;
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_notifier_is_bounded() {
        notify_best_effort(&Hanging, alert(), Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_tracing_notifier_succeeds() {
        assert!(TracingNotifier.notify(&alert()).await.is_ok());
    }

    #[test]
    fn test_alert_json_shape() {
        let json = serde_json::to_value(alert()).unwrap();
        assert_eq!(json["tenant"], "ownerfi");
        assert_eq!(json["workflow_id"], "wf1");
        assert_eq!(json["reason"], "caption service 500");
    }
}
