//! # Configuration
//!
//! Layered configuration for the orchestrator, lowest precedence first:
//!
//! 1. Compiled defaults ([`ReelflowConfig::default`])
//! 2. Optional TOML file: `config/reelflow.toml`, or the path in `REELFLOW_CONFIG`
//! 3. Environment variables prefixed `REELFLOW__`, nested with `__`
//!    (e.g. `REELFLOW__SERVER__BIND_ADDRESS=0.0.0.0:8080`)
//!
//! The loaded configuration is validated once at startup and then shared
//! read-only behind an `Arc`.

pub mod tenants;

pub use tenants::{default_tenants, TenantProfile};

use crate::constants::{timeouts, windows, ServiceKind};
use crate::error::{OrchestratorError, Result};
use crate::resilience::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_CONFIG_FILE: &str = "config/reelflow.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReelflowConfig {
    pub environment: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub orchestration: OrchestrationConfig,
    pub caption_service: ServiceEndpointConfig,
    pub scheduling_service: ServiceEndpointConfig,
    pub storage: StorageConfig,
    pub alerts: AlertsConfig,
    pub signatures: SignatureConfig,
    pub tenants: BTreeMap<String, TenantProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Externally reachable base URL; per-tenant webhook URLs are built from it
    pub public_base_url: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL; absent selects the in-memory stores
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    pub stage_trigger_timeout_ms: u64,
    pub export_max_attempts: u32,
    pub export_backoff_base_ms: u64,
    pub export_retry_window_seconds: u64,
    pub idempotency_ttl_seconds: u64,
    pub claim_lease_seconds: u64,
    pub stall_threshold_seconds: u64,
    pub stall_sweep_interval_seconds: u64,
    pub notifier_timeout_ms: u64,
    pub schedule_lead_minutes: i64,
    pub shutdown_grace_ms: u64,
    pub asset_probe: CircuitBreakerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEndpointConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Objects are PUT to `{upload_url}/{path}`
    pub upload_url: String,
    /// Public URL prefix of uploaded objects
    pub public_base_url: String,
    pub bearer_token: Option<String>,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AlertsConfig {
    /// JSON webhook receiving failure alerts; absent logs alerts only
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SignatureConfig {
    /// HMAC secret for the avatar service; absent disables verification
    pub avatar: Option<String>,
    /// HMAC secret for the caption service; absent disables verification
    pub caption: Option<String>,
}

impl SignatureConfig {
    pub fn secret_for(&self, service: ServiceKind) -> Option<&str> {
        match service {
            ServiceKind::Avatar => self.avatar.as_deref(),
            ServiceKind::Caption => self.caption.as_deref(),
            ServiceKind::Scheduling => None,
        }
        .filter(|s| !s.is_empty())
    }
}

impl Default for ReelflowConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerConfig {
                bind_address: "0.0.0.0:8080".to_string(),
                public_base_url: "http://localhost:8080".to_string(),
                request_timeout_ms: timeouts::WEBHOOK_REQUEST_TIMEOUT_MS,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
            },
            orchestration: OrchestrationConfig::default(),
            caption_service: ServiceEndpointConfig {
                base_url: "https://api.submagic.co/v1".to_string(),
                api_key: None,
                request_timeout_ms: timeouts::HTTP_REQUEST_TIMEOUT_MS,
            },
            scheduling_service: ServiceEndpointConfig {
                base_url: "https://getlate.dev/api/v1".to_string(),
                api_key: None,
                request_timeout_ms: timeouts::HTTP_REQUEST_TIMEOUT_MS,
            },
            storage: StorageConfig {
                upload_url: "http://localhost:9000/reelflow".to_string(),
                public_base_url: "http://localhost:9000/reelflow".to_string(),
                bearer_token: None,
                request_timeout_ms: 120_000,
            },
            alerts: AlertsConfig::default(),
            signatures: SignatureConfig::default(),
            tenants: default_tenants(),
        }
    }
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            stage_trigger_timeout_ms: timeouts::STAGE_TRIGGER_TIMEOUT_MS,
            export_max_attempts: windows::EXPORT_MAX_ATTEMPTS,
            export_backoff_base_ms: windows::EXPORT_BACKOFF_BASE_MS,
            export_retry_window_seconds: windows::EXPORT_RETRY_WINDOW_SECONDS,
            idempotency_ttl_seconds: windows::IDEMPOTENCY_TTL_SECONDS,
            claim_lease_seconds: windows::CLAIM_LEASE_SECONDS,
            stall_threshold_seconds: windows::STALL_THRESHOLD_SECONDS,
            stall_sweep_interval_seconds: windows::STALL_SWEEP_INTERVAL_SECONDS,
            notifier_timeout_ms: timeouts::NOTIFIER_TIMEOUT_MS,
            schedule_lead_minutes: windows::SCHEDULE_LEAD_MINUTES,
            shutdown_grace_ms: timeouts::SHUTDOWN_GRACE_MS,
            asset_probe: CircuitBreakerConfig::default(),
        }
    }
}

impl OrchestrationConfig {
    pub fn stage_trigger_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_trigger_timeout_ms)
    }

    pub fn notifier_timeout(&self) -> Duration {
        Duration::from_millis(self.notifier_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn stall_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.stall_sweep_interval_seconds)
    }

    /// Delay before export attempt `attempt + 1` (1-based `attempt`): base, 2x base, 4x base, ...
    pub fn export_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.export_backoff_base_ms.saturating_mul(factor))
    }
}

impl ServiceEndpointConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl StorageConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl ReelflowConfig {
    /// Load defaults, then the config file, then environment overrides
    pub fn load() -> Result<Self> {
        let path = std::env::var("REELFLOW_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        debug!(path, "Loading configuration");

        let defaults = config::Config::try_from(&ReelflowConfig::default())?;
        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("REELFLOW")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut loaded: ReelflowConfig = settings.try_deserialize()?;
        if let Ok(env) = std::env::var("REELFLOW_ENV") {
            loaded.environment = env;
        }
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject configurations the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.tenants.is_empty() {
            return Err(invalid("tenants", "at least one tenant must be configured"));
        }
        for (name, profile) in &self.tenants {
            profile.tz()?;
            if profile.platforms.is_empty() {
                return Err(invalid(&format!("tenants.{name}.platforms"), "must not be empty"));
            }
        }

        let o = &self.orchestration;
        for (field, value) in [
            ("orchestration.stage_trigger_timeout_ms", o.stage_trigger_timeout_ms),
            ("orchestration.notifier_timeout_ms", o.notifier_timeout_ms),
            ("orchestration.idempotency_ttl_seconds", o.idempotency_ttl_seconds),
            ("orchestration.claim_lease_seconds", o.claim_lease_seconds),
            ("orchestration.stall_threshold_seconds", o.stall_threshold_seconds),
            ("orchestration.stall_sweep_interval_seconds", o.stall_sweep_interval_seconds),
            ("server.request_timeout_ms", self.server.request_timeout_ms),
            ("caption_service.request_timeout_ms", self.caption_service.request_timeout_ms),
            ("scheduling_service.request_timeout_ms", self.scheduling_service.request_timeout_ms),
            ("storage.request_timeout_ms", self.storage.request_timeout_ms),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0"));
            }
        }
        if o.claim_lease_seconds.saturating_mul(1_000) <= o.stage_trigger_timeout_ms {
            return Err(invalid(
                "orchestration.claim_lease_seconds",
                "must outlast orchestration.stage_trigger_timeout_ms",
            ));
        }
        if o.claim_lease_seconds > o.idempotency_ttl_seconds {
            return Err(invalid(
                "orchestration.claim_lease_seconds",
                "must not exceed orchestration.idempotency_ttl_seconds",
            ));
        }
        if o.export_max_attempts == 0 {
            return Err(invalid("orchestration.export_max_attempts", "must be greater than 0"));
        }
        if o.asset_probe.call_timeout.is_zero() || o.asset_probe.failure_threshold == 0 {
            return Err(invalid("orchestration.asset_probe", "timeout and threshold must be greater than 0"));
        }

        for (field, url) in [
            ("server.public_base_url", Some(self.server.public_base_url.as_str())),
            ("caption_service.base_url", Some(self.caption_service.base_url.as_str())),
            ("scheduling_service.base_url", Some(self.scheduling_service.base_url.as_str())),
            ("storage.upload_url", Some(self.storage.upload_url.as_str())),
            ("storage.public_base_url", Some(self.storage.public_base_url.as_str())),
            ("alerts.webhook_url", self.alerts.webhook_url.as_deref()),
        ] {
            if let Some(url) = url {
                reqwest::Url::parse(url).map_err(|e| invalid(field, &e.to_string()))?;
            }
        }

        if self.is_production() {
            if self.database.url.is_none() {
                warn!("No database URL configured in production; workflows will not survive restarts");
            }
            for service in [ServiceKind::Avatar, ServiceKind::Caption] {
                if self.signatures.secret_for(service).is_none() {
                    warn!(%service, "Webhook signature verification disabled");
                }
            }
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn tenant(&self, name: &str) -> Option<&TenantProfile> {
        self.tenants.get(name)
    }

    /// Public webhook URL for `service` under `tenant`
    pub fn webhook_url(&self, service: ServiceKind, tenant: &str) -> String {
        format!(
            "{}/webhooks/{}/{}",
            self.server.public_base_url.trim_end_matches('/'),
            service,
            tenant
        )
    }
}

fn invalid(field: &str, reason: &str) -> OrchestratorError {
    OrchestratorError::ConfigurationError(format!("{field}: {reason}"))
}
