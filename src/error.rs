//! Error types for the Reelflow orchestrator.
//!
//! The variants follow the failure taxonomy of the webhook ingress: validation and
//! verification failures are rejected before the store is touched, not-found events
//! are logged and dropped, upstream failures move a workflow to `failed`, and every
//! other error is internal (dead-lettered and answered with a generic 500).

use crate::state_machine::StateMachineError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestratorError {
    /// A required correlation field is missing or the payload is malformed
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// Webhook signature did not match the configured secret
    #[error("Verification error: {0}")]
    VerificationError(String),
    /// No workflow matches the tenant and correlation id
    #[error("Not found: {0}")]
    NotFound(String),
    /// A downstream collaborator call failed
    #[error("Upstream error from {service}: {message}")]
    UpstreamError { service: String, message: String },
    /// A bounded wait elapsed
    #[error("Timeout error: {0}")]
    Timeout(String),
    /// The workflow rejected the requested transition
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Store error: {0}")]
    StoreError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamError {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::StoreError(message.into())
    }

    /// Failures that should move the workflow to `failed` rather than be dead-lettered
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::UpstreamError { .. } | Self::Timeout(_))
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(error: serde_json::Error) -> Self {
        OrchestratorError::SerializationError(error.to_string())
    }
}

impl From<sqlx::Error> for OrchestratorError {
    fn from(error: sqlx::Error) -> Self {
        OrchestratorError::StoreError(error.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for OrchestratorError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        OrchestratorError::StoreError(format!("migration failed: {error}"))
    }
}

impl From<reqwest::Error> for OrchestratorError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            OrchestratorError::Timeout(error.to_string())
        } else {
            OrchestratorError::UpstreamError {
                service: error
                    .url()
                    .and_then(|url| url.host_str().map(str::to_string))
                    .unwrap_or_else(|| "unknown".to_string()),
                message: error.to_string(),
            }
        }
    }
}

impl From<StateMachineError> for OrchestratorError {
    fn from(error: StateMachineError) -> Self {
        OrchestratorError::InvalidTransition(error.to_string())
    }
}

impl From<config::ConfigError> for OrchestratorError {
    fn from(error: config::ConfigError) -> Self {
        OrchestratorError::ConfigurationError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
