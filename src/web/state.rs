//! # Web Application State
//!
//! The router shares one [`OrchestratorContext`]; handlers never build their own
//! store or client handles.

use crate::config::ReelflowConfig;
use crate::orchestration::OrchestratorContext;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub context: Arc<OrchestratorContext>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(context: Arc<OrchestratorContext>) -> Self {
        Self {
            context,
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &ReelflowConfig {
        &self.context.config
    }
}
