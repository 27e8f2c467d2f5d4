#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Reelflow Core
//!
//! Webhook-driven orchestrator that turns content items into short-form social
//! videos by chaining three independently operated services: avatar synthesis,
//! caption enhancement and multi-platform scheduling.
//!
//! ## Overview
//!
//! Nothing polls. Each external service calls back into a brand-scoped webhook,
//! the matching ingress handler advances the workflow, and the next stage is
//! triggered either inside a bounded wait or as a detached background task.
//!
//! ## Guarantees
//!
//! - **At-most-once side effects**: a delivery claims its idempotency key before
//!   touching anything; redeliveries receive the cached response verbatim
//! - **Tenant isolation**: every lookup and mutation is scoped by `(tenant, id)`
//! - **Checkpoint durability**: asset URLs are written before the next stage is
//!   attempted and are never cleared, so failed workflows can be resumed
//! - **No silent loss**: unhandled errors and panics become a 500 paired with a
//!   dead-letter entry
//!
//! ## Module Organization
//!
//! - [`state_machine`] - Workflow statuses, events and transition rules
//! - [`models`] - Workflow record, idempotency and dead-letter entries, payload normalization
//! - [`store`] - Workflow store, idempotency ledger and dead-letter log (in-memory and PostgreSQL)
//! - [`orchestration`] - Stage-1 and Stage-2 ingress, post-processing
//! - [`services`] - Outbound collaborators (caption, scheduling, storage, alerts)
//! - [`scheduling`] - Same-day per-platform posting slots
//! - [`resilience`] - Circuit breaker for asset probes
//! - [`web`] - axum router, signature verification, error mapping
//! - [`config`] - Layered configuration and tenant profiles
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reelflow_core::config::ReelflowConfig;
//! use reelflow_core::orchestration::{OrchestratorContext, Services, Stores};
//! use reelflow_core::web::{create_app, AppState};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(ReelflowConfig::load()?);
//! let services = Services::from_config(&config)?;
//! let context = Arc::new(OrchestratorContext::new(config, Stores::in_memory(), services));
//! let app = create_app(AppState::new(context));
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod resilience;
pub mod scheduling;
pub mod services;
pub mod state_machine;
pub mod store;
pub mod web;

pub use error::{OrchestratorError, Result};
