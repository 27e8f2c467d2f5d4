//! # Orchestration Engine
//!
//! Drives a content item through avatar synthesis, caption enhancement and
//! multi-platform scheduling purely from webhook callbacks.
//!
//! ## Core Components
//!
//! - **OrchestratorContext**: process-wide handles shared by every stage
//! - **Stage-1 Ingress**: avatar callbacks; checkpoints the avatar asset and creates the caption project
//! - **Stage-2 Ingress**: two-phase caption callbacks; requests the export, then detaches post-processing
//! - **Post-Processor**: durable upload, same-day scheduling, completion
//!
//! Per-workflow safety comes from the idempotency claim taken before any side
//! effect and from atomic, status-guarded store transitions. There is no global
//! lock; different workflows are handled fully in parallel.

pub mod context;
pub mod post_processor;
pub mod stage_one;
pub mod stage_two;
pub mod title;

pub use context::{OrchestratorContext, Services, Stores};
pub use post_processor::PostProcessJob;
pub use title::{caption_project_title, decode_entities};
