// State machine module for the video-production workflow
//
// Transition rules are pure functions over the `Workflow` record; the stores
// apply them under a per-record lock so check-then-write is atomic.

pub mod errors;
pub mod events;
pub mod states;
pub mod workflow_state_machine;

// Re-export main types for convenient access
pub use errors::{StateMachineError, StateMachineResult};
pub use events::WorkflowEvent;
pub use states::WorkflowStatus;
pub use workflow_state_machine::{Transition, WorkflowStateMachine};
