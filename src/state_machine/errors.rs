use chrono::{DateTime, Utc};
use thiserror::Error;

/// Reasons a workflow refuses an event
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateMachineError {
    #[error("Invalid transition from {from} on event {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Workflow is in terminal state {status}")]
    TerminalState { status: String },

    #[error("Export already requested at {requested_at}")]
    ExportAlreadyRequested { requested_at: DateTime<Utc> },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
