pub mod dead_letter;
pub mod idempotency;
pub mod payload;
pub mod workflow;

// Re-export core models for easy access
pub use dead_letter::{DeadLetterEntry, RequestSnapshot};
pub use idempotency::{
    clamped_seconds, expiry_after, hash_request, CachedResponse, ClaimOutcome, IdempotencyKey,
    IdempotencyRecord,
};
pub use payload::{AvatarEvent, AvatarOutcome, CaptionEvent, CaptionStatus};
pub use workflow::{StageTransition, Workflow};
