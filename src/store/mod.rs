//! # Persistence
//!
//! The three shared resources of the orchestrator: the workflow store, the
//! idempotency ledger and the dead-letter log. Each has an in-memory
//! implementation (tests and local development) and a PostgreSQL one.
//!
//! Every write is scoped to a single `(tenant, id)` or
//! `(service, external_id, tenant)` key; no operation spans records.

pub mod memory;
pub mod postgres;

use crate::constants::ServiceKind;
use crate::error::{OrchestratorError, Result};
use crate::models::{CachedResponse, ClaimOutcome, DeadLetterEntry, IdempotencyKey, Workflow};
use crate::state_machine::{StateMachineError, Transition, WorkflowEvent, WorkflowStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::{InMemoryDeadLetterLog, InMemoryIdempotencyLedger, InMemoryWorkflowStore};
pub use postgres::{PgDeadLetterLog, PgIdempotencyLedger, PgWorkflowStore};

/// Result of applying one event to a stored workflow
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// Event applied and persisted; carries the updated record
    Applied {
        workflow: Workflow,
        transition: Transition,
    },
    /// Event refused by the state machine; the stored record is unchanged
    Rejected {
        workflow: Workflow,
        reason: StateMachineError,
    },
}

impl TransitionOutcome {
    pub fn workflow(&self) -> &Workflow {
        match self {
            Self::Applied { workflow, .. } | Self::Rejected { workflow, .. } => workflow,
        }
    }

    /// Collapse a rejection into an `InvalidTransition` error
    pub fn into_applied(self) -> Result<Workflow> {
        match self {
            Self::Applied { workflow, .. } => Ok(workflow),
            Self::Rejected { reason, .. } => Err(reason.into()),
        }
    }
}

/// Tenant-scoped workflow persistence
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert a new workflow; fails if `(tenant, id)` already exists
    async fn create(&self, workflow: Workflow) -> Result<Workflow>;

    async fn get(&self, tenant: &str, id: &str) -> Result<Option<Workflow>>;

    /// Lookup by the caption project id currently associated with the workflow
    async fn find_by_caption_id(&self, tenant: &str, project_id: &str) -> Result<Option<Workflow>>;

    /// Atomically apply `event` to `(tenant, id)`.
    ///
    /// Returns `NotFound` when no such workflow exists. The check of the current
    /// status and the write of the new one happen under a single lock.
    ///
    /// The ingress handlers and the post-processor drive every event except
    /// [`WorkflowEvent::ExportPending`], which is reserved for operator tooling
    /// that parks a workflow whose export was requested out of band.
    async fn transition(
        &self,
        tenant: &str,
        id: &str,
        event: WorkflowEvent,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome>;

    /// Failed workflows for operator retry tooling, oldest first
    async fn list_failed(&self, tenant: &str) -> Result<Vec<Workflow>>;

    /// Workflows of `tenant` sitting in one of `statuses` whose last update is
    /// older than `updated_before`, oldest first
    async fn list_stalled(
        &self,
        tenant: &str,
        statuses: &[WorkflowStatus],
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Workflow>>;
}

/// Dedup ledger keyed by `(service, external_id, tenant)`
#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    /// Read-only check; expired records are reported as absent
    async fn lookup(&self, key: &IdempotencyKey, now: DateTime<Utc>) -> Result<Option<ClaimOutcome>>;

    /// Atomically claim `key` for this delivery.
    ///
    /// Exactly one of any number of concurrent callers observes `Claimed`. The
    /// claim lapses after `lease_seconds` unless completed first.
    async fn claim(
        &self,
        key: &IdempotencyKey,
        request_hash: &str,
        lease_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome>;

    /// Record the response for a claimed key and retain it for `ttl_seconds`
    async fn complete(
        &self,
        key: &IdempotencyKey,
        response: CachedResponse,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Drop an in-flight claim so a redelivery is processed again
    async fn release(&self, key: &IdempotencyKey) -> Result<()>;

    /// Remove expired records, returning how many were deleted
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Append-only log of unrecoverable handler failures
#[async_trait]
pub trait DeadLetterLog: Send + Sync {
    async fn append(&self, entry: DeadLetterEntry) -> Result<()>;

    /// Most recent entries first
    async fn recent(&self, service: Option<ServiceKind>, limit: usize) -> Result<Vec<DeadLetterEntry>>;
}

pub(crate) fn not_found(tenant: &str, id: &str) -> OrchestratorError {
    OrchestratorError::not_found(format!("workflow {id} for tenant {tenant}"))
}
