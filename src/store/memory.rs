//! In-process stores backed by `DashMap`.
//!
//! Per-key atomicity comes from holding the shard lock for the whole
//! check-then-write, mirroring the row lock taken by the PostgreSQL stores.

use super::{not_found, DeadLetterLog, IdempotencyLedger, TransitionOutcome, WorkflowStore};
use crate::constants::ServiceKind;
use crate::error::{OrchestratorError, Result};
use crate::models::{
    CachedResponse, ClaimOutcome, DeadLetterEntry, IdempotencyKey, IdempotencyRecord, Workflow,
};
use crate::state_machine::{WorkflowEvent, WorkflowStateMachine, WorkflowStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::RwLock;

type WorkflowKey = (String, String);

fn workflow_key(tenant: &str, id: &str) -> WorkflowKey {
    (tenant.to_string(), id.to_string())
}

#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    workflows: DashMap<WorkflowKey, Workflow>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create(&self, workflow: Workflow) -> Result<Workflow> {
        match self.workflows.entry(workflow_key(&workflow.tenant, &workflow.id)) {
            Entry::Occupied(_) => Err(OrchestratorError::store(format!(
                "workflow {} already exists for tenant {}",
                workflow.id, workflow.tenant
            ))),
            Entry::Vacant(slot) => {
                slot.insert(workflow.clone());
                Ok(workflow)
            }
        }
    }

    async fn get(&self, tenant: &str, id: &str) -> Result<Option<Workflow>> {
        Ok(self
            .workflows
            .get(&workflow_key(tenant, id))
            .map(|entry| entry.value().clone()))
    }

    async fn find_by_caption_id(&self, tenant: &str, project_id: &str) -> Result<Option<Workflow>> {
        Ok(self
            .workflows
            .iter()
            .find(|entry| {
                let wf = entry.value();
                wf.tenant == tenant && wf.caption_external_id.as_deref() == Some(project_id)
            })
            .map(|entry| entry.value().clone()))
    }

    async fn transition(
        &self,
        tenant: &str,
        id: &str,
        event: WorkflowEvent,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        let mut entry = self
            .workflows
            .get_mut(&workflow_key(tenant, id))
            .ok_or_else(|| not_found(tenant, id))?;

        let workflow = entry.value_mut();
        Ok(match WorkflowStateMachine::apply(workflow, &event, now) {
            Ok(transition) => TransitionOutcome::Applied {
                workflow: workflow.clone(),
                transition,
            },
            Err(reason) => TransitionOutcome::Rejected {
                workflow: workflow.clone(),
                reason,
            },
        })
    }

    async fn list_failed(&self, tenant: &str) -> Result<Vec<Workflow>> {
        let mut failed: Vec<Workflow> = self
            .workflows
            .iter()
            .filter(|entry| {
                let wf = entry.value();
                wf.tenant == tenant && wf.status == WorkflowStatus::Failed
            })
            .map(|entry| entry.value().clone())
            .collect();
        failed.sort_by_key(|wf| wf.failed_at);
        Ok(failed)
    }

    async fn list_stalled(
        &self,
        tenant: &str,
        statuses: &[WorkflowStatus],
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Workflow>> {
        let mut stalled: Vec<Workflow> = self
            .workflows
            .iter()
            .filter(|entry| {
                let wf = entry.value();
                wf.tenant == tenant && statuses.contains(&wf.status) && wf.updated_at < updated_before
            })
            .map(|entry| entry.value().clone())
            .collect();
        stalled.sort_by_key(|wf| wf.updated_at);
        Ok(stalled)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryIdempotencyLedger {
    records: DashMap<IdempotencyKey, IdempotencyRecord>,
}

impl InMemoryIdempotencyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn outcome_of(record: &IdempotencyRecord) -> ClaimOutcome {
    match &record.response {
        Some(response) => ClaimOutcome::Completed {
            response: response.clone(),
            request_hash: record.request_hash.clone(),
        },
        None => ClaimOutcome::InFlight {
            request_hash: record.request_hash.clone(),
        },
    }
}

#[async_trait]
impl IdempotencyLedger for InMemoryIdempotencyLedger {
    async fn lookup(&self, key: &IdempotencyKey, now: DateTime<Utc>) -> Result<Option<ClaimOutcome>> {
        Ok(self
            .records
            .get(key)
            .filter(|record| !record.is_expired(now))
            .map(|record| outcome_of(&record)))
    }

    async fn claim(
        &self,
        key: &IdempotencyKey,
        request_hash: &str,
        lease_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        let fresh = IdempotencyRecord::in_flight(key.clone(), request_hash, lease_seconds, now);
        match self.records.entry(key.clone()) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_expired(now) {
                    existing.insert(fresh);
                    Ok(ClaimOutcome::Claimed)
                } else {
                    Ok(outcome_of(existing.get()))
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(fresh);
                Ok(ClaimOutcome::Claimed)
            }
        }
    }

    async fn complete(
        &self,
        key: &IdempotencyKey,
        response: CachedResponse,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut record = self
            .records
            .get_mut(key)
            .ok_or_else(|| OrchestratorError::store(format!("no idempotency claim for {key}")))?;
        record.complete(response, ttl_seconds, now);
        Ok(())
    }

    async fn release(&self, key: &IdempotencyKey) -> Result<()> {
        self.records.remove_if(key, |_, record| !record.is_completed());
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        Ok(before.saturating_sub(self.records.len()) as u64)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDeadLetterLog {
    entries: RwLock<Vec<DeadLetterEntry>>,
}

impl InMemoryDeadLetterLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry in append order
    pub fn entries(&self) -> Vec<DeadLetterEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl DeadLetterLog for InMemoryDeadLetterLog {
    async fn append(&self, entry: DeadLetterEntry) -> Result<()> {
        self.entries.write().push(entry);
        Ok(())
    }

    async fn recent(&self, service: Option<ServiceKind>, limit: usize) -> Result<Vec<DeadLetterEntry>> {
        Ok(self
            .entries
            .read()
            .iter()
            .rev()
            .filter(|entry| service.map_or(true, |s| entry.service == s))
            .take(limit)
            .cloned()
            .collect())
    }
}
