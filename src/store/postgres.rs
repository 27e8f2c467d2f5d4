//! PostgreSQL stores.
//!
//! Workflows are stored as a JSONB record with denormalized lookup columns.
//! Transitions run in a transaction holding `SELECT ... FOR UPDATE` on the row;
//! idempotency claims rely on `INSERT ... ON CONFLICT DO NOTHING`.

use super::{not_found, DeadLetterLog, IdempotencyLedger, TransitionOutcome, WorkflowStore};
use crate::constants::ServiceKind;
use crate::error::{OrchestratorError, Result};
use crate::models::{
    expiry_after, CachedResponse, ClaimOutcome, DeadLetterEntry, IdempotencyKey, IdempotencyRecord,
    RequestSnapshot, Workflow,
};
use crate::state_machine::{WorkflowEvent, WorkflowStateMachine, WorkflowStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;
use tracing::{debug, info};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Connect and run embedded migrations
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;
    MIGRATOR.run(&pool).await?;
    info!(max_connections, "Database pool ready, migrations applied");
    Ok(pool)
}

fn decode_workflow(record: Value) -> Result<Workflow> {
    Ok(serde_json::from_value(record)?)
}

#[derive(Debug, Clone)]
pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn create(&self, workflow: Workflow) -> Result<Workflow> {
        let record = serde_json::to_value(&workflow)?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO reelflow_workflows
            (tenant, workflow_id, status, caption_external_id, record, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant, workflow_id) DO NOTHING
            "#,
        )
        .bind(&workflow.tenant)
        .bind(&workflow.id)
        .bind(workflow.status.as_str())
        .bind(&workflow.caption_external_id)
        .bind(record)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(OrchestratorError::store(format!(
                "workflow {} already exists for tenant {}",
                workflow.id, workflow.tenant
            )));
        }
        Ok(workflow)
    }

    async fn get(&self, tenant: &str, id: &str) -> Result<Option<Workflow>> {
        let row = sqlx::query(
            "SELECT record FROM reelflow_workflows WHERE tenant = $1 AND workflow_id = $2",
        )
        .bind(tenant)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| decode_workflow(r.try_get("record")?)).transpose()
    }

    async fn find_by_caption_id(&self, tenant: &str, project_id: &str) -> Result<Option<Workflow>> {
        let row = sqlx::query(
            r#"
            SELECT record FROM reelflow_workflows
            WHERE tenant = $1 AND caption_external_id = $2
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant)
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| decode_workflow(r.try_get("record")?)).transpose()
    }

    async fn transition(
        &self,
        tenant: &str,
        id: &str,
        event: WorkflowEvent,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT record FROM reelflow_workflows WHERE tenant = $1 AND workflow_id = $2 FOR UPDATE",
        )
        .bind(tenant)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| not_found(tenant, id))?;

        let mut workflow = decode_workflow(row.try_get("record")?)?;

        let transition = match WorkflowStateMachine::apply(&mut workflow, &event, now) {
            Ok(transition) => transition,
            Err(reason) => {
                tx.rollback().await?;
                return Ok(TransitionOutcome::Rejected { workflow, reason });
            }
        };

        sqlx::query(
            r#"
            UPDATE reelflow_workflows
            SET status = $3, caption_external_id = $4, record = $5, updated_at = $6
            WHERE tenant = $1 AND workflow_id = $2
            "#,
        )
        .bind(tenant)
        .bind(id)
        .bind(workflow.status.as_str())
        .bind(&workflow.caption_external_id)
        .bind(serde_json::to_value(&workflow)?)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(tenant, workflow_id = id, from = %transition.from, to = %transition.to, "Workflow transition persisted");

        Ok(TransitionOutcome::Applied {
            workflow,
            transition,
        })
    }

    async fn list_failed(&self, tenant: &str) -> Result<Vec<Workflow>> {
        let rows = sqlx::query(
            r#"
            SELECT record FROM reelflow_workflows
            WHERE tenant = $1 AND status = 'failed'
            ORDER BY updated_at ASC
            "#,
        )
        .bind(tenant)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| decode_workflow(r.try_get("record")?))
            .collect()
    }

    async fn list_stalled(
        &self,
        tenant: &str,
        statuses: &[WorkflowStatus],
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Workflow>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query(
            r#"
            SELECT record FROM reelflow_workflows
            WHERE tenant = $1 AND status = ANY($2) AND updated_at < $3
            ORDER BY updated_at ASC
            "#,
        )
        .bind(tenant)
        .bind(&statuses)
        .bind(updated_before)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| decode_workflow(r.try_get("record")?))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct PgIdempotencyLedger {
    pool: PgPool,
}

impl PgIdempotencyLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query(
            r#"
            SELECT request_hash, response, created_at, completed_at, expires_at
            FROM reelflow_idempotency
            WHERE service = $1 AND external_id = $2 AND tenant = $3
            "#,
        )
        .bind(key.service.as_str())
        .bind(&key.external_id)
        .bind(&key.tenant)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let response: Option<Value> = row.try_get("response")?;
        Ok(Some(IdempotencyRecord {
            key: key.clone(),
            request_hash: row.try_get::<String, _>("request_hash")?.trim().to_string(),
            response: response.map(serde_json::from_value).transpose()?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
            expires_at: row.try_get("expires_at")?,
        }))
    }
}

fn outcome_of(record: IdempotencyRecord) -> ClaimOutcome {
    match record.response {
        Some(response) => ClaimOutcome::Completed {
            response,
            request_hash: record.request_hash,
        },
        None => ClaimOutcome::InFlight {
            request_hash: record.request_hash,
        },
    }
}

#[async_trait]
impl IdempotencyLedger for PgIdempotencyLedger {
    async fn lookup(&self, key: &IdempotencyKey, now: DateTime<Utc>) -> Result<Option<ClaimOutcome>> {
        Ok(self
            .fetch(key)
            .await?
            .filter(|record| !record.is_expired(now))
            .map(outcome_of))
    }

    async fn claim(
        &self,
        key: &IdempotencyKey,
        request_hash: &str,
        lease_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        let fresh = IdempotencyRecord::in_flight(key.clone(), request_hash, lease_seconds, now);

        // Expired rows are overwritten in place; live rows are left alone
        let claimed = sqlx::query(
            r#"
            INSERT INTO reelflow_idempotency
            (service, external_id, tenant, request_hash, response, created_at, completed_at, expires_at)
            VALUES ($1, $2, $3, $4, NULL, $5, NULL, $6)
            ON CONFLICT (service, external_id, tenant) DO UPDATE
            SET request_hash = EXCLUDED.request_hash,
                response = NULL,
                created_at = EXCLUDED.created_at,
                completed_at = NULL,
                expires_at = EXCLUDED.expires_at
            WHERE reelflow_idempotency.expires_at <= $5
            "#,
        )
        .bind(key.service.as_str())
        .bind(&key.external_id)
        .bind(&key.tenant)
        .bind(request_hash)
        .bind(now)
        .bind(fresh.expires_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if claimed == 1 {
            return Ok(ClaimOutcome::Claimed);
        }

        match self.fetch(key).await? {
            Some(record) => Ok(outcome_of(record)),
            // Released between our insert attempt and the read; let the caller retry
            None => Ok(ClaimOutcome::InFlight {
                request_hash: request_hash.to_string(),
            }),
        }
    }

    async fn complete(
        &self,
        key: &IdempotencyKey,
        response: CachedResponse,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE reelflow_idempotency
            SET response = $4, completed_at = $5, expires_at = $6
            WHERE service = $1 AND external_id = $2 AND tenant = $3
            "#,
        )
        .bind(key.service.as_str())
        .bind(&key.external_id)
        .bind(&key.tenant)
        .bind(serde_json::to_value(&response)?)
        .bind(now)
        .bind(expiry_after(now, ttl_seconds))
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(OrchestratorError::store(format!("no idempotency claim for {key}")));
        }
        Ok(())
    }

    async fn release(&self, key: &IdempotencyKey) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM reelflow_idempotency
            WHERE service = $1 AND external_id = $2 AND tenant = $3 AND response IS NULL
            "#,
        )
        .bind(key.service.as_str())
        .bind(&key.external_id)
        .bind(&key.tenant)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM reelflow_idempotency WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}

#[derive(Debug, Clone)]
pub struct PgDeadLetterLog {
    pool: PgPool,
}

impl PgDeadLetterLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadLetterLog for PgDeadLetterLog {
    async fn append(&self, entry: DeadLetterEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reelflow_dead_letters (id, service, tenant, request, error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.service.as_str())
        .bind(&entry.tenant)
        .bind(serde_json::to_value(&entry.request)?)
        .bind(&entry.error)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, service: Option<ServiceKind>, limit: usize) -> Result<Vec<DeadLetterEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, service, tenant, request, error, created_at
            FROM reelflow_dead_letters
            WHERE ($1::VARCHAR IS NULL OR service = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(service.map(|s| s.as_str()))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<DeadLetterEntry> {
                let service: String = row.try_get("service")?;
                let request: RequestSnapshot = serde_json::from_value(row.try_get("request")?)?;
                Ok(DeadLetterEntry {
                    id: row.try_get("id")?,
                    service: service.parse().map_err(OrchestratorError::StoreError)?,
                    tenant: row.try_get("tenant")?,
                    request,
                    error: row.try_get("error")?,
                    timestamp: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
