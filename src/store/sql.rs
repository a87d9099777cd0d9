//! # Postgres Queue Store
//!
//! sqlx-backed implementation of the queue contract. `find_ready` claims rows
//! with `FOR UPDATE SKIP LOCKED` plus a lease column, so several relay
//! instances can poll the same table without double-delivering a row.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use super::queue::{QueueRow, QueueStore, StoreError, StoreResult};
use crate::messaging::Channel;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS edc_adapter_queue (
    id UUID PRIMARY KEY,
    channel TEXT NOT NULL,
    message JSONB NOT NULL,
    invoke_after TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    leased_by TEXT,
    lease_expires_at TIMESTAMPTZ
)
"#;

const CREATE_READY_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS edc_adapter_queue_ready_idx
    ON edc_adapter_queue (invoke_after)
"#;

pub struct SqlQueueStore {
    pool: PgPool,
    /// Lease owner recorded on claimed rows, typically the connector id.
    owner: String,
    lease_seconds: i64,
}

impl SqlQueueStore {
    pub fn new(pool: PgPool, owner: impl Into<String>) -> Self {
        Self {
            pool,
            owner: owner.into(),
            lease_seconds: 60,
        }
    }

    /// Override the lease duration; a crashed worker's rows become eligible
    /// again once the lease lapses.
    pub fn with_lease_seconds(mut self, lease_seconds: i64) -> Self {
        self.lease_seconds = lease_seconds;
        self
    }

    /// Create the queue table and index if missing.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_READY_INDEX).execute(&self.pool).await?;
        Ok(())
    }
}

fn map_row(row: &PgRow) -> StoreResult<QueueRow> {
    let channel_str: String = row.try_get("channel")?;
    let channel = Channel::from_str(&channel_str)
        .map_err(|e| StoreError::row_corrupt(e.to_string()))?;
    Ok(QueueRow {
        id: row.try_get("id")?,
        channel,
        message: row.try_get("message")?,
        invoke_after: row.try_get("invoke_after")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl QueueStore for SqlQueueStore {
    async fn save(
        &self,
        channel: Channel,
        message: Value,
        invoke_after: DateTime<Utc>,
    ) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO edc_adapter_queue (id, channel, message, invoke_after) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(channel.as_str())
        .bind(&message)
        .bind(invoke_after)
        .execute(&self.pool)
        .await?;

        debug!(id = %id, channel = %channel, "queue row saved");
        Ok(id)
    }

    async fn find_ready(&self, max: i64, now: DateTime<Utc>) -> StoreResult<Vec<QueueRow>> {
        let lease_expires_at = now + Duration::seconds(self.lease_seconds);
        let rows = sqlx::query(
            r#"
            UPDATE edc_adapter_queue
            SET leased_by = $1, lease_expires_at = $2
            WHERE id IN (
                SELECT id FROM edc_adapter_queue
                WHERE invoke_after <= $3
                  AND (leased_by IS NULL OR lease_expires_at <= $3)
                ORDER BY invoke_after
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, channel, message, invoke_after, created_at
            "#,
        )
        .bind(&self.owner)
        .bind(lease_expires_at)
        .bind(now)
        .bind(max)
        .fetch_all(&self.pool)
        .await?;

        let claimed = rows
            .iter()
            .map(map_row)
            .collect::<StoreResult<Vec<QueueRow>>>()?;
        debug!(count = claimed.len(), "queue rows claimed for delivery");
        Ok(claimed)
    }

    async fn update(
        &self,
        id: Uuid,
        message: Value,
        invoke_after: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE edc_adapter_queue \
             SET message = $1, invoke_after = $2, leased_by = NULL, lease_expires_at = NULL \
             WHERE id = $3",
        )
        .bind(&message)
        .bind(invoke_after)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound { id });
        }
        debug!(id = %id, invoke_after = %invoke_after, "queue row rescheduled");
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM edc_adapter_queue WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        debug!(id = %id, "queue row deleted");
        Ok(())
    }
}
