//! # Queue Store Contract
//!
//! One row per pending envelope. Rows are created on `send`, rescheduled with
//! a new `invoke_after` on failed delivery, and deleted on success or once the
//! envelope moves to the dead-letter channel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::messaging::Channel;

/// One pending envelope awaiting (re)delivery.
#[derive(Debug, Clone)]
pub struct QueueRow {
    pub id: Uuid,
    pub channel: Channel,
    /// Serialized envelope, opaque to the store.
    pub message: Value,
    /// Earliest time the row is eligible for (re)delivery.
    pub invoke_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database query error: {operation}: {message}")]
    DatabaseQuery { operation: String, message: String },

    #[error("queue row not found: {id}")]
    RowNotFound { id: Uuid },

    #[error("queue row corrupt: {message}")]
    RowCorrupt { message: String },
}

impl StoreError {
    /// Create a database query error
    pub fn database_query(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DatabaseQuery {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a corrupt row error
    pub fn row_corrupt(message: impl Into<String>) -> Self {
        Self::RowCorrupt {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::database_query("queue", err.to_string())
    }
}

/// Result type alias for queue store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence adapter used by the durable relay.
///
/// `find_ready` must claim the rows it returns: when several relay instances
/// poll the same store concurrently, a row may be handed to at most one of
/// them until its claim lapses or is released by `update`/`delete`.
#[async_trait]
pub trait QueueStore: Send + Sync + 'static {
    /// Insert a new row; returns the generated id.
    async fn save(
        &self,
        channel: Channel,
        message: Value,
        invoke_after: DateTime<Utc>,
    ) -> StoreResult<Uuid>;

    /// Claim and return up to `max` rows with `invoke_after <= now`.
    async fn find_ready(&self, max: i64, now: DateTime<Utc>) -> StoreResult<Vec<QueueRow>>;

    /// Replace a row's message and reschedule it, releasing any claim.
    async fn update(&self, id: Uuid, message: Value, invoke_after: DateTime<Utc>)
        -> StoreResult<()>;

    /// Delete a row. Deleting an already-deleted row is not an error.
    async fn delete(&self, id: Uuid) -> StoreResult<()>;
}
