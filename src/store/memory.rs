//! # In-Memory Queue Store
//!
//! Mutex-guarded map implementation of the queue contract, used when no
//! persistent layer is configured and by tests. Claims are tracked with an
//! in-process lease map; a lease that lapses makes its row eligible again,
//! so a delivery task that dies mid-flight cannot strand a row. This store
//! does not coordinate across processes.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use super::queue::{QueueRow, QueueStore, StoreError, StoreResult};
use crate::messaging::Channel;

#[derive(Default)]
struct Inner {
    rows: HashMap<Uuid, QueueRow>,
    /// Claim deadline per row; absent or past deadlines count as unclaimed.
    leases: HashMap<Uuid, DateTime<Utc>>,
}

pub struct InMemoryQueueStore {
    inner: Mutex<Inner>,
    lease_seconds: i64,
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            lease_seconds: 60,
        }
    }
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the lease duration granted by `find_ready`.
    pub fn with_lease_seconds(mut self, lease_seconds: i64) -> Self {
        self.lease_seconds = lease_seconds;
        self
    }

    /// Snapshot of all pending rows, leased or not. Inspection helper.
    pub fn rows(&self) -> Vec<QueueRow> {
        self.inner.lock().rows.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().rows.is_empty()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn save(
        &self,
        channel: Channel,
        message: Value,
        invoke_after: DateTime<Utc>,
    ) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        let row = QueueRow {
            id,
            channel,
            message,
            invoke_after,
            created_at: Utc::now(),
        };
        self.inner.lock().rows.insert(id, row);
        Ok(id)
    }

    async fn find_ready(&self, max: i64, now: DateTime<Utc>) -> StoreResult<Vec<QueueRow>> {
        let mut inner = self.inner.lock();
        let mut ready: Vec<QueueRow> = inner
            .rows
            .values()
            .filter(|row| {
                row.invoke_after <= now
                    && !matches!(inner.leases.get(&row.id), Some(deadline) if *deadline > now)
            })
            .cloned()
            .collect();
        ready.sort_by_key(|row| row.invoke_after);
        ready.truncate(max.max(0) as usize);
        let deadline = now + Duration::seconds(self.lease_seconds);
        for row in &ready {
            inner.leases.insert(row.id, deadline);
        }
        Ok(ready)
    }

    async fn update(
        &self,
        id: Uuid,
        message: Value,
        invoke_after: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let row = inner
            .rows
            .get_mut(&id)
            .ok_or(StoreError::RowNotFound { id })?;
        row.message = message;
        row.invoke_after = invoke_after;
        inner.leases.remove(&id);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.rows.remove(&id);
        inner.leases.remove(&id);
        Ok(())
    }
}
