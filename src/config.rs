//! # Adapter Configuration
//!
//! Environment-driven configuration with sensible defaults for the relay and
//! the correlated workflow services.

use crate::error::{AdapterError, Result};

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Retry budget attached to new envelopes.
    pub default_retry_limit: u32,
    /// Concurrent delivery tasks for the in-memory bus.
    pub in_memory_worker_count: usize,
    /// Concurrent delivery tasks for the durable bus.
    pub durable_worker_count: usize,
    /// Upper bound on rows picked up per delivery sweep.
    pub max_delivery_batch: i64,
    /// Interval between periodic delivery sweeps of the durable queue.
    pub delivery_poll_interval_secs: u64,
    /// How long a claimed queue row stays invisible to other relay instances.
    pub queue_lease_secs: i64,
    /// Default wait for synchronous result pulls.
    pub default_sync_timeout_secs: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            default_retry_limit: 3,
            in_memory_worker_count: 10,
            durable_worker_count: 10,
            max_delivery_batch: 10,
            delivery_poll_interval_secs: 1,
            queue_lease_secs: 60,
            default_sync_timeout_secs: 20,
        }
    }
}

impl AdapterConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(retry_limit) = std::env::var("CP_ADAPTER_RETRY_LIMIT") {
            config.default_retry_limit = retry_limit.parse().map_err(|e| {
                AdapterError::configuration(format!("Invalid default_retry_limit: {e}"))
            })?;
        }

        if let Ok(workers) = std::env::var("CP_ADAPTER_IN_MEMORY_WORKERS") {
            config.in_memory_worker_count = workers.parse().map_err(|e| {
                AdapterError::configuration(format!("Invalid in_memory_worker_count: {e}"))
            })?;
        }

        if let Ok(workers) = std::env::var("CP_ADAPTER_DURABLE_WORKERS") {
            config.durable_worker_count = workers.parse().map_err(|e| {
                AdapterError::configuration(format!("Invalid durable_worker_count: {e}"))
            })?;
        }

        if let Ok(batch) = std::env::var("CP_ADAPTER_MAX_DELIVERY_BATCH") {
            config.max_delivery_batch = batch.parse().map_err(|e| {
                AdapterError::configuration(format!("Invalid max_delivery_batch: {e}"))
            })?;
        }

        if let Ok(interval) = std::env::var("CP_ADAPTER_DELIVERY_POLL_INTERVAL_SECS") {
            config.delivery_poll_interval_secs = interval.parse().map_err(|e| {
                AdapterError::configuration(format!("Invalid delivery_poll_interval_secs: {e}"))
            })?;
        }

        if let Ok(lease) = std::env::var("CP_ADAPTER_QUEUE_LEASE_SECS") {
            config.queue_lease_secs = lease.parse().map_err(|e| {
                AdapterError::configuration(format!("Invalid queue_lease_secs: {e}"))
            })?;
        }

        if let Ok(timeout) = std::env::var("CP_ADAPTER_SYNC_TIMEOUT_SECS") {
            config.default_sync_timeout_secs = timeout.parse().map_err(|e| {
                AdapterError::configuration(format!("Invalid default_sync_timeout_secs: {e}"))
            })?;
        }

        Ok(config)
    }
}
