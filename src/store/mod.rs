//! # Durable Queue Persistence
//!
//! The four-operation persistence contract behind the durable relay, with a
//! Postgres implementation for production and an in-memory one for tests and
//! persistence-less deployments.

pub mod memory;
pub mod queue;
pub mod sql;

pub use memory::InMemoryQueueStore;
pub use queue::{QueueRow, QueueStore, StoreError, StoreResult};
pub use sql::SqlQueueStore;
