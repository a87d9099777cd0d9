//! # Cross-Event Correlation
//!
//! Rendezvous primitives for joining two independently-arriving events on a
//! shared key: a per-key lock map and the exchange store built on top of it.

pub mod lock_map;
pub mod store;

pub use lock_map::LockMap;
pub use store::CorrelationStore;
