//! # Control Plane Adapter Core
//!
//! Reliable asynchronous message relay with cross-event correlation for a
//! dataspace control-plane adapter.
//!
//! ## Overview
//!
//! The adapter turns a synchronous "get me this asset" request into a chain of
//! asynchronous steps (contract negotiation, transfer initiation, data
//! reference retrieval). Two pieces make that chain dependable:
//!
//! - a **message relay** that delivers envelopes to named channels with
//!   at-least-once semantics, exponential backoff on listener failure, and
//!   dead-letter routing once the retry budget is exhausted;
//! - a **correlation store** that joins two independently-arriving events
//!   (a request and its asynchronous counterpart) exactly once, regardless of
//!   arrival order.
//!
//! ## Module Organization
//!
//! - [`messaging`] - envelopes, channels, listener registry, and the two relay
//!   backends (volatile in-memory and durable queue-backed)
//! - [`store`] - the durable queue persistence contract with Postgres and
//!   in-memory implementations
//! - [`correlation`] - the per-key lock map and the generic rendezvous store
//! - [`process`] - the contract-confirmation and data-reference joins built on
//!   top of the relay and the correlation store
//! - [`service`] - the result sink for synchronous callers and the dead-letter
//!   monitor
//! - [`config`] / [`logging`] / [`error`] - runtime configuration, structured
//!   logging, and crate-wide error handling
//!
//! ## Delivery Semantics
//!
//! Delivery is at-least-once; listeners are expected to be idempotent. There
//! is no ordering guarantee across channels or across correlation keys. For a
//! single correlation key the rendezvous is strictly ordered: the first caller
//! stores its half, the second retrieves the pair and drives completion.

pub mod config;
pub mod correlation;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod process;
pub mod service;
pub mod store;

pub use config::AdapterConfig;
pub use correlation::{CorrelationStore, LockMap};
pub use error::{AdapterError, Result};
pub use messaging::{
    Channel, DurableMessageBus, Envelope, InMemoryMessageBus, Listener, ListenerError,
    ListenerRegistry, MessageBus, MessagingError, MessagingResult,
};
pub use process::{
    ContractInfo, ContractNotificationHandler, ContractState, DataReference, DataReferenceHandler,
    DataTransferInitializer, ProcessData, TransferInitiator, TransferRequest,
};
pub use service::{DeadLetterMonitor, ResultService};
pub use store::{InMemoryQueueStore, QueueRow, QueueStore, SqlQueueStore, StoreError, StoreResult};
