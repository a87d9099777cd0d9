//! # Message Relay
//!
//! Envelopes, channels, the listener registry, and the two relay backends:
//! volatile in-process delivery and durable queue-backed delivery.

pub mod channel;
pub mod durable;
pub mod envelope;
pub mod errors;
pub mod in_memory;
pub mod registry;

pub use channel::Channel;
pub use durable::DurableMessageBus;
pub use envelope::{sending_delay, Envelope};
pub use errors::{ListenerError, MessagingError, MessagingResult};
pub use in_memory::InMemoryMessageBus;
pub use registry::{Listener, ListenerRegistry};

/// Fire-and-forget relay contract shared by both backends.
///
/// `send` enqueues delivery and returns without waiting for the listener to
/// run; the caller is never blocked on handler execution. Failed deliveries
/// are retried with backoff and eventually routed to
/// [`Channel::DeadLetter`] once the envelope's retry budget is exhausted.
#[async_trait::async_trait]
pub trait MessageBus<P>: Send + Sync {
    async fn send(&self, channel: Channel, envelope: Envelope<P>) -> MessagingResult<()>;
}
