//! # Listener Registry
//!
//! Maps a channel to exactly one registered listener. Registering a second
//! listener for the same channel replaces the first; callers must not rely on
//! two listeners co-existing per channel.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::channel::Channel;
use super::envelope::Envelope;
use super::errors::{ListenerError, MessagingError, MessagingResult};

/// Contract implemented by channel consumers.
///
/// Delivery is at-least-once: the relay performs no deduplication, so
/// implementations must be idempotent or tolerant of redelivery. The envelope
/// handed in is the relay's copy; forwarding it onward is the listener's
/// responsibility.
#[async_trait::async_trait]
pub trait Listener<P>: Send + Sync {
    async fn process(&self, envelope: Envelope<P>) -> Result<(), ListenerError>;
}

pub struct ListenerRegistry<P> {
    listeners: DashMap<Channel, Arc<dyn Listener<P>>>,
}

impl<P> Default for ListenerRegistry<P> {
    fn default() -> Self {
        Self {
            listeners: DashMap::new(),
        }
    }
}

impl<P> ListenerRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for a channel, replacing any existing one.
    pub fn register(&self, channel: Channel, listener: Arc<dyn Listener<P>>) {
        if self.listeners.insert(channel, listener).is_some() {
            warn!(channel = %channel, "listener replaced; last registration wins");
        } else {
            debug!(channel = %channel, "listener registered");
        }
    }

    /// Remove the listener for a channel; subsequent resolves fail.
    pub fn unregister(&self, channel: Channel) {
        self.listeners.remove(&channel);
        debug!(channel = %channel, "listener unregistered");
    }

    /// Resolve the listener for a channel.
    ///
    /// A missing listener is a configuration error, not a transient one.
    pub fn resolve(&self, channel: Channel) -> MessagingResult<Arc<dyn Listener<P>>> {
        self.listeners
            .get(&channel)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(MessagingError::NoListener { channel })
    }

    /// Startup-time validation: every listed channel must have a listener
    /// before the relay starts accepting traffic.
    pub fn validate(&self, channels: &[Channel]) -> MessagingResult<()> {
        for &channel in channels {
            if !self.listeners.contains_key(&channel) {
                return Err(MessagingError::NoListener { channel });
            }
        }
        Ok(())
    }
}
