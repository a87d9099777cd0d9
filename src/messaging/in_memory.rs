//! # In-Memory Message Bus
//!
//! Volatile relay backend: deliveries are scheduled in-process on a bounded
//! worker pool and retries sleep inside their delivery task. Nothing survives
//! a restart; in-flight envelopes and scheduled retries are lost on crash.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use super::channel::Channel;
use super::envelope::Envelope;
use super::errors::{ListenerError, MessagingResult};
use super::registry::ListenerRegistry;
use super::MessageBus;

pub struct InMemoryMessageBus<P> {
    listeners: Arc<ListenerRegistry<P>>,
    workers: Arc<Semaphore>,
}

impl<P> Clone for InMemoryMessageBus<P> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
            workers: Arc::clone(&self.workers),
        }
    }
}

impl<P> InMemoryMessageBus<P>
where
    P: Clone + Send + Sync + 'static,
{
    pub fn new(listeners: Arc<ListenerRegistry<P>>, worker_count: usize) -> Self {
        Self {
            listeners,
            workers: Arc::new(Semaphore::new(worker_count.max(1))),
        }
    }

    /// Drive one envelope to completion: deliver, retry with backoff, and
    /// finally dead-letter. Runs inside its own task; the retry sleep holds no
    /// worker permit.
    async fn deliver(self, mut channel: Channel, mut envelope: Envelope<P>) {
        loop {
            match self.attempt(channel, &envelope).await {
                Ok(()) => {
                    envelope.record_success();
                    debug!(
                        trace_id = %envelope.trace_id,
                        channel = %channel,
                        "message delivered"
                    );
                    return;
                }
                Err(error) => {
                    let fatal = matches!(error, ListenerError::NoListener { .. });
                    if fatal || envelope.exhausted_by_next_failure() {
                        if envelope.is_dead_lettered() || channel == Channel::DeadLetter {
                            // bounded recursion: one terminal transition only
                            error!(
                                trace_id = %envelope.trace_id,
                                %error,
                                "dead-letter delivery failed, dropping message"
                            );
                            return;
                        }
                        error!(
                            trace_id = %envelope.trace_id,
                            channel = %channel,
                            %error,
                            "retry budget exhausted, forwarding to dead-letter channel"
                        );
                        envelope.mark_dead_lettered(error);
                        channel = Channel::DeadLetter;
                        continue;
                    }

                    envelope.record_failure(error);
                    let delay = envelope.sending_delay();
                    warn!(
                        trace_id = %envelope.trace_id,
                        channel = %channel,
                        error_count = envelope.error_count,
                        delay_ms = delay.as_millis() as u64,
                        "delivery failed, retry scheduled"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(&self, channel: Channel, envelope: &Envelope<P>) -> Result<(), ListenerError> {
        let listener = self
            .listeners
            .resolve(channel)
            .map_err(|_| ListenerError::NoListener { channel })?;
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| ListenerError::other("worker pool closed"))?;
        listener.process(envelope.clone()).await
    }
}

#[async_trait::async_trait]
impl<P> MessageBus<P> for InMemoryMessageBus<P>
where
    P: Clone + Send + Sync + 'static,
{
    async fn send(&self, channel: Channel, envelope: Envelope<P>) -> MessagingResult<()> {
        debug!(
            trace_id = %envelope.trace_id,
            channel = %channel,
            "message accepted"
        );
        let bus = self.clone();
        tokio::spawn(async move { bus.deliver(channel, envelope).await });
        Ok(())
    }
}
