//! # Durable Message Bus
//!
//! Queue-backed relay backend. `send` persists the envelope before returning,
//! so accepted messages survive a restart; delivery happens out of sweeps that
//! claim ready rows from the store. Retries are scheduled by rewriting the
//! row's `invoke_after` rather than sleeping in a task, which keeps backoff
//! state in the store alongside the envelope.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::channel::Channel;
use super::envelope::Envelope;
use super::errors::{ListenerError, MessagingResult};
use super::registry::ListenerRegistry;
use super::MessageBus;
use crate::store::{QueueRow, QueueStore};

pub struct DurableMessageBus<P, S> {
    listeners: Arc<ListenerRegistry<P>>,
    store: Arc<S>,
    workers: Arc<Semaphore>,
    max_delivery: i64,
}

impl<P, S> Clone for DurableMessageBus<P, S> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
            store: Arc::clone(&self.store),
            workers: Arc::clone(&self.workers),
            max_delivery: self.max_delivery,
        }
    }
}

impl<P, S> DurableMessageBus<P, S>
where
    P: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: QueueStore,
{
    pub fn new(
        listeners: Arc<ListenerRegistry<P>>,
        store: Arc<S>,
        worker_count: usize,
        max_delivery: i64,
    ) -> Self {
        Self {
            listeners,
            store,
            workers: Arc::new(Semaphore::new(worker_count.max(1))),
            max_delivery,
        }
    }

    /// Claim up to `max_delivery` ready rows and spawn a delivery attempt for
    /// each. Returns the number of rows claimed.
    pub async fn deliver_ready(&self) -> MessagingResult<usize> {
        let rows = self
            .store
            .find_ready(self.max_delivery, Utc::now())
            .await?;
        let count = rows.len();
        for row in rows {
            let bus = self.clone();
            tokio::spawn(async move { bus.deliver_row(row).await });
        }
        Ok(count)
    }

    /// Spawn the periodic sweep that picks up scheduled retries and rows
    /// accepted by other instances. The handle can be aborted on shutdown.
    pub fn spawn_poll_loop(&self, poll_interval: Duration) -> JoinHandle<()> {
        let bus = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = bus.deliver_ready().await {
                    error!(%err, "queue sweep failed");
                }
            }
        })
    }

    async fn deliver_row(self, row: QueueRow) {
        let envelope: Envelope<P> = match Envelope::from_json(row.message.clone()) {
            Ok(envelope) => envelope,
            Err(err) => {
                // A row we cannot deserialize would be re-claimed forever.
                error!(id = %row.id, %err, "corrupt queue row, deleting");
                if let Err(err) = self.store.delete(row.id).await {
                    error!(id = %row.id, %err, "failed to delete corrupt queue row");
                }
                return;
            }
        };

        match self.attempt(row.channel, &envelope).await {
            Ok(()) => {
                debug!(
                    trace_id = %envelope.trace_id,
                    channel = %row.channel,
                    "message delivered"
                );
                if let Err(err) = self.store.delete(row.id).await {
                    error!(id = %row.id, %err, "failed to delete delivered queue row");
                }
            }
            Err(error) => self.handle_failure(row.id, row.channel, envelope, error).await,
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

    async fn handle_failure(
        &self,
        id: Uuid,
        channel: Channel,
        mut envelope: Envelope<P>,
        error: ListenerError,
    ) {
        let fatal = matches!(error, ListenerError::NoListener { .. });
        if fatal || envelope.exhausted_by_next_failure() {
            self.finalize_dead_letter(id, channel, envelope, error).await;
            return;
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
        let invoke_after = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
        let json = match envelope.to_json() {
            Ok(json) => json,
            Err(err) => {
                error!(trace_id = %envelope.trace_id, %err, "failed to serialize envelope for retry");
                return;
            }
        };
        if let Err(err) = self.store.update(id, json, invoke_after).await {
            // The row stays claimed until its lease lapses; the sweep retries.
            error!(id = %id, %err, "failed to reschedule queue row");
        }
    }

    async fn finalize_dead_letter(
        &self,
        id: Uuid,
        channel: Channel,
        mut envelope: Envelope<P>,
        error: ListenerError,
    ) {
        if envelope.is_dead_lettered() || channel == Channel::DeadLetter {
            // one terminal transition only
            error!(
                trace_id = %envelope.trace_id,
                %error,
                "dead-letter delivery failed, dropping message"
            );
            if let Err(err) = self.store.delete(id).await {
                error!(id = %id, %err, "failed to delete dropped queue row");
            }
            return;
        }

        error!(
            trace_id = %envelope.trace_id,
            channel = %channel,
            %error,
            "retry budget exhausted, forwarding to dead-letter channel"
        );
        envelope.mark_dead_lettered(error);
        if let Err(err) = self.send(Channel::DeadLetter, envelope).await {
            // Keep the original row; the lease will lapse and the sweep will
            // reattempt the terminal transition.
            error!(id = %id, %err, "failed to enqueue dead-letter row");
            return;
        }
        if let Err(err) = self.store.delete(id).await {
            error!(id = %id, %err, "failed to delete dead-lettered queue row");
        }
    }
}

#[async_trait::async_trait]
impl<P, S> MessageBus<P> for DurableMessageBus<P, S>
where
    P: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    S: QueueStore,
{
    /// Persist the envelope, then kick an immediate sweep so a ready row is
    /// delivered without waiting for the next poll tick.
    async fn send(&self, channel: Channel, envelope: Envelope<P>) -> MessagingResult<()> {
        let json = envelope.to_json()?;
        let id = self.store.save(channel, json, Utc::now()).await?;
        debug!(
            trace_id = %envelope.trace_id,
            channel = %channel,
            id = %id,
            "message accepted"
        );
        let bus = self.clone();
        tokio::spawn(async move {
            if let Err(err) = bus.deliver_ready().await {
                error!(%err, "post-send sweep failed");
            }
        });
        Ok(())
    }
}
