//! # Result Service
//!
//! Bridges the asynchronous relay back to synchronous callers. A caller that
//! wants to block on an asset request parks a oneshot sender under the
//! request's trace id; the result-channel listener exchanges the arriving
//! process state against it. Arrival order does not matter: a result landing
//! before anyone asked for it waits in the store until pulled.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::correlation::CorrelationStore;
use crate::messaging::{Envelope, Listener, ListenerError};
use crate::process::ProcessData;

#[derive(thiserror::Error, Debug)]
pub enum ResultError {
    #[error("no result arrived for trace id {trace_id} within {timeout:?}")]
    Timeout { trace_id: String, timeout: Duration },
}

pub struct ResultService {
    rendezvous: CorrelationStore<oneshot::Sender<ProcessData>, ProcessData>,
    default_timeout: Duration,
}

impl ResultService {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            rendezvous: CorrelationStore::new(),
            default_timeout,
        }
    }

    /// Wait for the result of the request identified by `trace_id`, using the
    /// service's default timeout.
    pub async fn pull(&self, trace_id: &str) -> Result<ProcessData, ResultError> {
        self.pull_with_timeout(trace_id, self.default_timeout).await
    }

    /// Wait for the result of the request identified by `trace_id`.
    ///
    /// Returns immediately when the result already arrived; otherwise parks
    /// until the result lands or `timeout` expires. On timeout only this
    /// waiter's own sender is withdrawn, so a result that landed during the
    /// wait is kept for a later pull instead of being deleted with it.
    pub async fn pull_with_timeout(
        &self,
        trace_id: &str,
        timeout: Duration,
    ) -> Result<ProcessData, ResultError> {
        let (tx, mut rx) = oneshot::channel();
        if let Some((_, data)) = self.rendezvous.exchange_left(trace_id, tx).await {
            debug!(trace_id, "result already present");
            self.rendezvous.remove(trace_id).await;
            return Ok(data);
        }

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(data)) => {
                self.rendezvous.remove(trace_id).await;
                Ok(data)
            }
            // the sender half only drops when the waiter entry was displaced
            Ok(Err(_)) => {
                warn!(trace_id, ?timeout, "result pull timed out");
                Err(ResultError::Timeout {
                    trace_id: trace_id.to_string(),
                    timeout,
                })
            }
            Err(_) => {
                // Withdraw only this waiter's sender. If the listener already
                // claimed it, the result is in flight: the send cannot fail
                // while this receiver is alive, so collect it instead of
                // reporting a timeout.
                if self.rendezvous.take_left(trace_id).await.is_none() {
                    if let Ok(data) = rx.await {
                        self.rendezvous.remove(trace_id).await;
                        return Ok(data);
                    }
                }
                warn!(trace_id, ?timeout, "result pull timed out");
                Err(ResultError::Timeout {
                    trace_id: trace_id.to_string(),
                    timeout,
                })
            }
        }
    }
}

#[async_trait]
impl Listener<ProcessData> for ResultService {
    async fn process(&self, envelope: Envelope<ProcessData>) -> Result<(), ListenerError> {
        let trace_id = envelope.trace_id.clone();
        match self
            .rendezvous
            .exchange_right(&trace_id, envelope.payload)
            .await
        {
            None => {
                debug!(trace_id, "result stored, no waiter yet");
                Ok(())
            }
            Some((sender, data)) => {
                if let Err(data) = sender.send(data) {
                    // waiter gave up between the match and the send
                    warn!(trace_id, "result waiter gone, restoring result");
                    self.rendezvous.exchange_right(&trace_id, data).await;
                    return Ok(());
                }
                Ok(())
            }
        }
    }
}
