//! # Dead-Letter Monitor
//!
//! Terminal listener for envelopes the relay gave up on. Every dead letter is
//! logged with its terminal error; the most recent ones are retained in a
//! bounded ring for inspection by operators or tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::error;

use crate::messaging::{Envelope, Listener, ListenerError};

/// One envelope the relay could not deliver.
#[derive(Debug, Clone)]
pub struct DeadLetter<P> {
    pub trace_id: String,
    pub payload: P,
    pub terminal_error: Option<ListenerError>,
}

pub struct DeadLetterMonitor<P> {
    recent: Mutex<VecDeque<DeadLetter<P>>>,
    capacity: usize,
}

impl<P> DeadLetterMonitor<P> {
    pub fn new(capacity: usize) -> Self {
        Self {
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Most recent dead letters, oldest first.
    pub fn recent(&self) -> Vec<DeadLetter<P>>
    where
        P: Clone,
    {
        self.recent.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.recent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.lock().is_empty()
    }
}

#[async_trait]
impl<P> Listener<P> for DeadLetterMonitor<P>
where
    P: Clone + Send + Sync + 'static,
{
    async fn process(&self, envelope: Envelope<P>) -> Result<(), ListenerError> {
        error!(
            trace_id = %envelope.trace_id,
            terminal_error = ?envelope.terminal_error,
            "message dead-lettered"
        );
        let mut recent = self.recent.lock();
        if recent.len() == self.capacity {
            recent.pop_front();
        }
        recent.push_back(DeadLetter {
            trace_id: envelope.trace_id,
            payload: envelope.payload,
            terminal_error: envelope.terminal_error,
        });
        Ok(())
    }
}
