//! # Message Envelope
//!
//! The retry-aware wrapper around a channel payload: a trace id for logging
//! and correlation of log lines (not used for matching), the payload itself,
//! and the retry bookkeeping the relay maintains across delivery attempts.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::errors::ListenerError;

/// Backoff delay after the `error_count`-th consecutive failure (1-based).
///
/// Linear for the first four failures, quadratic afterwards:
/// `n * 750ms` for `n < 5`, `n^2 * 150ms` for `n >= 5`.
pub fn sending_delay(error_count: u32) -> Duration {
    let n = u64::from(error_count);
    if error_count < 5 {
        Duration::from_millis(n * 750)
    } else {
        Duration::from_millis(n * n * 150)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<P> {
    /// Caller-supplied or generated identifier for tracing; never matched on.
    pub trace_id: String,
    /// Opaque to the relay; channel listeners interpret it.
    pub payload: P,
    /// Consecutive failed delivery attempts since the last success.
    pub error_count: u32,
    /// Maximum `error_count` before the envelope is dead-lettered.
    pub retry_limit: u32,
    /// Most recent transient failure; cleared on success.
    pub last_error: Option<ListenerError>,
    /// Final cause, set exactly once when the envelope is dead-lettered.
    pub terminal_error: Option<ListenerError>,
}

impl<P> Envelope<P> {
    /// Create a new envelope with a generated trace id.
    pub fn new(payload: P, retry_limit: u32) -> Self {
        Self::with_trace_id(Uuid::new_v4().to_string(), payload, retry_limit)
    }

    /// Create a new envelope with an explicit trace id.
    pub fn with_trace_id(trace_id: impl Into<String>, payload: P, retry_limit: u32) -> Self {
        Self {
            trace_id: trace_id.into(),
            payload,
            error_count: 0,
            retry_limit,
            last_error: None,
            terminal_error: None,
        }
    }

    /// True when one more failure would exceed the retry budget.
    pub fn exhausted_by_next_failure(&self) -> bool {
        self.error_count + 1 > self.retry_limit
    }

    /// Record a transient delivery failure.
    pub fn record_failure(&mut self, error: ListenerError) {
        self.error_count += 1;
        self.last_error = Some(error);
    }

    /// Record a successful delivery, resetting the retry bookkeeping.
    pub fn record_success(&mut self) {
        self.error_count = 0;
        self.last_error = None;
    }

    /// Finalize the envelope for dead-letter routing.
    ///
    /// The transient error is cleared and the retry budget reset so the
    /// dead-letter listener gets its own delivery attempts; the terminal
    /// error is set at most once.
    pub fn mark_dead_lettered(&mut self, error: ListenerError) {
        self.error_count = 0;
        self.last_error = None;
        if self.terminal_error.is_none() {
            self.terminal_error = Some(error);
        }
    }

    /// True once the envelope has been routed to the dead-letter channel.
    pub fn is_dead_lettered(&self) -> bool {
        self.terminal_error.is_some()
    }

    /// Backoff delay for the current error count.
    pub fn sending_delay(&self) -> Duration {
        sending_delay(self.error_count)
    }
}

impl<P: Serialize> Envelope<P> {
    /// Convert to JSON for queue storage
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl<P: DeserializeOwned> Envelope<P> {
    /// Create from JSON read back from the queue
    pub fn from_json(json: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sending_delay_formula() {
        assert_eq!(sending_delay(1), Duration::from_millis(750));
        assert_eq!(sending_delay(2), Duration::from_millis(1500));
        assert_eq!(sending_delay(3), Duration::from_millis(2250));
        assert_eq!(sending_delay(4), Duration::from_millis(3000));
        // quadratic branch is continuous at the switch point
        assert_eq!(sending_delay(5), Duration::from_millis(3750));
        assert_eq!(sending_delay(6), Duration::from_millis(5400));
        assert_eq!(sending_delay(10), Duration::from_millis(15000));
    }

    #[test]
    fn test_failure_and_success_transitions() {
        let mut envelope = Envelope::new("payload", 3);
        assert_eq!(envelope.error_count, 0);
        assert!(!envelope.exhausted_by_next_failure());

        envelope.record_failure(ListenerError::other("boom"));
        assert_eq!(envelope.error_count, 1);
        assert!(envelope.last_error.is_some());

        envelope.record_success();
        assert_eq!(envelope.error_count, 0);
        assert!(envelope.last_error.is_none());
    }

    #[test]
    fn test_exhaustion_boundary() {
        let mut envelope = Envelope::new((), 2);
        envelope.record_failure(ListenerError::other("1"));
        assert!(!envelope.exhausted_by_next_failure());
        envelope.record_failure(ListenerError::other("2"));
        // error_count == retry_limit: the next failure would exceed the budget
        assert!(envelope.exhausted_by_next_failure());
    }

    #[test]
    fn test_dead_letter_is_terminal_and_set_once() {
        let mut envelope = Envelope::new((), 1);
        envelope.record_failure(ListenerError::other("transient"));
        envelope.mark_dead_lettered(ListenerError::other("final"));

        assert_eq!(envelope.error_count, 0);
        assert!(envelope.last_error.is_none());
        assert_eq!(
            envelope.terminal_error,
            Some(ListenerError::other("final"))
        );

        envelope.mark_dead_lettered(ListenerError::other("second final"));
        assert_eq!(
            envelope.terminal_error,
            Some(ListenerError::other("final"))
        );
    }

    #[test]
    fn test_json_round_trip() {
        let mut envelope = Envelope::new(serde_json::json!({"asset": "a1"}), 3);
        envelope.record_failure(ListenerError::other("transient"));

        let json = envelope.to_json().unwrap();
        let back: Envelope<serde_json::Value> = Envelope::from_json(json).unwrap();

        assert_eq!(back.trace_id, envelope.trace_id);
        assert_eq!(back.error_count, 1);
        assert_eq!(back.retry_limit, 3);
        assert_eq!(back.last_error, envelope.last_error);
    }
}
