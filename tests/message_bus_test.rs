//! Delivery, retry, and dead-letter behavior of the volatile relay backend.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use cp_adapter_core::messaging::{
    Channel, Envelope, InMemoryMessageBus, Listener, ListenerError, ListenerRegistry, MessageBus,
};

/// Fails a configurable number of attempts before succeeding, recording when
/// each attempt ran.
struct FlakyListener {
    failures_before_success: u32,
    attempts: AtomicU32,
    attempt_times: parking_lot::Mutex<Vec<Instant>>,
    done: Notify,
}

impl FlakyListener {
    fn new(failures_before_success: u32) -> Arc<Self> {
        Arc::new(Self {
            failures_before_success,
            attempts: AtomicU32::new(0),
            attempt_times: parking_lot::Mutex::new(Vec::new()),
            done: Notify::new(),
        })
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Listener<String> for FlakyListener {
    async fn process(&self, _envelope: Envelope<String>) -> Result<(), ListenerError> {
        self.attempt_times.lock().push(Instant::now());
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures_before_success {
            Err(ListenerError::other("transient failure"))
        } else {
            self.done.notify_one();
            Ok(())
        }
    }
}

/// Captures dead-lettered envelopes and wakes the test when one arrives.
struct DeadLetterProbe {
    received: parking_lot::Mutex<Vec<Envelope<String>>>,
    notified: Notify,
}

impl DeadLetterProbe {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            received: parking_lot::Mutex::new(Vec::new()),
            notified: Notify::new(),
        })
    }
}

#[async_trait::async_trait]
impl Listener<String> for DeadLetterProbe {
    async fn process(&self, envelope: Envelope<String>) -> Result<(), ListenerError> {
        self.received.lock().push(envelope);
        self.notified.notify_one();
        Ok(())
    }
}

fn envelope(retry_limit: u32) -> Envelope<String> {
    Envelope::new("payload".to_string(), retry_limit)
}

#[tokio::test(start_paused = true)]
async fn test_delivers_on_first_attempt() {
    let registry = Arc::new(ListenerRegistry::new());
    let listener = FlakyListener::new(0);
    registry.register(Channel::Initial, listener.clone());
    let bus = InMemoryMessageBus::new(registry, 4);

    bus.send(Channel::Initial, envelope(3)).await.unwrap();

    tokio::time::timeout(Duration::from_secs(10), listener.done.notified())
        .await
        .unwrap();
    assert_eq!(listener.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retries_follow_backoff_schedule() {
    let registry = Arc::new(ListenerRegistry::new());
    let listener = FlakyListener::new(6);
    registry.register(Channel::Initial, listener.clone());
    let bus = InMemoryMessageBus::new(registry, 4);

    bus.send(Channel::Initial, envelope(10)).await.unwrap();

    tokio::time::timeout(Duration::from_secs(60), listener.done.notified())
        .await
        .unwrap();
    assert_eq!(listener.attempts(), 7);

    // gap after the n-th failure: n*750ms for n < 5, n^2*150ms from n = 5
    let times = listener.attempt_times.lock();
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        gaps,
        vec![
            Duration::from_millis(750),
            Duration::from_millis(1500),
            Duration::from_millis(2250),
            Duration::from_millis(3000),
            Duration::from_millis(3750),
            Duration::from_millis(5400),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_envelope_is_dead_lettered() {
    let registry = Arc::new(ListenerRegistry::new());
    let listener = FlakyListener::new(u32::MAX);
    let probe = DeadLetterProbe::new();
    registry.register(Channel::Initial, listener.clone());
    registry.register(Channel::DeadLetter, probe.clone());
    let bus = InMemoryMessageBus::new(registry, 4);

    bus.send(Channel::Initial, envelope(2)).await.unwrap();

    tokio::time::timeout(Duration::from_secs(60), probe.notified.notified())
        .await
        .unwrap();

    // retry_limit 2 allows the initial attempt plus two retries
    assert_eq!(listener.attempts(), 3);
    let received = probe.received.lock();
    assert_eq!(received.len(), 1);
    assert!(received[0].is_dead_lettered());
    assert_eq!(received[0].error_count, 0);
    assert!(received[0].last_error.is_none());
    assert_eq!(
        received[0].terminal_error,
        Some(ListenerError::other("transient failure"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_missing_listener_short_circuits_to_dead_letter() {
    let registry = Arc::new(ListenerRegistry::new());
    let probe = DeadLetterProbe::new();
    registry.register(Channel::DeadLetter, probe.clone());
    let bus = InMemoryMessageBus::new(registry, 4);

    // generous retry budget must not delay the configuration error
    bus.send(Channel::Result, envelope(100)).await.unwrap();

    tokio::time::timeout(Duration::from_millis(10), probe.notified.notified())
        .await
        .unwrap();

    let received = probe.received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(
        received[0].terminal_error,
        Some(ListenerError::NoListener {
            channel: Channel::Result
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_failing_dead_letter_listener_does_not_loop() {
    let registry = Arc::new(ListenerRegistry::new());
    let listener = FlakyListener::new(u32::MAX);
    let dlq_listener = FlakyListener::new(u32::MAX);
    registry.register(Channel::Initial, listener.clone());
    registry.register(Channel::DeadLetter, dlq_listener.clone());
    let bus = InMemoryMessageBus::new(registry, 4);

    bus.send(Channel::Initial, envelope(1)).await.unwrap();

    // long after every retry budget is spent, both listeners have gone quiet
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(listener.attempts(), 2);
    assert_eq!(dlq_listener.attempts(), 2);

    let before = dlq_listener.attempts();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(dlq_listener.attempts(), before);
}

#[tokio::test(start_paused = true)]
async fn test_send_does_not_block_on_listener() {
    struct SlowListener {
        started: Notify,
    }

    #[async_trait::async_trait]
    impl Listener<String> for SlowListener {
        async fn process(&self, _envelope: Envelope<String>) -> Result<(), ListenerError> {
            self.started.notify_one();
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    let registry = Arc::new(ListenerRegistry::new());
    let listener = Arc::new(SlowListener {
        started: Notify::new(),
    });
    registry.register(Channel::Initial, listener.clone());
    let bus = InMemoryMessageBus::new(registry, 4);

    let sent_at = Instant::now();
    bus.send(Channel::Initial, envelope(3)).await.unwrap();
    assert_eq!(Instant::now(), sent_at);

    tokio::time::timeout(Duration::from_secs(1), listener.started.notified())
        .await
        .unwrap();
}
