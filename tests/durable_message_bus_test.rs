//! Persistence-backed delivery: rows survive until delivered, failed attempts
//! are rescheduled through the store, and exhausted envelopes move to a
//! dead-letter row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_test::assert_err;
use uuid::Uuid;

use cp_adapter_core::messaging::{
    Channel, DurableMessageBus, Envelope, Listener, ListenerError, ListenerRegistry, MessageBus,
};
use cp_adapter_core::store::{InMemoryQueueStore, QueueStore, StoreError, StoreResult};

struct CountingListener {
    failures_before_success: u32,
    attempts: AtomicU32,
    done: Notify,
}

impl CountingListener {
    fn new(failures_before_success: u32) -> Arc<Self> {
        Arc::new(Self {
            failures_before_success,
            attempts: AtomicU32::new(0),
            done: Notify::new(),
        })
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Listener<String> for CountingListener {
    async fn process(&self, _envelope: Envelope<String>) -> Result<(), ListenerError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures_before_success {
            Err(ListenerError::other("transient failure"))
        } else {
            self.done.notify_one();
            Ok(())
        }
    }
}

fn bus_with(
    store: Arc<InMemoryQueueStore>,
    registry: Arc<ListenerRegistry<String>>,
) -> DurableMessageBus<String, InMemoryQueueStore> {
    DurableMessageBus::new(registry, store, 4, 10)
}

async fn wait_until_empty(store: &InMemoryQueueStore) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !store.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("store did not drain in time");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_successful_delivery_deletes_the_row() {
    let store = Arc::new(InMemoryQueueStore::new());
    let registry = Arc::new(ListenerRegistry::new());
    let listener = CountingListener::new(0);
    registry.register(Channel::Initial, listener.clone());
    let bus = bus_with(store.clone(), registry);

    bus.send(Channel::Initial, Envelope::new("payload".to_string(), 3))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), listener.done.notified())
        .await
        .unwrap();
    wait_until_empty(&store).await;
    assert_eq!(listener.attempts(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_persisted_row_survives_a_restart() {
    let store = Arc::new(InMemoryQueueStore::new());

    // rows written by a previous incarnation wait in the store
    let envelope = Envelope::new("payload".to_string(), 3);
    store
        .save(Channel::Initial, envelope.to_json().unwrap(), Utc::now())
        .await
        .unwrap();

    // a fresh bus picks them up on its first sweep
    let registry = Arc::new(ListenerRegistry::new());
    let listener = CountingListener::new(0);
    registry.register(Channel::Initial, listener.clone());
    let bus = bus_with(store.clone(), registry);

    assert_eq!(bus.deliver_ready().await.unwrap(), 1);
    tokio::time::timeout(Duration::from_secs(5), listener.done.notified())
        .await
        .unwrap();
    wait_until_empty(&store).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_delivery_is_rescheduled_in_the_store() {
    let store = Arc::new(InMemoryQueueStore::new());
    let registry = Arc::new(ListenerRegistry::new());
    let listener = CountingListener::new(1);
    registry.register(Channel::Initial, listener.clone());
    let bus = bus_with(store.clone(), registry);

    let sent_at = Utc::now();
    bus.send(Channel::Initial, Envelope::new("payload".to_string(), 3))
        .await
        .unwrap();

    // first attempt fails; the row is pushed into the future with the failure
    // recorded in the stored envelope
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let rows = store.rows();
            if let Some(row) = rows.first() {
                let stored: Envelope<String> = Envelope::from_json(row.message.clone()).unwrap();
                if stored.error_count == 1 {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("row was not rescheduled");

    let rows = store.rows();
    let stored: Envelope<String> = Envelope::from_json(rows[0].message.clone()).unwrap();
    assert_eq!(stored.error_count, 1);
    assert!(stored.last_error.is_some());
    assert!(rows[0].invoke_after >= sent_at + chrono::Duration::milliseconds(750));

    // once the backoff elapses, a sweep completes the delivery
    tokio::time::sleep(Duration::from_millis(800)).await;
    bus.deliver_ready().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), listener.done.notified())
        .await
        .unwrap();
    wait_until_empty(&store).await;
    assert_eq!(listener.attempts(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_exhaustion_moves_the_row_to_dead_letter() {
    let store = Arc::new(InMemoryQueueStore::new());
    let registry = Arc::new(ListenerRegistry::new());
    let listener = CountingListener::new(u32::MAX);
    let dlq = CountingListener::new(0);
    registry.register(Channel::Initial, listener.clone());
    registry.register(Channel::DeadLetter, dlq.clone());
    let bus = bus_with(store.clone(), registry);

    // zero retry budget: the first failure is terminal
    bus.send(Channel::Initial, Envelope::new("payload".to_string(), 0))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), dlq.done.notified())
        .await
        .unwrap();
    wait_until_empty(&store).await;
    assert_eq!(listener.attempts(), 1);
    assert_eq!(dlq.attempts(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_corrupt_row_is_deleted_not_retried() {
    let store = Arc::new(InMemoryQueueStore::new());
    store
        .save(
            Channel::Initial,
            serde_json::json!({"not": "an envelope"}),
            Utc::now(),
        )
        .await
        .unwrap();

    let registry = Arc::new(ListenerRegistry::new());
    let listener = CountingListener::new(0);
    registry.register(Channel::Initial, listener.clone());
    let bus = bus_with(store.clone(), registry);

    assert_eq!(bus.deliver_ready().await.unwrap(), 1);
    wait_until_empty(&store).await;
    assert_eq!(listener.attempts(), 0);
}

/// Store whose save always fails; used to assert persistence errors surface
/// to the sender.
struct BrokenStore;

#[async_trait]
impl QueueStore for BrokenStore {
    async fn save(
        &self,
        _channel: Channel,
        _message: Value,
        _invoke_after: DateTime<Utc>,
    ) -> StoreResult<Uuid> {
        Err(StoreError::database_query("save", "connection lost"))
    }

    async fn find_ready(&self, _max: i64, _now: DateTime<Utc>) -> StoreResult<Vec<cp_adapter_core::store::QueueRow>> {
        Ok(Vec::new())
    }

    async fn update(
        &self,
        id: Uuid,
        _message: Value,
        _invoke_after: DateTime<Utc>,
    ) -> StoreResult<()> {
        Err(StoreError::RowNotFound { id })
    }

    async fn delete(&self, _id: Uuid) -> StoreResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_send_propagates_store_errors() {
    let registry: Arc<ListenerRegistry<String>> = Arc::new(ListenerRegistry::new());
    let bus = DurableMessageBus::new(registry, Arc::new(BrokenStore), 4, 10);

    let result = bus
        .send(Channel::Initial, Envelope::new("payload".to_string(), 3))
        .await;
    assert_err!(result);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_poll_loop_picks_up_new_rows() {
    let store = Arc::new(InMemoryQueueStore::new());
    let registry = Arc::new(ListenerRegistry::new());
    let listener = CountingListener::new(0);
    registry.register(Channel::Initial, listener.clone());
    let bus = bus_with(store.clone(), registry);

    let handle = bus.spawn_poll_loop(Duration::from_millis(20));

    // written behind the bus's back, as another instance would
    let envelope = Envelope::new("payload".to_string(), 3);
    store
        .save(Channel::Initial, envelope.to_json().unwrap(), Utc::now())
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), listener.done.notified())
        .await
        .unwrap();
    handle.abort();
    wait_until_empty(&store).await;
}
