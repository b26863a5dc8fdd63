#![allow(dead_code)]

pub mod strategies;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shared_queue_listener::config::ListenerConfig;
use shared_queue_listener::listener::{handler_fn, QueueListener, Registration};
use shared_queue_listener::messaging::{InMemoryQueueTransport, QueueRef, SharedQueueWriter};

pub fn shared_queue() -> QueueRef {
    QueueRef::new("primary", "triggers")
}

pub fn default_poison_queue() -> QueueRef {
    QueueRef::new("primary", "triggers-poison")
}

/// Fast settings for tests running on paused time
pub fn test_config() -> ListenerConfig {
    ListenerConfig {
        min_polling_interval_ms: 100,
        max_polling_interval_ms: 2_000,
        batch_size: 16,
        max_dequeue_count: 3,
        shutdown_timeout_ms: 5_000,
        visibility_timeout_ms: 1_000,
        handler_timeout_ms: 1_000,
        max_concurrent_dispatches: 4,
    }
}

/// Listener wired to an in-memory transport, with a writer that wakes it
pub struct ListenerHarness {
    pub transport: Arc<InMemoryQueueTransport>,
    pub listener: QueueListener,
    pub writer: SharedQueueWriter,
}

impl ListenerHarness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ListenerConfig) -> Self {
        Self::with_transport(config, Arc::new(InMemoryQueueTransport::new()))
    }

    pub fn with_transport(config: ListenerConfig, transport: Arc<InMemoryQueueTransport>) -> Self {
        let listener = QueueListener::builder()
            .config(config)
            .queue(shared_queue())
            .default_poison_queue(default_poison_queue())
            .transport(transport.clone())
            .build()
            .expect("valid listener configuration");
        let writer = SharedQueueWriter::new(transport.clone(), shared_queue())
            .with_notifier(listener.wake_notifier());

        Self {
            transport,
            listener,
            writer,
        }
    }

    pub async fn live_messages(&self) -> usize {
        self.transport.queue_length(&shared_queue()).await
    }

    pub async fn poisoned_in(&self, queue: &QueueRef) -> usize {
        self.transport.queue_length(queue).await
    }
}

/// Registration whose handler counts invocations and succeeds
pub fn counting_registration(consumer_id: &str) -> (Registration, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let registration = Registration::new(
        consumer_id,
        handler_fn(move |_, _| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        }),
    );
    (registration, calls)
}

/// Registration whose handler counts invocations and always fails
pub fn failing_registration(consumer_id: &str) -> (Registration, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let registration = Registration::new(
        consumer_id,
        handler_fn(move |_, context| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(anyhow::anyhow!(
                    "attempt {} failed",
                    context.dequeue_count
                ))
            }
        }),
    );
    (registration, calls)
}

/// Poll `condition` on short sleeps until it holds or `limit` elapses
pub async fn wait_until<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
