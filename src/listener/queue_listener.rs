//! # Queue Listener
//!
//! Polls one shared queue on behalf of every registered consumer.
//!
//! ## Cycle
//!
//! ```text
//! Idle -> Polling -> Dispatching -> Waiting -> Polling -> ...
//!                                      |
//!            stop() from any state -> Stopped
//! ```
//!
//! - **Polling**: dequeue up to `batch_size` messages, hidden for `visibility_timeout`
//! - **Dispatching**: run each message through the [`TriggerExecutor`] with at most
//!   `max_concurrent_dispatches` in flight, then delete, leave, or poison it
//! - **Waiting**: sleep for the [`DelayStrategy`] interval, cut short by the wake signal
//!   or by shutdown
//!
//! Stopping prevents new batches. Dispatches already started run to completion (each is
//! bounded by the handler timeout); if the loop has not exited within `shutdown_timeout`
//! it is aborted and the unfinished messages reappear once their visibility lapses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::delay::{DelayStrategy, RandomizedExponentialBackoff};
use super::executor::{ExecutionOutcome, TriggerExecutor};
use super::poison::PoisonRouter;
use super::registry::RegistrationTable;
use super::stats::{ListenerStats, ListenerStatsSnapshot};
use super::wake::{WakeNotifier, WakeSignal};
use crate::config::{ConfigurationError, ListenerConfig};
use crate::error::{ListenerError, ListenerResult};
use crate::logging::log_dispatch_outcome;
use crate::messaging::{EnvelopeCodec, JsonEnvelopeCodec, QueueRef, QueueTransport, RawMessage};

/// Lifecycle state of a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListenerState {
    Idle,
    Polling,
    Dispatching,
    Waiting,
    Stopped,
}

impl std::fmt::Display for ListenerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Dispatching => "dispatching",
            Self::Waiting => "waiting",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What one Polling + Dispatching cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    /// Messages dequeued this cycle
    pub received: usize,
    /// Handler succeeded and the message was deleted
    pub completed: usize,
    /// No registration; the message was deleted
    pub unregistered: usize,
    /// Handler failed below the threshold; left for redelivery
    pub retried: usize,
    /// Moved to a poison queue
    pub poisoned: usize,
    /// Dequeue, delete or poison-copy failures
    pub transport_errors: usize,
}

impl CycleSummary {
    pub fn had_messages(&self) -> bool {
        self.received > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Completed,
    Unregistered,
    Retried,
    Poisoned,
    TransportError,
}

/// State shared between the listener handle and its poll loop task
struct ListenerCore {
    listener_id: Uuid,
    queue: QueueRef,
    config: ListenerConfig,
    transport: Arc<dyn QueueTransport>,
    executor: TriggerExecutor,
    router: PoisonRouter,
    stats: ListenerStats,
    state: RwLock<ListenerState>,
    wake: WakeSignal,
    shutdown_requested: AtomicBool,
    shutdown: Notify,
}

impl ListenerCore {
    fn set_state(&self, state: ListenerState) {
        let mut current = self.state.write();
        // Stopped is terminal
        if *current != ListenerState::Stopped {
            *current = state;
        }
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    async fn run_cycle(&self) -> CycleSummary {
        self.set_state(ListenerState::Polling);
        ListenerStats::increment(&self.stats.polling_cycles);

        let messages = match self
            .transport
            .dequeue_batch(
                &self.queue,
                self.config.batch_size,
                self.config.visibility_timeout(),
            )
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                ListenerStats::increment(&self.stats.transport_errors);
                warn!(
                    listener_id = %self.listener_id,
                    queue = %self.queue,
                    error = %e,
                    transient = e.is_transient(),
                    "Dequeue failed, retrying next cycle"
                );
                return CycleSummary {
                    transport_errors: 1,
                    ..CycleSummary::default()
                };
            }
        };

        if messages.is_empty() {
            ListenerStats::increment(&self.stats.empty_polls);
            debug!(listener_id = %self.listener_id, queue = %self.queue, "Empty poll");
            return CycleSummary::default();
        }

        ListenerStats::add(&self.stats.messages_received, messages.len() as u64);
        self.set_state(ListenerState::Dispatching);

        let mut summary = CycleSummary {
            received: messages.len(),
            ..CycleSummary::default()
        };

        let dispositions: Vec<Disposition> = stream::iter(messages)
            .map(|message| async move { self.dispatch(message).await })
            .buffer_unordered(self.config.max_concurrent_dispatches)
            .collect()
            .await;

        for disposition in dispositions {
            match disposition {
                Disposition::Completed => summary.completed += 1,
                Disposition::Unregistered => summary.unregistered += 1,
                Disposition::Retried => summary.retried += 1,
                Disposition::Poisoned => summary.poisoned += 1,
                Disposition::TransportError => summary.transport_errors += 1,
            }
        }

        debug!(
            listener_id = %self.listener_id,
            queue = %self.queue,
            received = summary.received,
            completed = summary.completed,
            retried = summary.retried,
            poisoned = summary.poisoned,
            "Dispatch cycle finished"
        );
        summary
    }

    async fn dispatch(&self, message: RawMessage) -> Disposition {
        let outcome = self.executor.execute(&message).await;

        let details = match &outcome {
            ExecutionOutcome::Malformed(e) => Some(e.to_string()),
            ExecutionOutcome::Failed { error, .. } => Some(error.clone()),
            _ => None,
        };
        log_dispatch_outcome(
            &self.queue,
            &message.id,
            outcome.consumer_id(),
            message.dequeue_count,
            outcome.label(),
            details.as_deref(),
        );

        match &outcome {
            ExecutionOutcome::Malformed(_) => {
                ListenerStats::increment(&self.stats.decode_failures);
            }
            ExecutionOutcome::Failed { .. } => {
                ListenerStats::increment(&self.stats.handler_failures);
            }
            _ => {}
        }

        if outcome.requires_poison() {
            return self.poison(&message, &outcome).await;
        }

        match outcome {
            ExecutionOutcome::Completed { .. } => {
                if self.delete(&message).await {
                    ListenerStats::increment(&self.stats.messages_succeeded);
                    Disposition::Completed
                } else {
                    Disposition::TransportError
                }
            }
            ExecutionOutcome::Unregistered { .. } => {
                if self.delete(&message).await {
                    ListenerStats::increment(&self.stats.unregistered_deleted);
                    Disposition::Unregistered
                } else {
                    Disposition::TransportError
                }
            }
            // Left invisible; the transport redelivers it with a higher dequeue count
            _ => Disposition::Retried,
        }
    }

    async fn delete(&self, message: &RawMessage) -> bool {
        match self.transport.delete(&self.queue, message).await {
            Ok(()) => true,
            Err(e) => {
                ListenerStats::increment(&self.stats.transport_errors);
                warn!(
                    listener_id = %self.listener_id,
                    queue = %self.queue,
                    message_id = %message.id,
                    error = %e,
                    "Failed to delete message, it will be redelivered"
                );
                false
            }
        }
    }

    async fn poison(&self, message: &RawMessage, outcome: &ExecutionOutcome) -> Disposition {
        match self
            .router
            .route(&self.queue, message, outcome.registration(), outcome.label())
            .await
        {
            Ok(_) => {
                ListenerStats::increment(&self.stats.messages_poisoned);
                Disposition::Poisoned
            }
            Err(_) => {
                ListenerStats::increment(&self.stats.poison_failures);
                ListenerStats::increment(&self.stats.transport_errors);
                Disposition::TransportError
            }
        }
    }

    async fn run(self: Arc<Self>, mut delay: Box<dyn DelayStrategy>) {
        info!(
            listener_id = %self.listener_id,
            queue = %self.queue,
            provider = self.transport.provider_name(),
            "Queue listener poll loop started"
        );

        while !self.is_shutdown_requested() {
            let summary = self.run_cycle().await;
            if self.is_shutdown_requested() {
                break;
            }

            let wait = delay.next(summary.had_messages());
            self.set_state(ListenerState::Waiting);

            tokio::select! {
                biased;
                _ = self.shutdown.notified() => break,
                _ = self.wake.wait() => {
                    ListenerStats::increment(&self.stats.wake_ups);
                    debug!(listener_id = %self.listener_id, "Woken before poll interval elapsed");
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        self.set_state(ListenerState::Stopped);
        info!(listener_id = %self.listener_id, queue = %self.queue, "Queue listener poll loop exited");
    }
}

/// Listener multiplexing many trigger registrations over one shared queue
pub struct QueueListener {
    core: Arc<ListenerCore>,
    registrations: Arc<RegistrationTable>,
    delay: Mutex<Option<Box<dyn DelayStrategy>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for QueueListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueListener")
            .field("listener_id", &self.core.listener_id)
            .field("queue", &self.core.queue)
            .field("state", &self.state())
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

impl QueueListener {
    pub fn builder() -> QueueListenerBuilder {
        QueueListenerBuilder::default()
    }

    pub fn listener_id(&self) -> Uuid {
        self.core.listener_id
    }

    pub fn queue(&self) -> &QueueRef {
        &self.core.queue
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.core.config
    }

    pub fn state(&self) -> ListenerState {
        *self.core.state.read()
    }

    pub fn stats(&self) -> ListenerStatsSnapshot {
        self.core.stats.snapshot()
    }

    /// Handle producers use to make the listener poll early
    pub fn wake_notifier(&self) -> WakeNotifier {
        self.core.wake.notifier()
    }

    /// Table consumers register with; shared with the running poll loop
    pub fn registrations(&self) -> &Arc<RegistrationTable> {
        &self.registrations
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Spawn the poll loop
    ///
    /// A listener runs once: starting twice, or after `stop`, is an error.
    pub fn start(&self) -> ListenerResult<()> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(ListenerError::InvalidState(
                "queue listener is already running".to_string(),
            ));
        }
        if self.state() == ListenerState::Stopped {
            return Err(ListenerError::InvalidState(
                "queue listener has been stopped".to_string(),
            ));
        }

        let delay = self.delay.lock().take().ok_or_else(|| {
            ListenerError::InvalidState("delay strategy already consumed".to_string())
        })?;

        info!(
            listener_id = %self.core.listener_id,
            queue = %self.core.queue,
            registrations = self.registrations.len(),
            "Starting queue listener"
        );

        *handle = Some(tokio::spawn(Arc::clone(&self.core).run(delay)));
        Ok(())
    }

    /// Stop polling and wait for in-flight dispatch to finish
    ///
    /// Returns [`ListenerError::Timeout`] if the loop had to be aborted after
    /// `shutdown_timeout`. Stopping an idle or already stopped listener is a no-op.
    pub async fn stop(&self) -> ListenerResult<()> {
        self.core.shutdown_requested.store(true, Ordering::Release);
        self.core.shutdown.notify_one();

        let handle = self.handle.lock().take();
        let Some(mut handle) = handle else {
            self.core.set_state(ListenerState::Stopped);
            return Ok(());
        };

        info!(listener_id = %self.core.listener_id, "Stopping queue listener");
        let shutdown_timeout = self.core.config.shutdown_timeout();

        let result = match tokio::time::timeout(shutdown_timeout, &mut handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(
                    listener_id = %self.core.listener_id,
                    error = %e,
                    "Queue listener poll loop terminated abnormally"
                );
                Ok(())
            }
            Err(_) => {
                handle.abort();
                warn!(
                    listener_id = %self.core.listener_id,
                    timeout_ms = shutdown_timeout.as_millis() as u64,
                    "In-flight dispatch did not finish in time, poll loop aborted"
                );
                Err(ListenerError::Timeout(format!(
                    "queue listener did not drain within {}ms",
                    shutdown_timeout.as_millis()
                )))
            }
        };

        self.core.set_state(ListenerState::Stopped);
        result
    }

    /// Run a single Polling + Dispatching cycle on the caller's task
    ///
    /// For driving the listener manually; not allowed while the poll loop runs.
    pub async fn poll_once(&self) -> ListenerResult<CycleSummary> {
        if self.is_running() {
            return Err(ListenerError::InvalidState(
                "poll_once is unavailable while the poll loop is running".to_string(),
            ));
        }
        if self.state() == ListenerState::Stopped {
            return Err(ListenerError::InvalidState(
                "queue listener has been stopped".to_string(),
            ));
        }

        let summary = self.core.run_cycle().await;
        self.core.set_state(ListenerState::Idle);
        Ok(summary)
    }
}

impl Drop for QueueListener {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

/// Validated construction of a [`QueueListener`]
#[derive(Default)]
pub struct QueueListenerBuilder {
    config: Option<ListenerConfig>,
    queue: Option<QueueRef>,
    default_poison_queue: Option<QueueRef>,
    transport: Option<Arc<dyn QueueTransport>>,
    registrations: Option<Arc<RegistrationTable>>,
    codec: Option<Arc<dyn EnvelopeCodec>>,
    delay_strategy: Option<Box<dyn DelayStrategy>>,
    wake_signal: Option<WakeSignal>,
}

impl QueueListenerBuilder {
    /// Listener settings; defaults apply when omitted
    pub fn config(mut self, config: ListenerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// The shared queue to poll (required)
    pub fn queue(mut self, queue: QueueRef) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Fallback poison destination (required)
    pub fn default_poison_queue(mut self, queue: QueueRef) -> Self {
        self.default_poison_queue = Some(queue);
        self
    }

    /// Queue backend (required)
    pub fn transport(mut self, transport: Arc<dyn QueueTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share an existing registration table
    pub fn registrations(mut self, registrations: Arc<RegistrationTable>) -> Self {
        self.registrations = Some(registrations);
        self
    }

    pub fn codec(mut self, codec: Arc<dyn EnvelopeCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Replace the randomized exponential backoff built from the config
    pub fn delay_strategy<D: DelayStrategy>(mut self, strategy: D) -> Self {
        self.delay_strategy = Some(Box::new(strategy));
        self
    }

    /// Use a wake signal created ahead of the listener
    pub fn wake_signal(mut self, signal: WakeSignal) -> Self {
        self.wake_signal = Some(signal);
        self
    }

    pub fn build(self) -> ListenerResult<QueueListener> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let queue = self.queue.ok_or_else(|| {
            ConfigurationError::missing_required_field("queue", "QueueListenerBuilder")
        })?;
        let default_poison_queue = self.default_poison_queue.ok_or_else(|| {
            ConfigurationError::missing_required_field(
                "default_poison_queue",
                "QueueListenerBuilder",
            )
        })?;
        let transport = self.transport.ok_or_else(|| {
            ConfigurationError::missing_required_field("transport", "QueueListenerBuilder")
        })?;

        if default_poison_queue == queue {
            return Err(ConfigurationError::invalid_value(
                "default_poison_queue",
                &default_poison_queue,
                "must differ from the queue being polled",
            )
            .into());
        }

        let delay = match self.delay_strategy {
            Some(strategy) => strategy,
            None => Box::new(RandomizedExponentialBackoff::from_config(&config)?),
        };

        let registrations = self.registrations.unwrap_or_default();
        let codec = self
            .codec
            .unwrap_or_else(|| Arc::new(JsonEnvelopeCodec) as Arc<dyn EnvelopeCodec>);

        let executor = TriggerExecutor::new(
            Arc::clone(&registrations),
            codec,
            config.handler_timeout(),
            config.max_dequeue_count,
        );
        let router = PoisonRouter::new(Arc::clone(&transport), default_poison_queue);
        let listener_id = Uuid::new_v4();

        info!(
            listener_id = %listener_id,
            queue = %queue,
            default_poison_queue = %router.default_destination(),
            batch_size = config.batch_size,
            max_dequeue_count = config.max_dequeue_count,
            "Created queue listener"
        );

        Ok(QueueListener {
            core: Arc::new(ListenerCore {
                listener_id,
                queue,
                config,
                transport,
                executor,
                router,
                stats: ListenerStats::default(),
                state: RwLock::new(ListenerState::Idle),
                wake: self.wake_signal.unwrap_or_default(),
                shutdown_requested: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
            registrations,
            delay: Mutex::new(Some(delay)),
            handle: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{handler_fn, Registration};
    use crate::messaging::{InMemoryQueueTransport, SharedQueueWriter, TransportOperation};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn shared_queue() -> QueueRef {
        QueueRef::new("primary", "shared")
    }

    fn default_poison() -> QueueRef {
        QueueRef::new("primary", "shared-poison")
    }

    fn config() -> ListenerConfig {
        ListenerConfig {
            min_polling_interval_ms: 100,
            max_polling_interval_ms: 10_000,
            batch_size: 8,
            max_dequeue_count: 3,
            shutdown_timeout_ms: 1_000,
            visibility_timeout_ms: 5_000,
            handler_timeout_ms: 500,
            max_concurrent_dispatches: 4,
        }
    }

    fn listener(transport: Arc<InMemoryQueueTransport>) -> QueueListener {
        QueueListener::builder()
            .config(config())
            .queue(shared_queue())
            .default_poison_queue(default_poison())
            .transport(transport)
            .build()
            .unwrap()
    }

    fn writer(transport: Arc<InMemoryQueueTransport>) -> SharedQueueWriter {
        SharedQueueWriter::new(transport, shared_queue())
    }

    fn counting_registration(id: &str, calls: Arc<AtomicUsize>) -> Registration {
        Registration::new(
            id,
            handler_fn(move |_, _| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    anyhow::Ok(())
                }
            }),
        )
    }

    #[test]
    fn test_build_requires_queue_and_transport() {
        let err = QueueListener::builder()
            .default_poison_queue(default_poison())
            .transport(Arc::new(InMemoryQueueTransport::new()))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ListenerError::Configuration(ConfigurationError::MissingRequiredField { .. })
        ));

        let err = QueueListener::builder()
            .queue(shared_queue())
            .default_poison_queue(default_poison())
            .build()
            .unwrap_err();
        assert!(matches!(err, ListenerError::Configuration(_)));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let err = QueueListener::builder()
            .config(ListenerConfig {
                batch_size: 0,
                ..config()
            })
            .queue(shared_queue())
            .default_poison_queue(default_poison())
            .transport(Arc::new(InMemoryQueueTransport::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ListenerError::Configuration(_)));
    }

    #[test]
    fn test_build_rejects_poison_queue_equal_to_source() {
        let err = QueueListener::builder()
            .queue(shared_queue())
            .default_poison_queue(shared_queue())
            .transport(Arc::new(InMemoryQueueTransport::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ListenerError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_poll_once_dispatches_and_deletes() {
        let transport = Arc::new(InMemoryQueueTransport::new());
        let listener = listener(transport.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        listener
            .registrations()
            .register(counting_registration("orders.process", calls.clone()))
            .unwrap();

        let writer = writer(transport.clone());
        for i in 0..3 {
            writer.enqueue("orders.process", json!({ "i": i })).await.unwrap();
        }

        let summary = listener.poll_once().await.unwrap();

        assert_eq!(summary.received, 3);
        assert_eq!(summary.completed, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(transport.queue_length(&shared_queue()).await, 0);
        assert_eq!(listener.state(), ListenerState::Idle);

        let stats = listener.stats();
        assert_eq!(stats.polling_cycles, 1);
        assert_eq!(stats.messages_received, 3);
        assert_eq!(stats.messages_succeeded, 3);
    }

    #[tokio::test]
    async fn test_poll_once_respects_batch_size() {
        let transport = Arc::new(InMemoryQueueTransport::new());
        let listener = listener(transport.clone());
        listener
            .registrations()
            .register(counting_registration("a", Arc::new(AtomicUsize::new(0))))
            .unwrap();

        let writer = writer(transport.clone());
        for _ in 0..10 {
            writer.enqueue("a", json!({})).await.unwrap();
        }

        let summary = listener.poll_once().await.unwrap();
        assert_eq!(summary.received, 8);
        assert_eq!(transport.queue_length(&shared_queue()).await, 2);
    }

    #[tokio::test]
    async fn test_empty_poll() {
        let listener = listener(Arc::new(InMemoryQueueTransport::new()));

        let summary = listener.poll_once().await.unwrap();

        assert!(!summary.had_messages());
        assert_eq!(listener.stats().empty_polls, 1);
    }

    #[tokio::test]
    async fn test_dequeue_failure_is_absorbed() {
        let transport = Arc::new(InMemoryQueueTransport::new());
        let listener = listener(transport.clone());
        transport.fail_next(TransportOperation::Dequeue, 1);

        let summary = listener.poll_once().await.unwrap();

        assert_eq!(summary.transport_errors, 1);
        assert!(!summary.had_messages());
        assert_eq!(listener.stats().transport_errors, 1);
    }

    #[tokio::test]
    async fn test_unregistered_consumer_is_deleted_not_poisoned() {
        let transport = Arc::new(InMemoryQueueTransport::new());
        let listener = listener(transport.clone());
        writer(transport.clone())
            .enqueue("unsubscribed", json!({}))
            .await
            .unwrap();

        let summary = listener.poll_once().await.unwrap();

        assert_eq!(summary.unregistered, 1);
        assert_eq!(transport.queue_length(&shared_queue()).await, 0);
        assert_eq!(transport.queue_length(&default_poison()).await, 0);
        assert_eq!(listener.stats().unregistered_deleted, 1);
    }

    #[tokio::test]
    async fn test_malformed_message_poisoned_on_first_delivery() {
        let transport = Arc::new(InMemoryQueueTransport::new());
        let listener = listener(transport.clone());
        transport
            .enqueue(&shared_queue(), b"{broken".to_vec())
            .await
            .unwrap();

        let summary = listener.poll_once().await.unwrap();

        assert_eq!(summary.poisoned, 1);
        assert_eq!(
            transport.peek_bodies(&default_poison()).await,
            vec![b"{broken".to_vec()]
        );
        assert_eq!(transport.queue_length(&shared_queue()).await, 0);
        assert_eq!(listener.stats().decode_failures, 1);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let listener = listener(Arc::new(InMemoryQueueTransport::new()));
        listener.start().unwrap();

        assert!(matches!(
            listener.start(),
            Err(ListenerError::InvalidState(_))
        ));
        assert!(matches!(
            listener.poll_once().await,
            Err(ListenerError::InvalidState(_))
        ));

        listener.stop().await.unwrap();
        assert_eq!(listener.state(), ListenerState::Stopped);
        assert!(matches!(
            listener.start(),
            Err(ListenerError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let listener = listener(Arc::new(InMemoryQueueTransport::new()));
        listener.stop().await.unwrap();
        listener.stop().await.unwrap();
        assert_eq!(listener.state(), ListenerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_waiting_is_prompt() {
        let listener = listener(Arc::new(InMemoryQueueTransport::new()));
        listener.start().unwrap();

        // Let the loop reach its backoff wait
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(listener.state(), ListenerState::Waiting);

        let started = tokio::time::Instant::now();
        listener.stop().await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(listener.state(), ListenerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_times_out_on_stuck_dispatch() {
        let transport = Arc::new(InMemoryQueueTransport::new());
        let listener = QueueListener::builder()
            .config(ListenerConfig {
                handler_timeout_ms: 60_000,
                shutdown_timeout_ms: 200,
                ..config()
            })
            .queue(shared_queue())
            .default_poison_queue(default_poison())
            .transport(transport.clone())
            .build()
            .unwrap();
        listener
            .registrations()
            .register(Registration::new(
                "slow",
                handler_fn(|_, _| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    anyhow::Ok(())
                }),
            ))
            .unwrap();
        writer(transport.clone()).enqueue("slow", json!({})).await.unwrap();

        listener.start().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(listener.state(), ListenerState::Dispatching);

        let result = listener.stop().await;
        assert!(matches!(result, Err(ListenerError::Timeout(_))));
        assert_eq!(listener.state(), ListenerState::Stopped);
        // Never deleted; redelivered after the visibility timeout
        assert_eq!(transport.queue_length(&shared_queue()).await, 1);
    }
}
