//! Runtime statistics for the queue listener.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counters updated by the poll loop and dispatch path
#[derive(Debug, Default)]
pub struct ListenerStats {
    pub polling_cycles: AtomicU64,
    pub empty_polls: AtomicU64,
    pub messages_received: AtomicU64,
    pub messages_succeeded: AtomicU64,
    pub handler_failures: AtomicU64,
    pub messages_poisoned: AtomicU64,
    pub poison_failures: AtomicU64,
    pub unregistered_deleted: AtomicU64,
    pub decode_failures: AtomicU64,
    pub transport_errors: AtomicU64,
    pub wake_ups: AtomicU64,
}

impl ListenerStats {
    pub(crate) fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> ListenerStatsSnapshot {
        ListenerStatsSnapshot {
            polling_cycles: self.polling_cycles.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_succeeded: self.messages_succeeded.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            messages_poisoned: self.messages_poisoned.load(Ordering::Relaxed),
            poison_failures: self.poison_failures.load(Ordering::Relaxed),
            unregistered_deleted: self.unregistered_deleted.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            wake_ups: self.wake_ups.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`ListenerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerStatsSnapshot {
    pub polling_cycles: u64,
    pub empty_polls: u64,
    pub messages_received: u64,
    pub messages_succeeded: u64,
    pub handler_failures: u64,
    pub messages_poisoned: u64,
    pub poison_failures: u64,
    pub unregistered_deleted: u64,
    pub decode_failures: u64,
    pub transport_errors: u64,
    pub wake_ups: u64,
}
