//! # Wake Signal
//!
//! Fast-path notification that messages may be available on the shared queue. The
//! listener owns the [`WakeSignal`]; producers and queue watchers hold cloned
//! [`WakeNotifier`]s.
//!
//! The signal holds at most one pending permit: any number of notifications raised
//! while the poll loop is busy collapse into a single early wake-up.

use std::sync::Arc;

use tokio::sync::Notify;

/// Receiving side of the wake channel, owned by one listener
#[derive(Debug, Default)]
pub struct WakeSignal {
    notify: Arc<Notify>,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle producers can use to wake this listener
    pub fn notifier(&self) -> WakeNotifier {
        WakeNotifier {
            notify: Arc::clone(&self.notify),
        }
    }

    /// Wait until a notification arrives, consuming a pending one immediately
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// Sending side of the wake channel
#[derive(Debug, Clone)]
pub struct WakeNotifier {
    notify: Arc<Notify>,
}

impl WakeNotifier {
    /// Signal that messages may be available
    pub fn notify(&self) {
        self.notify.notify_one();
    }
}
