//! # Listener Configuration
//!
//! Configuration surface consumed by the shared queue listener. Durations are stored as
//! millisecond integers so they read naturally from TOML/YAML files and environment
//! variables, and are exposed as [`Duration`] through accessor methods.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use shared_queue_listener::config::ListenerConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Defaults, overlaid with config/listener.toml and LISTENER__* variables
//! let config = ListenerConfig::load(Some("config/listener.toml"))?;
//! println!("polling between {:?} and {:?}", config.min_polling_interval(), config.max_polling_interval());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};

/// Root configuration for a [`QueueListener`](crate::listener::QueueListener)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Shortest wait between polls; used right after a poll that returned messages
    pub min_polling_interval_ms: u64,
    /// Longest wait between polls; the cap for exponential backoff
    pub max_polling_interval_ms: u64,
    /// Maximum number of messages dequeued per poll
    pub batch_size: usize,
    /// Number of deliveries a message gets before it is poisoned
    ///
    /// A handler runs at most this many times for one message. A failure on the delivery
    /// whose dequeue count equals this value poisons the message at once, and a message
    /// that arrives with a count above it (for example after a crash mid-dispatch) is
    /// poisoned without invoking any handler.
    pub max_dequeue_count: u32,
    /// Upper bound on graceful drain when the listener is stopped
    pub shutdown_timeout_ms: u64,
    /// How long a dequeued message stays invisible to other consumers
    pub visibility_timeout_ms: u64,
    /// Deadline for a single handler invocation
    pub handler_timeout_ms: u64,
    /// Number of messages from one batch dispatched concurrently
    pub max_concurrent_dispatches: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            min_polling_interval_ms: 100,
            max_polling_interval_ms: 60_000, // 1 minute
            batch_size: 16,
            max_dequeue_count: 5,
            shutdown_timeout_ms: 30_000,
            visibility_timeout_ms: 600_000, // 10 minutes
            handler_timeout_ms: 300_000,
            max_concurrent_dispatches: 16,
        }
    }
}

impl ListenerConfig {
    /// Validate every field, failing on the first violation
    pub fn validate(&self) -> ConfigResult<()> {
        let positive_fields: [(&str, u64); 7] = [
            ("min_polling_interval_ms", self.min_polling_interval_ms),
            ("max_polling_interval_ms", self.max_polling_interval_ms),
            ("batch_size", self.batch_size as u64),
            ("max_dequeue_count", u64::from(self.max_dequeue_count)),
            ("shutdown_timeout_ms", self.shutdown_timeout_ms),
            ("visibility_timeout_ms", self.visibility_timeout_ms),
            ("handler_timeout_ms", self.handler_timeout_ms),
        ];

        for (field, value) in positive_fields {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value,
                    "must be greater than zero",
                ));
            }
        }

        if self.max_concurrent_dispatches == 0 {
            return Err(ConfigurationError::invalid_value(
                "max_concurrent_dispatches",
                self.max_concurrent_dispatches,
                "must be greater than zero",
            ));
        }

        if self.min_polling_interval_ms > self.max_polling_interval_ms {
            return Err(ConfigurationError::invalid_value(
                "min_polling_interval_ms",
                self.min_polling_interval_ms,
                format!(
                    "must not exceed max_polling_interval_ms ({})",
                    self.max_polling_interval_ms
                ),
            ));
        }

        Ok(())
    }

    pub fn min_polling_interval(&self) -> Duration {
        Duration::from_millis(self.min_polling_interval_ms)
    }

    pub fn max_polling_interval(&self) -> Duration {
        Duration::from_millis(self.max_polling_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.visibility_timeout_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }
}
