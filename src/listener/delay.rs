//! # Poll Delay Strategy
//!
//! Computes the wait between polls of the shared queue.
//!
//! ## Behavior
//!
//! - **Empty poll**: the interval grows by a factor of 2, randomized by ±20% jitter so
//!   replicas polling the same queue drift apart instead of polling in lockstep
//! - **Non-empty poll**: the interval resets to the minimum so bursts drain quickly
//! - **Bounds**: the interval never drops below the minimum, never exceeds the maximum,
//!   and never decreases across consecutive empty polls

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{ConfigResult, ConfigurationError, ListenerConfig};

const BACKOFF_MULTIPLIER: f64 = 2.0;
const MIN_JITTER: f64 = 0.8;
const MAX_JITTER: f64 = 1.2;

/// Decides how long the poll loop waits before the next poll
pub trait DelayStrategy: Send + 'static {
    /// Record the outcome of a poll and return the wait before the next one
    fn next(&mut self, had_messages: bool) -> Duration;

    /// The most recently returned interval
    fn current(&self) -> Duration;

    /// Return to the minimum interval
    fn reset(&mut self);
}

/// Randomized exponential backoff between fixed bounds
#[derive(Debug, Clone)]
pub struct RandomizedExponentialBackoff {
    min: Duration,
    max: Duration,
    current: Duration,
    rng: StdRng,
}

impl RandomizedExponentialBackoff {
    /// Create a strategy seeded from OS entropy
    pub fn new(min: Duration, max: Duration) -> ConfigResult<Self> {
        Self::with_rng(min, max, StdRng::from_entropy())
    }

    /// Create a strategy with a fixed seed, for reproducible sequences
    pub fn with_seed(min: Duration, max: Duration, seed: u64) -> ConfigResult<Self> {
        Self::with_rng(min, max, StdRng::seed_from_u64(seed))
    }

    /// Create a strategy from the listener's polling bounds
    pub fn from_config(config: &ListenerConfig) -> ConfigResult<Self> {
        Self::new(config.min_polling_interval(), config.max_polling_interval())
    }

    fn with_rng(min: Duration, max: Duration, rng: StdRng) -> ConfigResult<Self> {
        if min.is_zero() {
            return Err(ConfigurationError::invalid_value(
                "min_polling_interval",
                format!("{min:?}"),
                "must be greater than zero",
            ));
        }
        if min > max {
            return Err(ConfigurationError::invalid_value(
                "min_polling_interval",
                format!("{min:?}"),
                format!("must not exceed max_polling_interval ({max:?})"),
            ));
        }

        Ok(Self {
            min,
            max,
            current: min,
            rng,
        })
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    fn grow(&mut self) -> Duration {
        let factor = BACKOFF_MULTIPLIER * self.rng.gen_range(MIN_JITTER..=MAX_JITTER);
        let grown_secs = self.current.as_secs_f64() * factor;

        if grown_secs >= self.max.as_secs_f64() {
            self.max
        } else {
            // Float rounding must not shrink the interval
            Duration::from_secs_f64(grown_secs)
                .max(self.current)
                .clamp(self.min, self.max)
        }
    }
}

impl DelayStrategy for RandomizedExponentialBackoff {
    fn next(&mut self, had_messages: bool) -> Duration {
        self.current = if had_messages { self.min } else { self.grow() };
        self.current
    }

    fn current(&self) -> Duration {
        self.current
    }

    fn reset(&mut self) {
        self.current = self.min;
    }
}
