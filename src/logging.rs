//! # Structured Logging Module
//!
//! Environment-aware structured logging for the listener's poll loop and dispatch path.
//! Console output by default, JSON lines when `LISTENER_LOG_FORMAT=json`.

use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::messaging::{MessageId, QueueRef};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// Safe to call more than once; only the first call installs a subscriber, and an
/// already-installed global subscriber is left in place.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = std::env::var("LISTENER_LOG")
            .map(EnvFilter::new)
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let layer = if use_json_format() {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // Embedding applications may have installed their own subscriber already
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    environment_from(|key| std::env::var(key).ok())
}

fn environment_from<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup("LISTENER_ENV")
        .or_else(|| lookup("APP_ENV"))
        .unwrap_or_else(|| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

fn use_json_format() -> bool {
    std::env::var("LISTENER_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log the outcome of dispatching one message
pub fn log_dispatch_outcome(
    queue: &QueueRef,
    message_id: &MessageId,
    consumer_id: Option<&str>,
    dequeue_count: u32,
    outcome: &str,
    details: Option<&str>,
) {
    tracing::info!(
        queue = %queue,
        message_id = %message_id,
        consumer_id = consumer_id,
        dequeue_count = dequeue_count,
        outcome = %outcome,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "DISPATCH_OUTCOME"
    );
}

/// Log a message being moved from the live queue to a poison queue
pub fn log_poison_routing(
    origin: &QueueRef,
    message_id: &MessageId,
    destination: &QueueRef,
    consumer_specific: bool,
    reason: &str,
) {
    tracing::warn!(
        origin = %origin,
        message_id = %message_id,
        destination = %destination,
        consumer_specific = consumer_specific,
        reason = %reason,
        timestamp = %Utc::now().to_rfc3339(),
        "POISON_ROUTING"
    );
}
