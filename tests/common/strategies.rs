use std::time::Duration;

use proptest::prelude::*;

/// Strategy for generating valid (min, max) polling bounds in milliseconds
pub fn polling_bounds_strategy() -> impl Strategy<Value = (Duration, Duration)> {
    (1u64..5_000, 0u64..120_000).prop_map(|(min_ms, extra_ms)| {
        (
            Duration::from_millis(min_ms),
            Duration::from_millis(min_ms + extra_ms),
        )
    })
}

/// Strategy for generating poll outcomes (true = messages received)
pub fn poll_outcomes_strategy() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 1..64)
}

/// Strategy for generating consumer identifiers
pub fn consumer_id_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}(\\.[a-z][a-z0-9_]{0,15}){0,2}"
}
