//! Time source for cache epochs.

use chrono::Utc;

/// Milliseconds since the Unix epoch.
pub type EpochMs = i64;

/// Source of the current time. Injected everywhere an epoch is recorded so
/// staleness can be tested without sleeping.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> EpochMs;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> EpochMs {
        Utc::now().timestamp_millis()
    }
}
