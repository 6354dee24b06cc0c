//! Sync lifecycle events, status snapshot and observer hook.

use std::panic::{catch_unwind, AssertUnwindSafe};

use honeycomb_core::{CoordId, EpochMs, HoneycombError};
use thiserror::Error;
use tracing::error;

/// Lifecycle of the periodic scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    Running,
    Paused,
}

/// One region that failed to reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionFailure {
    pub center: CoordId,
    pub error: HoneycombError,
}

/// Summary of a single sync attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub center: Option<CoordId>,
    pub center_synced: bool,
    pub regions_attempted: usize,
    pub regions_synced: usize,
    pub items_loaded: usize,
    pub failures: Vec<RegionFailure>,
    pub started_at: EpochMs,
    pub finished_at: EpochMs,
}

impl SyncReport {
    /// A run succeeds when the center reloaded or nothing failed.
    pub fn succeeded(&self) -> bool {
        self.center_synced || self.failures.is_empty()
    }

    /// The error to report for a failed run, center first.
    pub fn primary_error(&self) -> Option<&HoneycombError> {
        let center_failure = self.center.as_ref().and_then(|center| {
            self.failures
                .iter()
                .find(|failure| &failure.center == center)
        });
        center_failure
            .or_else(|| self.failures.first())
            .map(|failure| &failure.error)
    }
}

/// Point-in-time view of the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncStatus {
    pub state: SyncState,
    pub is_online: bool,
    pub is_syncing: bool,
    pub last_run_epoch: Option<EpochMs>,
    pub next_run_epoch: Option<EpochMs>,
    pub run_count: u64,
    pub error_count: u64,
    pub last_error: Option<HoneycombError>,
    /// Consecutive failed attempts since the last success.
    pub retry_attempt: u32,
    pub last_report: Option<SyncReport>,
}

/// Event delivered to a [`SyncObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Started {
        attempt: u32,
        forced: bool,
    },
    Completed(SyncReport),
    Failed {
        error: HoneycombError,
        attempt: u32,
        will_retry: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sync observer failed: {0}")]
pub struct ObserverError(pub String);

/// Receives sync lifecycle events. Failures are logged and never change
/// the outcome of a sync.
pub trait SyncObserver: Send + Sync {
    fn on_event(&self, event: &SyncEvent) -> Result<(), ObserverError>;
}

pub(crate) fn notify(observer: &dyn SyncObserver, event: &SyncEvent) {
    match catch_unwind(AssertUnwindSafe(|| observer.on_event(event))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "Sync observer returned an error"),
        Err(_) => error!("Sync observer panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(center_synced: bool, failures: Vec<RegionFailure>) -> SyncReport {
        SyncReport {
            center: Some(CoordId::from_raw("1,0")),
            center_synced,
            regions_attempted: 2,
            regions_synced: 0,
            items_loaded: 0,
            failures,
            started_at: 0,
            finished_at: 0,
        }
    }

    fn failure(center: &str) -> RegionFailure {
        RegionFailure {
            center: CoordId::from_raw(center),
            error: HoneycombError::network(center.to_string()),
        }
    }

    #[test]
    fn test_center_success_outweighs_region_failures() {
        assert!(report(true, vec![failure("1,0:2")]).succeeded());
        assert!(report(false, vec![]).succeeded());
        assert!(!report(false, vec![failure("1,0:2")]).succeeded());
    }

    #[test]
    fn test_primary_error_prefers_center() {
        let r = report(false, vec![failure("1,0:2"), failure("1,0")]);
        assert_eq!(r.primary_error(), Some(&HoneycombError::network("1,0")));
    }

    struct Panicking;

    impl SyncObserver for Panicking {
        fn on_event(&self, _event: &SyncEvent) -> Result<(), ObserverError> {
            panic!("observer exploded");
        }
    }

    #[test]
    fn test_panicking_observer_is_contained() {
        notify(
            &Panicking,
            &SyncEvent::Started {
                attempt: 1,
                forced: false,
            },
        );
    }
}
