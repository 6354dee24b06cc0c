//! Background sync.
//!
//! A timer-driven loop reloads the current center and recently loaded
//! regions. Attempts are skipped while offline, retried with exponential
//! backoff on failure, and reported to an optional [`SyncObserver`].

mod connectivity;
mod engine;
mod events;

pub use connectivity::{ConnectivityMonitor, EnvironmentEvent, HttpProbe, ReachabilityProbe};
pub use engine::SyncEngine;
pub use events::{
    ObserverError, RegionFailure, SyncEvent, SyncObserver, SyncReport, SyncState, SyncStatus,
};
