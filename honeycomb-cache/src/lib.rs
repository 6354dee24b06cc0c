//! Honeycomb Cache - Region Cache and Sync Runtime
//!
//! Client-side cache for a hexagonal tile tree. A single [`CacheStore`]
//! applies [`CacheAction`]s through a pure reducer; the loader, mutation
//! coordinator, navigation controller and sync engine read the live state
//! through a [`CacheContext`] and never hold a snapshot across an await.
//!
//! Most callers only need [`TileCache`].

pub mod action;
pub mod facade;
pub mod loader;
pub mod mutation;
pub mod navigation;
pub mod persistence;
pub mod reducer;
pub mod state;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod timeout;
pub mod tracker;

pub use action::CacheAction;
pub use facade::{TileCache, TileCacheBuilder};
pub use loader::{LoadOutcome, RegionLoader, DEFAULT_CHILDREN_DEPTH};
pub use mutation::{default_color_token, MutationCoordinator};
pub use navigation::{
    prune_expanded, NavigateOptions, NavigationController, NavigationOutcome, HISTORY_LIMIT,
};
pub use persistence::{
    FilePersistence, MemoryPersistence, NoopPersistence, PersistedState, StatePersister,
    STATE_KEY,
};
pub use state::{CacheState, ExpandedSet, RegionDescriptor};
pub use store::{ActionDispatcher, CacheContext, CacheStore, StateReader};
pub use sync::{
    ConnectivityMonitor, EnvironmentEvent, HttpProbe, ObserverError, ReachabilityProbe,
    RegionFailure, SyncEngine, SyncEvent, SyncObserver, SyncReport, SyncState, SyncStatus,
};
pub use telemetry::{init_tracing, TelemetryConfig};
pub use tracker::{ChangeId, ChangeKind, ChangeRecord, ChangeTracker, UndoStep};
