#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use honeycomb_cache::{
    ConnectivityMonitor, ObserverError, SyncEvent, SyncObserver, TileCache,
};
use honeycomb_core::{CoordId, HoneycombConfig, PersistenceService};
use honeycomb_test_utils::{
    init_test_tracing, sample_tree, ManualClock, MockBackend, MockMutationService,
    MockQueryService,
};
use tokio::time::Instant;

pub const START_MS: i64 = 1_700_000_000_000;

/// Records every sync event with the (tokio) instant it arrived.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(Instant, SyncEvent)>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn timeline(&self) -> Vec<(Instant, SyncEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn started(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SyncEvent::Started { .. }))
            .count()
    }

    pub fn completed(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SyncEvent::Completed(_)))
            .count()
    }

    pub fn failed(&self) -> Vec<(Instant, SyncEvent)> {
        self.timeline()
            .into_iter()
            .filter(|(_, e)| matches!(e, SyncEvent::Failed { .. }))
            .collect()
    }
}

impl SyncObserver for RecordingObserver {
    fn on_event(&self, event: &SyncEvent) -> Result<(), ObserverError> {
        self.events
            .lock()
            .unwrap()
            .push((Instant::now(), event.clone()));
        Ok(())
    }
}

/// Observer that always reports an error.
pub struct FailingObserver;

impl SyncObserver for FailingObserver {
    fn on_event(&self, _event: &SyncEvent) -> Result<(), ObserverError> {
        Err(ObserverError("dashboard unavailable".to_string()))
    }
}

/// Observer that panics on every event.
pub struct PanickingObserver;

impl SyncObserver for PanickingObserver {
    fn on_event(&self, _event: &SyncEvent) -> Result<(), ObserverError> {
        panic!("observer bug");
    }
}

pub struct Harness {
    pub cache: Arc<TileCache>,
    pub backend: MockBackend,
    pub query: Arc<MockQueryService>,
    pub mutations: Arc<MockMutationService>,
    pub clock: Arc<ManualClock>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub observer: Arc<RecordingObserver>,
}

pub fn harness() -> Harness {
    harness_with(HoneycombConfig::default(), None)
}

pub fn harness_with(
    config: HoneycombConfig,
    persistence: Option<Arc<dyn PersistenceService>>,
) -> Harness {
    init_test_tracing();
    let backend = MockBackend::with_tiles(sample_tree());
    let query = Arc::new(MockQueryService::new(backend.clone()));
    let mutations = Arc::new(MockMutationService::new(backend.clone()));
    let clock = Arc::new(ManualClock::new(START_MS));
    let connectivity = Arc::new(ConnectivityMonitor::new(true));
    let observer = Arc::new(RecordingObserver::default());

    let mut builder = TileCache::builder(query.clone(), mutations.clone())
        .config(config)
        .clock(clock.clone())
        .connectivity(connectivity.clone())
        .observer(observer.clone());
    if let Some(persistence) = persistence {
        builder = builder.persistence(persistence);
    }
    let cache = Arc::new(builder.build().unwrap());

    Harness {
        cache,
        backend,
        query,
        mutations,
        clock,
        connectivity,
        observer,
    }
}

pub fn coord(raw: &str) -> CoordId {
    CoordId::parse(raw).unwrap()
}
