//! Single entry point wiring the store and components together.

use std::sync::Arc;

use honeycomb_core::{
    CacheConfigPatch, Clock, CoordId, HoneycombConfig, HoneycombError, HoneycombResult,
    MoveOutcome, MutationService, PersistenceService, QueryService, SystemClock, TileFields,
    TilePatch, TileRecord,
};
use tokio::sync::watch;
use tracing::info;

use crate::action::CacheAction;
use crate::loader::{LoadOutcome, RegionLoader};
use crate::mutation::MutationCoordinator;
use crate::navigation::{NavigateOptions, NavigationController, NavigationOutcome};
use crate::persistence::{NoopPersistence, StatePersister};
use crate::state::CacheState;
use crate::store::{CacheContext, CacheStore, StateReader};
use crate::sync::{ConnectivityMonitor, HttpProbe, ReachabilityProbe, SyncEngine, SyncObserver};
use crate::tracker::{ChangeId, ChangeRecord, ChangeTracker};

/// Builder for [`TileCache`].
pub struct TileCacheBuilder {
    query: Arc<dyn QueryService>,
    mutations: Arc<dyn MutationService>,
    persistence: Option<Arc<dyn PersistenceService>>,
    config: HoneycombConfig,
    clock: Option<Arc<dyn Clock>>,
    connectivity: Option<Arc<ConnectivityMonitor>>,
    probe: Option<Arc<dyn ReachabilityProbe>>,
    observer: Option<Arc<dyn SyncObserver>>,
}

impl TileCacheBuilder {
    pub fn new(query: Arc<dyn QueryService>, mutations: Arc<dyn MutationService>) -> Self {
        Self {
            query,
            mutations,
            persistence: None,
            config: HoneycombConfig::default(),
            clock: None,
            connectivity: None,
            probe: None,
            observer: None,
        }
    }

    pub fn config(mut self, config: HoneycombConfig) -> Self {
        self.config = config;
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn PersistenceService>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn connectivity(mut self, connectivity: Arc<ConnectivityMonitor>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ReachabilityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> HoneycombResult<TileCache> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = Arc::new(CacheStore::new(self.config.cache.clone()));
        let ctx = CacheContext::from_store(store.clone(), clock);
        let loader = Arc::new(RegionLoader::new(ctx.clone(), self.query));
        let tracker = Arc::new(ChangeTracker::new());
        let mutations = MutationCoordinator::new(ctx.clone(), self.mutations, tracker);
        let navigation = NavigationController::new(ctx.clone(), loader.clone());
        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Arc::new(ConnectivityMonitor::default()));

        let probe = match self.probe {
            Some(probe) => Some(probe),
            None if self.config.sync.online_check_url.is_some() => {
                Some(Arc::new(HttpProbe::new()?) as Arc<dyn ReachabilityProbe>)
            }
            None => None,
        };
        let sync = SyncEngine::new(
            ctx.clone(),
            loader.clone(),
            connectivity.clone(),
            self.config.sync.clone(),
            probe,
        );
        sync.set_observer(self.observer);

        let persistence = self
            .persistence
            .unwrap_or_else(|| Arc::new(NoopPersistence));
        let persister = StatePersister::new(ctx.clone(), persistence);

        info!(
            max_depth = self.config.cache.max_depth,
            optimistic = self.config.cache.optimistic_enabled,
            sync_enabled = self.config.sync.enabled,
            "Tile cache built"
        );

        Ok(TileCache {
            store,
            ctx,
            loader,
            mutations,
            navigation,
            sync,
            connectivity,
            persister,
        })
    }
}

/// The cache as seen by the consuming layer.
pub struct TileCache {
    store: Arc<CacheStore>,
    ctx: CacheContext,
    loader: Arc<RegionLoader>,
    mutations: MutationCoordinator,
    navigation: NavigationController,
    sync: SyncEngine,
    connectivity: Arc<ConnectivityMonitor>,
    persister: StatePersister,
}

impl TileCache {
    pub fn builder(
        query: Arc<dyn QueryService>,
        mutations: Arc<dyn MutationService>,
    ) -> TileCacheBuilder {
        TileCacheBuilder::new(query, mutations)
    }

    // === Reads ===

    pub fn state(&self) -> Arc<CacheState> {
        self.store.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<CacheState>> {
        self.store.subscribe()
    }

    pub fn item(&self, coord_id: &CoordId) -> Option<TileRecord> {
        self.state().item(coord_id).cloned()
    }

    pub fn items(&self) -> Vec<TileRecord> {
        self.state().items_by_coordinate.values().cloned().collect()
    }

    pub fn center(&self) -> Option<CoordId> {
        self.state().current_center.clone()
    }

    pub fn expanded(&self) -> Vec<String> {
        self.state().expanded.to_vec()
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading
    }

    pub fn last_error(&self) -> Option<HoneycombError> {
        self.state().last_error.clone()
    }

    pub fn is_region_loaded(&self, center: &CoordId, depth: u32) -> bool {
        self.loader.is_region_loaded(center, depth)
    }

    // === Loading ===

    pub async fn load_region(
        &self,
        center: &CoordId,
        depth: Option<u32>,
    ) -> HoneycombResult<LoadOutcome> {
        self.loader.load_region(center, depth).await
    }

    pub async fn load_children(
        &self,
        parent: &CoordId,
        depth: Option<u32>,
    ) -> HoneycombResult<LoadOutcome> {
        self.loader.load_children(parent, depth).await
    }

    pub async fn prefetch(&self, center: &CoordId) -> HoneycombResult<LoadOutcome> {
        self.loader.prefetch(center).await
    }

    pub fn invalidate_region(&self, center: &CoordId) {
        self.loader.invalidate_region(center);
    }

    pub fn invalidate_all(&self) {
        self.loader.invalidate_all();
    }

    // === Navigation ===

    pub fn navigate_to(
        &self,
        coord_id: &CoordId,
        options: NavigateOptions,
    ) -> HoneycombResult<NavigationOutcome> {
        self.navigation.navigate_to(coord_id, options)
    }

    pub fn update_center_only(&self, coord_id: &CoordId) -> HoneycombResult<()> {
        self.navigation.update_center_only(coord_id)
    }

    pub fn back(&self) -> HoneycombResult<Option<NavigationOutcome>> {
        self.navigation.back()
    }

    pub fn history(&self) -> Vec<CoordId> {
        self.navigation.history()
    }

    pub fn toggle_expanded(&self, persistent_id: &str) {
        self.ctx
            .dispatch(CacheAction::ToggleExpanded(persistent_id.to_string()));
    }

    pub fn set_expanded(&self, persistent_ids: Vec<String>) {
        self.ctx.dispatch(CacheAction::SetExpanded(persistent_ids));
    }

    // === Mutations ===

    pub async fn create_item(
        &self,
        coord_id: &CoordId,
        fields: TileFields,
    ) -> HoneycombResult<TileRecord> {
        self.mutations.create_item(coord_id, fields).await
    }

    pub async fn update_item(
        &self,
        coord_id: &CoordId,
        patch: TilePatch,
    ) -> HoneycombResult<TileRecord> {
        self.mutations.update_item(coord_id, patch).await
    }

    pub async fn delete_item(&self, coord_id: &CoordId) -> HoneycombResult<()> {
        self.mutations.delete_item(coord_id).await
    }

    pub async fn move_item(&self, from: &CoordId, to: &CoordId) -> HoneycombResult<MoveOutcome> {
        self.mutations.move_item(from, to).await
    }

    pub fn rollback(&self, change_id: ChangeId) -> HoneycombResult<()> {
        self.mutations.rollback(change_id)
    }

    pub fn rollback_all(&self) -> usize {
        self.mutations.rollback_all()
    }

    pub fn list_pending(&self) -> Vec<ChangeRecord> {
        self.mutations.list_pending()
    }

    // === Config, sync, persistence ===

    pub fn update_cache_config(&self, patch: CacheConfigPatch) -> HoneycombResult<()> {
        self.state().config.merged(&patch).validate()?;
        self.ctx.dispatch(CacheAction::UpdateConfig(patch));
        Ok(())
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub async fn save_state(&self) -> HoneycombResult<bool> {
        self.persister.save().await
    }

    pub async fn restore_state(&self) -> HoneycombResult<bool> {
        self.persister.restore().await
    }

    pub async fn clear_saved_state(&self) -> HoneycombResult<()> {
        self.persister.clear().await
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("TileCache")
            .field("items", &state.items_by_coordinate.len())
            .field("regions", &state.region_index.len())
            .field("center", &state.current_center)
            .field("pending", &self.mutations.tracker().len())
            .finish_non_exhaustive()
    }
}
