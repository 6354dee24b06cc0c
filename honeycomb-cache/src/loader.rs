//! Region loading with freshness checks.
//!
//! A fresh region is served from the cache without a remote call. Loads go
//! through the query service under the configured request timeout, and the
//! loading flag is always cleared again, whether the call succeeds, fails or
//! the future is dropped.

use std::sync::Arc;

use honeycomb_core::{CoordId, HoneycombResult, QueryService, TileRecord};
use tracing::{debug, info, warn};

use crate::action::CacheAction;
use crate::store::CacheContext;
use crate::timeout::with_timeout;

/// Default depth for [`RegionLoader::load_children`].
pub const DEFAULT_CHILDREN_DEPTH: u32 = 2;

/// Result of a load request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub center: CoordId,
    pub depth: u32,
    pub items_loaded: usize,
    /// True when the region was fresh and no remote call was made.
    pub from_cache: bool,
}

impl LoadOutcome {
    fn cached(center: &CoordId, depth: u32) -> Self {
        Self {
            center: center.clone(),
            depth,
            items_loaded: 0,
            from_cache: true,
        }
    }

    fn fetched(center: &CoordId, depth: u32, items_loaded: usize) -> Self {
        Self {
            center: center.clone(),
            depth,
            items_loaded,
            from_cache: false,
        }
    }
}

/// Clears the loading flag when dropped.
struct LoadingGuard<'a> {
    ctx: &'a CacheContext,
}

impl<'a> LoadingGuard<'a> {
    fn engage(ctx: &'a CacheContext) -> Self {
        ctx.dispatch(CacheAction::SetLoading(true));
        Self { ctx }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.ctx.dispatch(CacheAction::SetLoading(false));
    }
}

#[derive(Clone, Copy)]
enum RegionKind {
    Region,
    Children,
}

/// Loads regions from the query service into the cache.
pub struct RegionLoader {
    ctx: CacheContext,
    query: Arc<dyn QueryService>,
}

impl RegionLoader {
    pub fn new(ctx: CacheContext, query: Arc<dyn QueryService>) -> Self {
        Self { ctx, query }
    }

    /// True iff the region at `center` is fresh for `depth` generations.
    pub fn is_region_loaded(&self, center: &CoordId, depth: u32) -> bool {
        self.ctx
            .state()
            .is_region_fresh(center, depth, self.ctx.now_ms())
    }

    /// Load the region centered at `center`, down to `depth` generations or
    /// the configured `max_depth`.
    pub async fn load_region(
        &self,
        center: &CoordId,
        depth: Option<u32>,
    ) -> HoneycombResult<LoadOutcome> {
        let depth = depth.unwrap_or_else(|| self.ctx.state().config.max_depth);
        self.load(center, depth, RegionKind::Region).await
    }

    /// Load the children of `parent`, two generations by default.
    pub async fn load_children(
        &self,
        parent: &CoordId,
        depth: Option<u32>,
    ) -> HoneycombResult<LoadOutcome> {
        let depth = depth.unwrap_or(DEFAULT_CHILDREN_DEPTH);
        self.load(parent, depth, RegionKind::Children).await
    }

    /// Warm the cache around `center` without touching the loading flag or
    /// `last_error`. Failures are logged and returned to the caller only.
    pub async fn prefetch(&self, center: &CoordId) -> HoneycombResult<LoadOutcome> {
        let depth = self.ctx.state().config.max_depth;
        if self.is_region_loaded(center, depth) {
            return Ok(LoadOutcome::cached(center, depth));
        }
        match self.fetch(center, depth).await {
            Ok(items) => {
                let count = items.len();
                self.fold(center, items, depth, RegionKind::Region);
                debug!(center = %center, items = count, "Prefetched region");
                Ok(LoadOutcome::fetched(center, depth, count))
            }
            Err(err) => {
                warn!(center = %center, error = %err, "Prefetch failed");
                Err(err)
            }
        }
    }

    /// Reload `center` regardless of freshness. Used by background sync:
    /// neither the loading flag nor `last_error` is touched.
    pub async fn reload_region(&self, center: &CoordId, depth: u32) -> HoneycombResult<LoadOutcome> {
        let items = self.fetch(center, depth).await?;
        let count = items.len();
        self.fold(center, items, depth, RegionKind::Region);
        Ok(LoadOutcome::fetched(center, depth, count))
    }

    pub fn invalidate_region(&self, center: &CoordId) {
        debug!(center = %center, "Invalidating region");
        self.ctx
            .dispatch(CacheAction::InvalidateRegion(center.clone()));
    }

    pub fn invalidate_all(&self) {
        info!("Invalidating entire cache");
        self.ctx.dispatch(CacheAction::InvalidateAll);
    }

    async fn load(
        &self,
        center: &CoordId,
        depth: u32,
        kind: RegionKind,
    ) -> HoneycombResult<LoadOutcome> {
        if self.is_region_loaded(center, depth) {
            debug!(center = %center, depth, "Region fresh, skipping load");
            return Ok(LoadOutcome::cached(center, depth));
        }

        let _loading = LoadingGuard::engage(&self.ctx);
        match self.fetch(center, depth).await {
            Ok(items) => {
                let count = items.len();
                self.fold(center, items, depth, kind);
                debug!(center = %center, depth, items = count, "Loaded region");
                Ok(LoadOutcome::fetched(center, depth, count))
            }
            Err(err) => {
                warn!(center = %center, depth, error = %err, "Region load failed");
                self.ctx.dispatch(CacheAction::SetError(Some(err.clone())));
                Err(err)
            }
        }
    }

    async fn fetch(&self, center: &CoordId, depth: u32) -> HoneycombResult<Vec<TileRecord>> {
        let timeout_ms = self.ctx.state().config.request_timeout_ms;
        with_timeout(
            "fetch_items_for_coordinate",
            timeout_ms,
            self.query.fetch_items_for_coordinate(center, depth),
        )
        .await
    }

    fn fold(&self, center: &CoordId, items: Vec<TileRecord>, depth: u32, kind: RegionKind) {
        let loaded_at = self.ctx.now_ms();
        let action = match kind {
            RegionKind::Region => CacheAction::LoadRegion {
                center: center.clone(),
                items,
                depth,
                loaded_at,
            },
            RegionKind::Children => CacheAction::LoadChildren {
                parent: center.clone(),
                items,
                depth,
                loaded_at,
            },
        };
        self.ctx.dispatch(action);
    }
}

impl std::fmt::Debug for RegionLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionLoader").finish_non_exhaustive()
    }
}
