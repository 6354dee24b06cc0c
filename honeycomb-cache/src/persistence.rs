//! Snapshot persistence for the cache.
//!
//! Saves the items, expanded set and center as one JSON blob. Regions are
//! not persisted, so everything restored is stale and gets refetched on the
//! next load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use honeycomb_core::{
    CoordId, EpochMs, HoneycombResult, PersistenceError, PersistenceService, TileRecord,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::action::CacheAction;
use crate::store::CacheContext;

/// Storage key for the cache snapshot.
pub const STATE_KEY: &str = "honeycomb:cache:v1";

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    pub center: Option<CoordId>,
    pub expanded: Vec<String>,
    pub items: Vec<TileRecord>,
    pub saved_at: EpochMs,
}

/// Saves and restores the cache through a [`PersistenceService`].
pub struct StatePersister {
    ctx: CacheContext,
    service: Arc<dyn PersistenceService>,
}

impl StatePersister {
    pub fn new(ctx: CacheContext, service: Arc<dyn PersistenceService>) -> Self {
        Self { ctx, service }
    }

    /// Write the current snapshot. Provisional tiles are left out.
    /// Returns `Ok(false)` when persistence is unavailable.
    pub async fn save(&self) -> HoneycombResult<bool> {
        if !self.service.is_available() {
            debug!("Persistence unavailable, skipping save");
            return Ok(false);
        }
        let snapshot = {
            let state = self.ctx.state();
            PersistedState {
                version: SNAPSHOT_VERSION,
                center: state.current_center.clone(),
                expanded: state.expanded.to_vec(),
                items: state
                    .items_by_coordinate
                    .values()
                    .filter(|tile| !tile.is_provisional())
                    .cloned()
                    .collect(),
                saved_at: self.ctx.now_ms(),
            }
        };
        let blob = serde_json::to_string(&snapshot).map_err(|e| PersistenceError::Serde {
            reason: e.to_string(),
        })?;
        self.service.save(STATE_KEY, &blob).await?;
        debug!(items = snapshot.items.len(), "Saved cache snapshot");
        Ok(true)
    }

    /// Fold a saved snapshot into the cache. A corrupt or outdated snapshot
    /// is removed and reported as `Ok(false)`.
    pub async fn restore(&self) -> HoneycombResult<bool> {
        if !self.service.is_available() {
            return Ok(false);
        }
        let Some(blob) = self.service.load(STATE_KEY).await? else {
            return Ok(false);
        };
        let snapshot = match serde_json::from_str::<PersistedState>(&blob) {
            Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => snapshot,
            Ok(snapshot) => {
                warn!(version = snapshot.version, "Discarding snapshot with unknown version");
                self.service.remove(STATE_KEY).await?;
                return Ok(false);
            }
            Err(err) => {
                warn!(error = %err, "Discarding unreadable snapshot");
                self.service.remove(STATE_KEY).await?;
                return Ok(false);
            }
        };

        let count = snapshot.items.len();
        self.ctx.dispatch(CacheAction::UpsertItems {
            items: snapshot.items,
            updated_at: snapshot.saved_at,
        });
        self.ctx.dispatch(CacheAction::SetExpanded(snapshot.expanded));
        if let Some(center) = snapshot.center {
            self.ctx.dispatch(CacheAction::SetCenter(center));
        }
        debug!(items = count, "Restored cache snapshot");
        Ok(true)
    }

    pub async fn clear(&self) -> HoneycombResult<()> {
        if !self.service.is_available() {
            return Ok(());
        }
        self.service.remove(STATE_KEY).await
    }
}

impl std::fmt::Debug for StatePersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatePersister").finish_non_exhaustive()
    }
}

/// Persistence that is never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPersistence;

#[async_trait]
impl PersistenceService for NoopPersistence {
    async fn save(&self, _key: &str, _blob: &str) -> HoneycombResult<()> {
        Ok(())
    }

    async fn load(&self, _key: &str) -> HoneycombResult<Option<String>> {
        Ok(None)
    }

    async fn remove(&self, _key: &str) -> HoneycombResult<()> {
        Ok(())
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// In-process key-value store.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl PersistenceService for MemoryPersistence {
    async fn save(&self, key: &str, blob: &str) -> HoneycombResult<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), blob.to_string());
        Ok(())
    }

    async fn load(&self, key: &str) -> HoneycombResult<Option<String>> {
        Ok(self.get(key))
    }

    async fn remove(&self, key: &str) -> HoneycombResult<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

fn io_error(key: &str, err: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        key: key.to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl PersistenceService for FilePersistence {
    async fn save(&self, key: &str, blob: &str) -> HoneycombResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(key, e))?;
        tokio::fs::write(self.path_for(key), blob)
            .await
            .map_err(|e| io_error(key, e))?;
        Ok(())
    }

    async fn load(&self, key: &str) -> HoneycombResult<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key, e).into()),
        }
    }

    async fn remove(&self, key: &str) -> HoneycombResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(key, e).into()),
        }
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CacheStore, StateReader};
    use honeycomb_core::SystemClock;
    use honeycomb_test_utils::sample_tree;

    fn seeded_store() -> Arc<CacheStore> {
        let store = Arc::new(CacheStore::default());
        let ctx = CacheContext::from_store(store.clone(), Arc::new(SystemClock));
        ctx.dispatch(CacheAction::LoadRegion {
            center: CoordId::from_raw("1,0"),
            items: sample_tree(),
            depth: 3,
            loaded_at: 100,
        });
        ctx.dispatch(CacheAction::SetExpanded(vec!["1".into(), "2".into()]));
        ctx.dispatch(CacheAction::SetCenter(CoordId::from_raw("1,0:1")));
        store
    }

    #[tokio::test]
    async fn test_round_trip_restores_items_but_not_regions() {
        let service = Arc::new(MemoryPersistence::new());
        let source = seeded_store();
        let saver = StatePersister::new(
            CacheContext::from_store(source.clone(), Arc::new(SystemClock)),
            service.clone(),
        );
        assert!(saver.save().await.unwrap());

        let target = Arc::new(CacheStore::default());
        let restorer = StatePersister::new(
            CacheContext::from_store(target.clone(), Arc::new(SystemClock)),
            service,
        );
        assert!(restorer.restore().await.unwrap());

        let restored = target.current();
        let original = source.current();
        assert_eq!(restored.items_by_coordinate, original.items_by_coordinate);
        assert_eq!(restored.expanded, original.expanded);
        assert_eq!(restored.current_center, original.current_center);
        assert!(restored.region_index.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_discarded() {
        let service = Arc::new(MemoryPersistence::new());
        service.save(STATE_KEY, "{not json").await.unwrap();
        let store = Arc::new(CacheStore::default());
        let persister = StatePersister::new(
            CacheContext::from_store(store.clone(), Arc::new(SystemClock)),
            service.clone(),
        );

        assert!(!persister.restore().await.unwrap());
        assert!(service.get(STATE_KEY).is_none());
        assert!(store.current().items_by_coordinate.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_persistence_is_a_no_op() {
        let persister = StatePersister::new(
            CacheContext::from_store(seeded_store(), Arc::new(SystemClock)),
            Arc::new(NoopPersistence),
        );
        assert!(!persister.save().await.unwrap());
        assert!(!persister.restore().await.unwrap());
    }

    #[tokio::test]
    async fn test_file_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let files = FilePersistence::new(dir.path().join("state"));

        assert_eq!(files.load(STATE_KEY).await.unwrap(), None);
        files.save(STATE_KEY, "{\"a\":1}").await.unwrap();
        assert_eq!(
            files.load(STATE_KEY).await.unwrap().as_deref(),
            Some("{\"a\":1}")
        );
        assert!(dir.path().join("state/honeycomb_cache_v1.json").exists());
        files.remove(STATE_KEY).await.unwrap();
        files.remove(STATE_KEY).await.unwrap();
        assert_eq!(files.load(STATE_KEY).await.unwrap(), None);
    }
}
