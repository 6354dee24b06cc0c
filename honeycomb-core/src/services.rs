//! Contracts for the remote services the cache talks to.
//!
//! The cache never knows how a service is implemented. Implementations must
//! classify failures into [`HoneycombError`] variants: `Service(Unauthorized |
//! NotFound | ..)`, `Timeout`, or `Network` for transport failures.
//!
//! [`HoneycombError`]: crate::HoneycombError

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::coordinate::CoordId;
use crate::error::HoneycombResult;
use crate::tile::{TileFields, TilePatch, TileRecord};

/// Read side of the remote tile store.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Every tile at or below `center`, down to `max_depth` generations.
    async fn fetch_items_for_coordinate(
        &self,
        center: &CoordId,
        max_depth: u32,
    ) -> HoneycombResult<Vec<TileRecord>>;

    async fn get_item_by_coordinate(&self, coord_id: &CoordId)
        -> HoneycombResult<Option<TileRecord>>;

    async fn get_root_item_by_id(&self, persistent_id: &str) -> HoneycombResult<Option<TileRecord>>;

    async fn get_descendants(&self, persistent_id: &str) -> HoneycombResult<Vec<TileRecord>>;
}

/// Parameters for creating a tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTileParams {
    pub coord_id: CoordId,
    /// Persistent id of the parent tile, `None` for roots.
    pub parent_id: Option<String>,
    pub fields: TileFields,
}

/// Parameters for editing a tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTileParams {
    pub coord_id: CoordId,
    pub persistent_id: String,
    pub patch: TilePatch,
}

/// Parameters for deleting a tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTileParams {
    pub coord_id: CoordId,
    pub persistent_id: String,
}

/// Server answer to a move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub moved_id: String,
    /// Records whose coordinates changed, at their new positions.
    pub affected_records: Vec<TileRecord>,
}

/// Write side of the remote tile store.
#[async_trait]
pub trait MutationService: Send + Sync {
    async fn create_item(&self, params: CreateTileParams) -> HoneycombResult<TileRecord>;

    async fn update_item(&self, params: UpdateTileParams) -> HoneycombResult<TileRecord>;

    async fn delete_item(&self, params: DeleteTileParams) -> HoneycombResult<()>;

    async fn move_item(&self, old_coord: &CoordId, new_coord: &CoordId)
        -> HoneycombResult<MoveOutcome>;
}

/// Optional key-value persistence.
///
/// Callers must keep working when `is_available` is false; every call may be
/// a no-op in that case.
#[async_trait]
pub trait PersistenceService: Send + Sync {
    async fn save(&self, key: &str, blob: &str) -> HoneycombResult<()>;

    async fn load(&self, key: &str) -> HoneycombResult<Option<String>>;

    async fn remove(&self, key: &str) -> HoneycombResult<()>;

    fn is_available(&self) -> bool;
}
