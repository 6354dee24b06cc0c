//! The closed set of state transitions.

use honeycomb_core::{CacheConfigPatch, CoordId, EpochMs, HoneycombError, TileRecord};

/// Every change to [`CacheState`](crate::state::CacheState) is one of these,
/// applied by [`apply`](crate::reducer::apply).
#[derive(Debug, Clone, PartialEq)]
pub enum CacheAction {
    /// Fold a region load result and replace the descriptor for `center`.
    LoadRegion {
        center: CoordId,
        items: Vec<TileRecord>,
        depth: u32,
        loaded_at: EpochMs,
    },
    /// Fold a children load result and replace the descriptor for `parent`.
    LoadChildren {
        parent: CoordId,
        items: Vec<TileRecord>,
        depth: u32,
        loaded_at: EpochMs,
    },
    /// Fold records without touching the region index.
    UpsertItems {
        items: Vec<TileRecord>,
        updated_at: EpochMs,
    },
    SetCenter(CoordId),
    /// Replace the expanded set. Duplicates keep their first occurrence.
    SetExpanded(Vec<String>),
    ToggleExpanded(String),
    SetLoading(bool),
    SetError(Option<HoneycombError>),
    InvalidateRegion(CoordId),
    InvalidateAll,
    UpdateConfig(CacheConfigPatch),
    RemoveItem(CoordId),
}

impl CacheAction {
    /// Stable name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheAction::LoadRegion { .. } => "load_region",
            CacheAction::LoadChildren { .. } => "load_children",
            CacheAction::UpsertItems { .. } => "upsert_items",
            CacheAction::SetCenter(_) => "set_center",
            CacheAction::SetExpanded(_) => "set_expanded",
            CacheAction::ToggleExpanded(_) => "toggle_expanded",
            CacheAction::SetLoading(_) => "set_loading",
            CacheAction::SetError(_) => "set_error",
            CacheAction::InvalidateRegion(_) => "invalidate_region",
            CacheAction::InvalidateAll => "invalidate_all",
            CacheAction::UpdateConfig(_) => "update_config",
            CacheAction::RemoveItem(_) => "remove_item",
        }
    }
}
