//! The cache state aggregate.
//!
//! Owned by the [`CacheStore`](crate::store::CacheStore); everyone else sees
//! immutable snapshots behind an `Arc`.

use honeycomb_core::{CacheConfig, CoordId, Coordinate, EpochMs, HoneycombError, TileRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What was loaded around a center, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDescriptor {
    pub center: CoordId,
    pub depth_loaded: u32,
    pub loaded_at: EpochMs,
    /// Coordinates present when the region was folded in. May drift after
    /// removals; check existence before use.
    pub members: Vec<CoordId>,
}

impl RegionDescriptor {
    pub fn age_ms(&self, now: EpochMs) -> i64 {
        now - self.loaded_at
    }

    /// Fresh iff `now - loaded_at <= max_age_ms` and enough depth was loaded.
    pub fn is_fresh(&self, now: EpochMs, max_age_ms: u64, requested_depth: u32) -> bool {
        self.age_ms(now) <= max_age_ms as i64 && self.depth_loaded >= requested_depth
    }
}

/// Insertion-ordered set of persistent ids.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpandedSet(Vec<String>);

impl ExpandedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|existing| existing == id)
    }

    /// Append `id` unless already present. Returns whether it was added.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.contains(&id) {
            return false;
        }
        self.0.push(id);
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|existing| existing != id);
        self.0.len() != before
    }

    /// Remove `id` if present, insert it otherwise.
    pub fn toggle(&mut self, id: &str) {
        if !self.remove(id) {
            self.0.push(id.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl<S: Into<String>> FromIterator<S> for ExpandedSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = ExpandedSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

/// Single source of truth for the cached view of the remote tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CacheState {
    pub items_by_coordinate: BTreeMap<CoordId, TileRecord>,
    pub region_index: BTreeMap<CoordId, RegionDescriptor>,
    pub current_center: Option<CoordId>,
    pub expanded: ExpandedSet,
    pub is_loading: bool,
    pub last_error: Option<HoneycombError>,
    pub last_updated_epoch: EpochMs,
    pub config: CacheConfig,
}

impl CacheState {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn item(&self, coord_id: &CoordId) -> Option<&TileRecord> {
        self.items_by_coordinate.get(coord_id)
    }

    pub fn region(&self, center: &CoordId) -> Option<&RegionDescriptor> {
        self.region_index.get(center)
    }

    /// Whether the region at `center` can be trusted for `depth` generations.
    pub fn is_region_fresh(&self, center: &CoordId, depth: u32, now: EpochMs) -> bool {
        self.region(center)
            .map(|region| region.is_fresh(now, self.config.max_age_ms, depth))
            .unwrap_or(false)
    }

    /// Current coordinate of the tile with `persistent_id`, if loaded.
    pub fn coord_for_persistent_id(&self, persistent_id: &str) -> Option<&CoordId> {
        self.items_by_coordinate
            .values()
            .find(|tile| tile.persistent_id == persistent_id)
            .map(|tile| &tile.coord_id)
    }

    /// Loaded tiles strictly below `root`, shallowest first.
    pub fn descendants_of(&self, root: &Coordinate) -> Vec<&TileRecord> {
        let mut found: Vec<(usize, &TileRecord)> = self
            .items_by_coordinate
            .values()
            .filter_map(|tile| {
                let coordinate = tile.coord_id.coordinate().ok()?;
                root.is_ancestor_of(&coordinate)
                    .then_some((coordinate.depth(), tile))
            })
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.coord_id.cmp(&b.1.coord_id)));
        found.into_iter().map(|(_, tile)| tile).collect()
    }

    /// Regions loaded within the last `window_ms` that are still fresh.
    pub fn recent_regions(&self, now: EpochMs, window_ms: u64) -> Vec<&RegionDescriptor> {
        self.region_index
            .values()
            .filter(|region| {
                region.age_ms(now) <= window_ms as i64
                    && region.is_fresh(now, self.config.max_age_ms, 0)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn region(loaded_at: EpochMs, depth_loaded: u32) -> RegionDescriptor {
        RegionDescriptor {
            center: CoordId::from_raw("1,0"),
            depth_loaded,
            loaded_at,
            members: vec![],
        }
    }

    #[test]
    fn test_expanded_set_rejects_duplicates() {
        let mut set = ExpandedSet::new();
        assert!(set.insert("a"));
        assert!(!set.insert("a"));
        assert!(set.insert("b"));
        assert_eq!(set.as_slice(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_expanded_set_from_iter_keeps_first_occurrence() {
        let set: ExpandedSet = ["b", "a", "b", "c", "a"].into_iter().collect();
        assert_eq!(set.to_vec(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_expanded_toggle_twice_is_identity() {
        let mut set: ExpandedSet = ["1", "2"].into_iter().collect();
        let original = set.clone();
        set.toggle("3");
        assert!(set.contains("3"));
        set.toggle("3");
        assert_eq!(set, original);
    }

    #[test]
    fn test_region_freshness_boundaries() {
        let r = region(1_000, 2);
        assert!(r.is_fresh(1_000 + 500, 500, 2));
        assert!(!r.is_fresh(1_000 + 501, 500, 2));
        assert!(!r.is_fresh(1_000, 500, 3));
        assert!(r.is_fresh(1_000, 500, 1));
    }

    #[test]
    fn test_missing_region_is_never_fresh() {
        let state = CacheState::default();
        assert!(!state.is_region_fresh(&CoordId::from_raw("1,0"), 0, 0));
    }

    proptest! {
        #[test]
        fn prop_staleness_matches_definition(
            loaded_at in 0i64..1_000_000,
            elapsed in 0i64..1_000_000,
            max_age in 0u64..1_000_000,
            depth_loaded in 0u32..6,
            requested in 0u32..6,
        ) {
            let r = region(loaded_at, depth_loaded);
            let now = loaded_at + elapsed;
            let expected = elapsed <= max_age as i64 && depth_loaded >= requested;
            prop_assert_eq!(r.is_fresh(now, max_age, requested), expected);
        }
    }
}
