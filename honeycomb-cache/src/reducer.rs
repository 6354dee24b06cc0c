//! Pure transition function for the cache state.
//!
//! `apply` never performs I/O and never reads the clock; epochs travel inside
//! the actions.

use crate::action::CacheAction;
use crate::state::{CacheState, ExpandedSet, RegionDescriptor};
use honeycomb_core::{CoordId, EpochMs, TileRecord};

/// Apply one action, producing the next state.
pub fn apply(mut state: CacheState, action: CacheAction) -> CacheState {
    match action {
        CacheAction::LoadRegion {
            center,
            items,
            depth,
            loaded_at,
        } => fold_region(&mut state, center, items, depth, loaded_at),
        CacheAction::LoadChildren {
            parent,
            items,
            depth,
            loaded_at,
        } => fold_region(&mut state, parent, items, depth, loaded_at),
        CacheAction::UpsertItems { items, updated_at } => {
            fold_items(&mut state, items);
            bump_epoch(&mut state, updated_at);
        }
        CacheAction::SetCenter(center) => {
            state.current_center = Some(center);
        }
        CacheAction::SetExpanded(ids) => {
            state.expanded = ids.into_iter().collect::<ExpandedSet>();
        }
        CacheAction::ToggleExpanded(id) => {
            state.expanded.toggle(&id);
        }
        CacheAction::SetLoading(loading) => {
            state.is_loading = loading;
        }
        CacheAction::SetError(error) => {
            state.last_error = error;
        }
        CacheAction::InvalidateRegion(center) => {
            state.region_index.remove(&center);
        }
        CacheAction::InvalidateAll => {
            state.region_index.clear();
            state.items_by_coordinate.clear();
        }
        CacheAction::UpdateConfig(patch) => {
            state.config = state.config.merged(&patch);
        }
        CacheAction::RemoveItem(coord_id) => {
            state.items_by_coordinate.remove(&coord_id);
        }
    }
    state
}

fn fold_region(
    state: &mut CacheState,
    center: CoordId,
    items: Vec<TileRecord>,
    depth: u32,
    loaded_at: EpochMs,
) {
    let members = items.iter().map(|tile| tile.coord_id.clone()).collect();
    fold_items(state, items);
    state.region_index.insert(
        center.clone(),
        RegionDescriptor {
            center,
            depth_loaded: depth,
            loaded_at,
            members,
        },
    );
    state.last_error = None;
    bump_epoch(state, loaded_at);
}

fn fold_items(state: &mut CacheState, items: Vec<TileRecord>) {
    for tile in items {
        state.items_by_coordinate.insert(tile.coord_id.clone(), tile);
    }
}

fn bump_epoch(state: &mut CacheState, epoch: EpochMs) {
    state.last_updated_epoch = state.last_updated_epoch.max(epoch);
}

#[cfg(test)]
mod tests {
    use super::*;
    use honeycomb_core::{CacheConfigPatch, HoneycombError};
    use proptest::prelude::*;

    fn tile(coord: &str, id: &str) -> TileRecord {
        let coord_id = CoordId::parse(coord).unwrap();
        TileRecord {
            parent_coord_id: coord_id.parent(),
            depth: coord_id.depth().unwrap() as u32,
            coord_id,
            persistent_id: id.to_string(),
            owner_id: "owner-1".to_string(),
            title: format!("tile {id}"),
            description: String::new(),
            link: String::new(),
            color_token: "zinc-50".to_string(),
        }
    }

    fn load(center: &str, items: Vec<TileRecord>, loaded_at: EpochMs) -> CacheAction {
        CacheAction::LoadRegion {
            center: CoordId::from_raw(center),
            items,
            depth: 2,
            loaded_at,
        }
    }

    #[test]
    fn test_load_region_folds_without_dropping_other_items() {
        let state = apply(CacheState::default(), load("1,0", vec![tile("1,0", "1")], 10));
        let state = apply(state, load("1,0:1", vec![tile("1,0:1", "2")], 20));

        assert_eq!(state.items_by_coordinate.len(), 2);
        assert_eq!(state.region_index.len(), 2);
        assert_eq!(state.last_updated_epoch, 20);
        let region = state.region(&CoordId::from_raw("1,0:1")).unwrap();
        assert_eq!(region.members, vec![CoordId::from_raw("1,0:1")]);
        assert_eq!(region.depth_loaded, 2);
    }

    #[test]
    fn test_load_region_clears_last_error() {
        let state = apply(
            CacheState::default(),
            CacheAction::SetError(Some(HoneycombError::network("down"))),
        );
        assert!(state.last_error.is_some());
        let state = apply(state, load("1,0", vec![], 5));
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_same_coordinate_last_write_wins() {
        let mut newer = tile("1,0", "1");
        newer.title = "newer".to_string();
        let state = apply(CacheState::default(), load("1,0", vec![tile("1,0", "1")], 1));
        let state = apply(state, load("1,0", vec![newer.clone()], 2));
        assert_eq!(state.item(&newer.coord_id), Some(&newer));
    }

    #[test]
    fn test_upsert_leaves_region_index_alone() {
        let state = apply(
            CacheState::default(),
            CacheAction::UpsertItems {
                items: vec![tile("1,0:3", "9")],
                updated_at: 7,
            },
        );
        assert!(state.region_index.is_empty());
        assert_eq!(state.items_by_coordinate.len(), 1);
        assert_eq!(state.last_updated_epoch, 7);
    }

    #[test]
    fn test_invalidate_region_is_idempotent() {
        let state = apply(CacheState::default(), load("1,0", vec![tile("1,0", "1")], 1));
        let once = apply(state, CacheAction::InvalidateRegion(CoordId::from_raw("1,0")));
        let twice = apply(
            once.clone(),
            CacheAction::InvalidateRegion(CoordId::from_raw("1,0")),
        );
        assert_eq!(once, twice);
        assert!(once.region_index.is_empty());
        assert_eq!(once.items_by_coordinate.len(), 1);
    }

    #[test]
    fn test_invalidate_all_clears_items_and_regions() {
        let state = apply(CacheState::default(), load("1,0", vec![tile("1,0", "1")], 1));
        let state = apply(state, CacheAction::SetCenter(CoordId::from_raw("1,0")));
        let state = apply(state, CacheAction::InvalidateAll);
        assert!(state.items_by_coordinate.is_empty());
        assert!(state.region_index.is_empty());
        assert_eq!(state.current_center, Some(CoordId::from_raw("1,0")));
    }

    #[test]
    fn test_set_expanded_dedupes() {
        let state = apply(
            CacheState::default(),
            CacheAction::SetExpanded(vec!["a".into(), "b".into(), "a".into()]),
        );
        assert_eq!(state.expanded.to_vec(), vec!["a", "b"]);
    }

    #[test]
    fn test_toggle_expanded_round_trip() {
        let start = apply(
            CacheState::default(),
            CacheAction::SetExpanded(vec!["1".into()]),
        );
        let toggled = apply(start.clone(), CacheAction::ToggleExpanded("2".into()));
        assert!(toggled.expanded.contains("2"));
        let back = apply(toggled, CacheAction::ToggleExpanded("2".into()));
        assert_eq!(back, start);
    }

    #[test]
    fn test_update_config_merges_patch() {
        let state = apply(
            CacheState::default(),
            CacheAction::UpdateConfig(CacheConfigPatch {
                max_depth: Some(5),
                ..Default::default()
            }),
        );
        assert_eq!(state.config.max_depth, 5);
        assert!(state.config.optimistic_enabled);
    }

    #[test]
    fn test_remove_item_keeps_region_membership() {
        let state = apply(CacheState::default(), load("1,0", vec![tile("1,0", "1")], 1));
        let state = apply(state, CacheAction::RemoveItem(CoordId::from_raw("1,0")));
        assert!(state.items_by_coordinate.is_empty());
        assert_eq!(
            state.region(&CoordId::from_raw("1,0")).unwrap().members.len(),
            1
        );
    }

    #[test]
    fn test_loading_flag_does_not_touch_items() {
        let state = apply(CacheState::default(), load("1,0", vec![tile("1,0", "1")], 1));
        let loading = apply(state.clone(), CacheAction::SetLoading(true));
        assert!(loading.is_loading);
        assert_eq!(loading.items_by_coordinate, state.items_by_coordinate);
    }

    proptest! {
        #[test]
        fn prop_toggle_twice_restores_expanded(
            expanded in prop::collection::vec("[a-z0-9]{1,3}", 0..8),
            id in "[a-z0-9]{1,3}",
        ) {
            let start = apply(CacheState::default(), CacheAction::SetExpanded(expanded));
            let once = apply(start.clone(), CacheAction::ToggleExpanded(id.clone()));
            prop_assert_ne!(once.expanded.contains(&id), start.expanded.contains(&id));
            let twice = apply(once, CacheAction::ToggleExpanded(id.clone()));

            let mut before = start.expanded.to_vec();
            let mut after = twice.expanded.to_vec();
            if !start.expanded.contains(&id) {
                prop_assert_eq!(&after, &before);
            }
            before.sort();
            after.sort();
            prop_assert_eq!(after, before);
        }
    }
}
