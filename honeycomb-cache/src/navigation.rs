//! Center changes, expanded-set pruning and navigation history.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use honeycomb_core::{CoordId, Coordinate, HoneycombResult};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::action::CacheAction;
use crate::loader::{LoadOutcome, RegionLoader};
use crate::state::CacheState;
use crate::store::CacheContext;

/// Most recent centers remembered for [`NavigationController::back`].
pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigateOptions {
    /// Remember the previous center so `back` can return to it.
    pub push_history: bool,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self { push_history: true }
    }
}

/// What a navigation changed.
#[derive(Debug)]
pub struct NavigationOutcome {
    pub center: CoordId,
    pub expanded: Vec<String>,
    pub pruned: Vec<String>,
    /// Background prefetch, when the new center was not cached yet.
    pub prefetch: Option<JoinHandle<()>>,
}

/// Split `state.expanded` into `(kept, pruned)` for a new `center`.
///
/// An entry is kept when its tile cannot be resolved or parsed, or when the
/// tile is the center, an ancestor of the center, or a direct child of it.
pub fn prune_expanded(state: &CacheState, center: &Coordinate) -> (Vec<String>, Vec<String>) {
    let mut kept = Vec::new();
    let mut pruned = Vec::new();
    for id in state.expanded.iter() {
        let coordinate = state
            .coord_for_persistent_id(id)
            .and_then(|coord_id| coord_id.coordinate().ok());
        let keep = match coordinate {
            None => true,
            Some(tile) => {
                tile.is_ancestor_of(center)
                    || center
                        .generation_distance(&tile)
                        .is_some_and(|distance| distance <= 1)
            }
        };
        if keep {
            kept.push(id.clone());
        } else {
            pruned.push(id.clone());
        }
    }
    (kept, pruned)
}

/// Moves the center of the view.
pub struct NavigationController {
    ctx: CacheContext,
    loader: Arc<RegionLoader>,
    history: Mutex<VecDeque<CoordId>>,
}

impl NavigationController {
    pub fn new(ctx: CacheContext, loader: Arc<RegionLoader>) -> Self {
        Self {
            ctx,
            loader,
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Center the view on `coord_id`, pruning expansions that fall out of
    /// view and prefetching the region in the background when it is missing.
    pub fn navigate_to(
        &self,
        coord_id: &CoordId,
        options: NavigateOptions,
    ) -> HoneycombResult<NavigationOutcome> {
        let center = coord_id.coordinate()?;
        let center_id = center.to_id();

        let state = self.ctx.state();
        let (kept, pruned) = prune_expanded(&state, &center);
        if !pruned.is_empty() {
            debug!(center = %center_id, pruned = pruned.len(), "Pruning expanded tiles");
            self.ctx.dispatch(CacheAction::SetExpanded(kept.clone()));
        }
        if options.push_history {
            if let Some(previous) = state.current_center.as_ref() {
                if previous != &center_id {
                    self.remember(previous.clone());
                }
            }
        }
        drop(state);

        self.ctx.dispatch(CacheAction::SetCenter(center_id.clone()));

        let state = self.ctx.state();
        let needs_prefetch =
            state.item(&center_id).is_none() || state.region(&center_id).is_none();
        drop(state);

        let prefetch = if needs_prefetch {
            self.spawn_prefetch(center_id.clone())
        } else {
            None
        };

        Ok(NavigationOutcome {
            center: center_id,
            expanded: kept,
            pruned,
            prefetch,
        })
    }

    /// Change the center without pruning, history or prefetching.
    pub fn update_center_only(&self, coord_id: &CoordId) -> HoneycombResult<()> {
        let center = coord_id.coordinate()?;
        self.ctx.dispatch(CacheAction::SetCenter(center.to_id()));
        Ok(())
    }

    pub async fn prefetch(&self, coord_id: &CoordId) -> HoneycombResult<LoadOutcome> {
        self.loader.prefetch(coord_id).await
    }

    /// Return to the previous center. `Ok(None)` when history is empty.
    pub fn back(&self) -> HoneycombResult<Option<NavigationOutcome>> {
        let previous = self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_back();
        match previous {
            Some(coord_id) => self
                .navigate_to(&coord_id, NavigateOptions { push_history: false })
                .map(Some),
            None => Ok(None),
        }
    }

    /// Previous centers, oldest first.
    pub fn history(&self) -> Vec<CoordId> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn remember(&self, coord_id: CoordId) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push_back(coord_id);
        while history.len() > HISTORY_LIMIT {
            history.pop_front();
        }
    }

    fn spawn_prefetch(&self, center: CoordId) -> Option<JoinHandle<()>> {
        let Ok(handle) = Handle::try_current() else {
            warn!(center = %center, "No async runtime, skipping prefetch");
            return None;
        };
        let loader = self.loader.clone();
        Some(handle.spawn(async move {
            if let Err(err) = loader.prefetch(&center).await {
                debug!(center = %center, error = %err, "Background prefetch failed");
            }
        }))
    }
}

impl std::fmt::Debug for NavigationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationController")
            .field("history", &self.history())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::apply;
    use honeycomb_core::{Direction, TileRecord};
    use honeycomb_test_utils::generators::{arb_coordinate_with_depth, arb_direction, arb_tile};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn tile(coord: &str, id: &str) -> TileRecord {
        let coord_id = CoordId::parse(coord).unwrap();
        TileRecord {
            parent_coord_id: coord_id.parent(),
            depth: coord_id.depth().unwrap() as u32,
            coord_id,
            persistent_id: id.to_string(),
            owner_id: "owner-1".to_string(),
            title: id.to_string(),
            description: String::new(),
            link: String::new(),
            color_token: "zinc-50".to_string(),
        }
    }

    fn scenario() -> CacheState {
        let state = apply(
            CacheState::default(),
            CacheAction::UpsertItems {
                items: vec![
                    tile("1,0:1", "1"),
                    tile("1,0:1,2", "2"),
                    tile("1,0:1,2,3", "3"),
                    tile("1,0:1,2,3,4", "4"),
                    tile("1,0:2", "5"),
                    tile("1,0:2,3,4,5", "6"),
                ],
                updated_at: 1,
            },
        );
        apply(
            state,
            CacheAction::SetExpanded(["1", "2", "3", "4", "5", "6"].map(String::from).to_vec()),
        )
    }

    #[test]
    fn test_default_options_record_history() {
        assert!(NavigateOptions::default().push_history);
    }

    #[test]
    fn test_prune_keeps_ancestors_center_and_children() {
        let state = scenario();
        let (kept, pruned) = prune_expanded(&state, &Coordinate::parse("1,0:1,2").unwrap());
        assert_eq!(kept, vec!["1", "2", "3"]);
        assert_eq!(pruned, vec!["4", "5", "6"]);
    }

    #[test]
    fn test_prune_keeps_unresolvable_ids() {
        let state = apply(
            scenario(),
            CacheAction::SetExpanded(vec!["ghost".into(), "6".into()]),
        );
        let (kept, pruned) = prune_expanded(&state, &Coordinate::parse("1,0:1").unwrap());
        assert_eq!(kept, vec!["ghost"]);
        assert_eq!(pruned, vec!["6"]);
    }

    #[test]
    fn test_prune_ignores_other_scopes() {
        let state = apply(
            CacheState::default(),
            CacheAction::UpsertItems {
                items: vec![tile("2,0:1", "x")],
                updated_at: 1,
            },
        );
        let state = apply(state, CacheAction::SetExpanded(vec!["x".into()]));
        let (kept, pruned) = prune_expanded(&state, &Coordinate::parse("1,0:1,2").unwrap());
        assert!(kept.is_empty());
        assert_eq!(pruned, vec!["x"]);
    }

    /// A coordinate sharing the first `keep` steps of `center`'s path.
    fn relative(
        center: &Coordinate,
        keep: usize,
        tail: &[Direction],
        other_scope: bool,
    ) -> Coordinate {
        let mut path = center.path[..keep.min(center.depth())].to_vec();
        path.extend_from_slice(tail);
        let scope_b = if other_scope {
            center.scope_b + 1
        } else {
            center.scope_b
        };
        Coordinate::new(center.scope_a, scope_b, path)
    }

    fn arb_layout() -> impl Strategy<Value = (Coordinate, Vec<Coordinate>)> {
        (
            arb_coordinate_with_depth(4),
            prop::collection::vec(
                (
                    0usize..5,
                    prop::collection::vec(arb_direction(), 0..4),
                    prop::bool::weighted(0.2),
                ),
                0..16,
            ),
            prop::collection::vec(arb_tile(), 0..4),
        )
            .prop_map(|(center, specs, far)| {
                let mut coords: Vec<Coordinate> = specs
                    .iter()
                    .map(|(keep, tail, other)| relative(&center, *keep, tail, *other))
                    .collect();
                coords.extend(far.iter().filter_map(|t| t.coord_id.coordinate().ok()));
                (center, coords)
            })
    }

    proptest! {
        #[test]
        fn prop_prune_keeps_exactly_the_view((center, coords) in arb_layout()) {
            let unique: BTreeMap<String, Coordinate> =
                coords.into_iter().map(|c| (c.to_string(), c)).collect();
            let by_id: BTreeMap<String, Coordinate> = unique
                .values()
                .enumerate()
                .map(|(i, c)| (format!("t{i}"), c.clone()))
                .collect();
            let items = by_id
                .iter()
                .map(|(id, c)| tile(&c.to_string(), id))
                .collect();
            let state = apply(
                CacheState::default(),
                CacheAction::UpsertItems { items, updated_at: 1 },
            );
            let ids: Vec<String> = by_id.keys().cloned().collect();
            let state = apply(state, CacheAction::SetExpanded(ids.clone()));

            let (kept, pruned) = prune_expanded(&state, &center);
            prop_assert_eq!(kept.len() + pruned.len(), ids.len());

            let in_view = |c: &Coordinate| {
                c == &center
                    || c.is_ancestor_of(&center)
                    || center.generation_distance(c) == Some(1)
            };
            for id in &kept {
                prop_assert!(in_view(&by_id[id]), "{} kept for center {}", by_id[id], center);
            }
            for id in &pruned {
                let c = &by_id[id];
                prop_assert!(!in_view(c), "{} pruned for center {}", c, center);
            }
        }
    }
}
