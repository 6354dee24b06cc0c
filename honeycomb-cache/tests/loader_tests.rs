mod common;

use common::{coord, harness};
use honeycomb_core::{HoneycombError, TilePatch};

#[tokio::test]
async fn test_load_then_reload_within_max_age_uses_cache() {
    let h = harness();
    let first = h.cache.load_region(&coord("1,0"), Some(2)).await.unwrap();
    assert!(!first.from_cache);
    assert_eq!(first.items_loaded, 4);

    h.clock.advance(299_000);
    let second = h.cache.load_region(&coord("1,0"), Some(2)).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(h.query.fetch_calls(), 1);

    h.clock.advance(2_000);
    let third = h.cache.load_region(&coord("1,0"), Some(2)).await.unwrap();
    assert!(!third.from_cache);
    assert_eq!(h.query.fetch_calls(), 2);
}

#[tokio::test]
async fn test_loading_flag_cleared_after_failure() {
    let h = harness();
    h.query.fail_next(HoneycombError::network("connection refused"));

    assert!(h.cache.load_region(&coord("1,0"), None).await.is_err());
    assert!(!h.cache.is_loading());
    assert_eq!(
        h.cache.last_error(),
        Some(HoneycombError::network("connection refused"))
    );

    // A later success clears the error.
    h.cache.load_region(&coord("1,0"), None).await.unwrap();
    assert!(h.cache.last_error().is_none());
}

#[tokio::test]
async fn test_loading_flag_visible_while_in_flight() {
    let h = harness();
    h.query.hold();

    let cache = h.cache.clone();
    let load = tokio::spawn(async move { cache.load_region(&coord("1,0"), None).await });
    h.query.wait_for_calls(1).await;
    assert!(h.cache.is_loading());

    h.query.open();
    load.await.unwrap().unwrap();
    assert!(!h.cache.is_loading());
}

#[tokio::test]
async fn test_cancelled_load_clears_loading_flag() {
    let h = harness();
    h.query.hold();

    let cache = h.cache.clone();
    let load = tokio::spawn(async move { cache.load_region(&coord("1,0"), None).await });
    h.query.wait_for_calls(1).await;
    assert!(h.cache.is_loading());

    load.abort();
    assert!(load.await.unwrap_err().is_cancelled());
    assert!(!h.cache.is_loading());
}

#[tokio::test]
async fn test_load_folds_into_state_current_at_resolution() {
    let h = harness();
    h.query.hold();

    let cache = h.cache.clone();
    let load = tokio::spawn(async move { cache.load_region(&coord("1,0:1"), Some(1)).await });
    h.query.wait_for_calls(1).await;

    // State changes while the load is suspended.
    h.cache.set_expanded(vec!["5".to_string()]);
    h.cache.update_center_only(&coord("1,0:2")).unwrap();

    h.query.open();
    load.await.unwrap().unwrap();

    let state = h.cache.state();
    assert_eq!(state.expanded.to_vec(), vec!["5"]);
    assert_eq!(state.current_center, Some(coord("1,0:2")));
    assert!(state.item(&coord("1,0:1")).is_some());
    assert!(state.item(&coord("1,0:1,2")).is_some());
}

#[tokio::test]
async fn test_older_response_landing_last_wins() {
    let h = harness();
    h.cache.load_region(&coord("1,0:1"), Some(2)).await.unwrap();
    h.cache.invalidate_region(&coord("1,0:1"));

    h.query.hold();
    let cache = h.cache.clone();
    let stale_load = tokio::spawn(async move { cache.load_region(&coord("1,0:1"), Some(2)).await });
    h.query.wait_for_calls(2).await;

    let edited = h
        .cache
        .update_item(&coord("1,0:1,2"), TilePatch::title("edited"))
        .await
        .unwrap();
    assert_eq!(h.cache.item(&coord("1,0:1,2")), Some(edited));

    h.query.open();
    stale_load.await.unwrap().unwrap();

    let landed = h.cache.item(&coord("1,0:1,2")).unwrap();
    assert_eq!(landed.title, "Tile 2");
}

#[tokio::test]
async fn test_invalidate_all_drops_items_and_forces_refetch() {
    let h = harness();
    h.cache.load_region(&coord("1,0"), None).await.unwrap();
    assert!(!h.cache.items().is_empty());

    h.cache.invalidate_all();
    assert!(h.cache.items().is_empty());
    assert!(!h.cache.is_region_loaded(&coord("1,0"), 1));

    let outcome = h.cache.load_region(&coord("1,0"), None).await.unwrap();
    assert!(!outcome.from_cache);
}

#[tokio::test]
async fn test_load_children_defaults_to_two_generations() {
    let h = harness();
    let outcome = h.cache.load_children(&coord("1,0:1"), None).await.unwrap();
    assert_eq!(outcome.depth, 2);
    assert_eq!(outcome.items_loaded, 3);
    assert!(h.cache.item(&coord("1,0:1,2,3,4")).is_none());
}

#[tokio::test]
async fn test_prefetch_populates_without_flags() {
    let h = harness();
    let mut changes = h.cache.subscribe();
    let outcome = h.cache.prefetch(&coord("1,0:2")).await.unwrap();
    assert!(!outcome.from_cache);
    assert!(changes.has_changed().unwrap());

    let state = changes.borrow_and_update().clone();
    assert!(!state.is_loading);
    assert!(state.region(&coord("1,0:2")).is_some());
}
