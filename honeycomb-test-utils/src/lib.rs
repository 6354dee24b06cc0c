//! Honeycomb Test Utilities
//!
//! Shared test infrastructure for the honeycomb workspace:
//! - In-memory mock query and mutation services with fault injection
//! - A manual clock for staleness tests
//! - Tile fixtures for common tree shapes
//! - Proptest generators for coordinates and tiles

pub use honeycomb_core::{
    CacheConfig, Clock, CoordId, Coordinate, CreateTileParams, DeleteTileParams, Direction,
    EpochMs, HoneycombConfig, HoneycombError, HoneycombResult, MoveOutcome, MutationService,
    QueryService, ServiceError, SyncConfig, TileFields, TilePatch, TileRecord, UpdateTileParams,
};

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// CLOCK
// ============================================================================

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: EpochMs) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, now: EpochMs) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> EpochMs {
        self.now.load(Ordering::SeqCst)
    }
}

// ============================================================================
// MOCK BACKEND
// ============================================================================

#[derive(Debug, Default)]
struct BackendInner {
    tiles: BTreeMap<CoordId, TileRecord>,
    next_id: u64,
}

/// In-memory server tree shared by the mock services.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    inner: Arc<Mutex<BackendInner>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tiles(tiles: Vec<TileRecord>) -> Self {
        let backend = Self::new();
        for tile in tiles {
            backend.insert(tile);
        }
        backend
    }

    pub fn insert(&self, tile: TileRecord) {
        lock(&self.inner).tiles.insert(tile.coord_id.clone(), tile);
    }

    pub fn get(&self, coord_id: &CoordId) -> Option<TileRecord> {
        lock(&self.inner).tiles.get(coord_id).cloned()
    }

    pub fn tiles(&self) -> Vec<TileRecord> {
        lock(&self.inner).tiles.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tiles at `root` and below, down to `max_depth` generations.
    fn subtree(&self, root: &Coordinate, max_depth: Option<u32>) -> Vec<TileRecord> {
        lock(&self.inner)
            .tiles
            .values()
            .filter(|tile| {
                let Ok(coordinate) = tile.coord_id.coordinate() else {
                    return false;
                };
                match root.generation_distance(&coordinate) {
                    Some(distance) => max_depth.map_or(true, |max| distance as u32 <= max),
                    None => false,
                }
            })
            .cloned()
            .collect()
    }

    fn mint_id(&self) -> String {
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        format!("srv-{}", inner.next_id)
    }
}

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// Failure, latency and gating controls shared by the mock services.
#[derive(Debug, Default)]
pub struct FaultPlan {
    calls: AtomicUsize,
    fail_next: Mutex<VecDeque<HoneycombError>>,
    fail_always: Mutex<Option<HoneycombError>>,
    fail_for: Mutex<HashMap<CoordId, HoneycombError>>,
    delay_ms: AtomicU64,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FaultPlan {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fail the next call with `error`. Queued errors are used in order.
    pub fn fail_next(&self, error: HoneycombError) {
        lock(&self.fail_next).push_back(error);
    }

    /// Fail every call until cleared with `None`.
    pub fn set_failure(&self, error: Option<HoneycombError>) {
        *lock(&self.fail_always) = error;
    }

    /// Fail every call that targets `coord_id`.
    pub fn fail_for(&self, coord_id: CoordId, error: HoneycombError) {
        lock(&self.fail_for).insert(coord_id, error);
    }

    pub fn set_delay_ms(&self, delay_ms: u64) {
        self.delay_ms.store(delay_ms, Ordering::SeqCst);
    }

    /// Block calls until `release` or `open`.
    pub fn hold(&self) {
        *lock(&self.gate) = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `n` held calls through.
    pub fn release(&self, n: usize) {
        if let Some(gate) = lock(&self.gate).as_ref() {
            gate.add_permits(n);
        }
    }

    /// Stop holding calls and let every waiting call through.
    pub fn open(&self) {
        if let Some(gate) = lock(&self.gate).take() {
            gate.close();
        }
    }

    /// Yield until at least `n` calls have started.
    pub async fn wait_for_calls(&self, n: usize) {
        while self.calls() < n {
            tokio::task::yield_now().await;
        }
    }

    async fn enter(&self, target: Option<&CoordId>) -> HoneycombResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if let Some(error) = lock(&self.fail_next).pop_front() {
            return Err(error);
        }
        if let Some(error) = lock(&self.fail_always).clone() {
            return Err(error);
        }
        if let Some(target) = target {
            if let Some(error) = lock(&self.fail_for).get(target).cloned() {
                return Err(error);
            }
        }
        Ok(())
    }
}

// ============================================================================
// MOCK QUERY SERVICE
// ============================================================================

/// Query service answering from a [`MockBackend`].
#[derive(Debug, Default)]
pub struct MockQueryService {
    backend: MockBackend,
    faults: FaultPlan,
    fetch_calls: AtomicUsize,
}

impl MockQueryService {
    pub fn new(backend: MockBackend) -> Self {
        Self {
            backend,
            faults: FaultPlan::default(),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn backend(&self) -> &MockBackend {
        &self.backend
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Number of `fetch_items_for_coordinate` calls.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, error: HoneycombError) {
        self.faults.fail_next(error);
    }

    pub fn set_failure(&self, error: Option<HoneycombError>) {
        self.faults.set_failure(error);
    }

    pub fn fail_for(&self, coord_id: CoordId, error: HoneycombError) {
        self.faults.fail_for(coord_id, error);
    }

    pub fn set_delay_ms(&self, delay_ms: u64) {
        self.faults.set_delay_ms(delay_ms);
    }

    pub fn hold(&self) {
        self.faults.hold();
    }

    pub fn release(&self, n: usize) {
        self.faults.release(n);
    }

    pub fn open(&self) {
        self.faults.open();
    }

    pub async fn wait_for_calls(&self, n: usize) {
        self.faults.wait_for_calls(n).await;
    }
}

#[async_trait]
impl QueryService for MockQueryService {
    async fn fetch_items_for_coordinate(
        &self,
        center: &CoordId,
        max_depth: u32,
    ) -> HoneycombResult<Vec<TileRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        // Read before waiting: a held call answers with what the server had
        // when the request arrived.
        let items = match center.coordinate() {
            Ok(root) => Ok(self.backend.subtree(&root, Some(max_depth))),
            Err(err) => Err(HoneycombError::from(err)),
        };
        self.faults.enter(Some(center)).await?;
        items
    }

    async fn get_item_by_coordinate(
        &self,
        coord_id: &CoordId,
    ) -> HoneycombResult<Option<TileRecord>> {
        self.faults.enter(Some(coord_id)).await?;
        Ok(self.backend.get(coord_id))
    }

    async fn get_root_item_by_id(&self, persistent_id: &str) -> HoneycombResult<Option<TileRecord>> {
        self.faults.enter(None).await?;
        Ok(self
            .backend
            .tiles()
            .into_iter()
            .find(|tile| tile.persistent_id == persistent_id && tile.parent_coord_id.is_none()))
    }

    async fn get_descendants(&self, persistent_id: &str) -> HoneycombResult<Vec<TileRecord>> {
        self.faults.enter(None).await?;
        let Some(root) = self
            .backend
            .tiles()
            .into_iter()
            .find(|tile| tile.persistent_id == persistent_id)
        else {
            return Ok(Vec::new());
        };
        let coordinate = root.coord_id.coordinate()?;
        Ok(self
            .backend
            .subtree(&coordinate, None)
            .into_iter()
            .filter(|tile| tile.coord_id != root.coord_id)
            .collect())
    }
}

// ============================================================================
// MOCK MUTATION SERVICE
// ============================================================================

/// Mutation service writing to a [`MockBackend`].
#[derive(Debug, Default)]
pub struct MockMutationService {
    backend: MockBackend,
    faults: FaultPlan,
}

impl MockMutationService {
    pub fn new(backend: MockBackend) -> Self {
        Self {
            backend,
            faults: FaultPlan::default(),
        }
    }

    pub fn backend(&self) -> &MockBackend {
        &self.backend
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    pub fn calls(&self) -> usize {
        self.faults.calls()
    }

    pub fn fail_next(&self, error: HoneycombError) {
        self.faults.fail_next(error);
    }

    pub fn set_failure(&self, error: Option<HoneycombError>) {
        self.faults.set_failure(error);
    }

    pub fn hold(&self) {
        self.faults.hold();
    }

    pub fn release(&self, n: usize) {
        self.faults.release(n);
    }

    pub fn open(&self) {
        self.faults.open();
    }

    pub async fn wait_for_calls(&self, n: usize) {
        self.faults.wait_for_calls(n).await;
    }
}

fn conflict(coord_id: &CoordId) -> HoneycombError {
    ServiceError::Rejected {
        code: "CONFLICT".to_string(),
        message: format!("coordinate {} is occupied", coord_id),
    }
    .into()
}

fn not_found(what: impl Into<String>) -> HoneycombError {
    ServiceError::NotFound { what: what.into() }.into()
}

#[async_trait]
impl MutationService for MockMutationService {
    async fn create_item(&self, params: CreateTileParams) -> HoneycombResult<TileRecord> {
        self.faults.enter(Some(&params.coord_id)).await?;
        let coordinate = params.coord_id.coordinate()?;
        if self.backend.get(&params.coord_id).is_some() {
            return Err(conflict(&params.coord_id));
        }
        let parent = match coordinate.parent() {
            Some(parent) => Some(
                self.backend
                    .get(&parent.to_id())
                    .ok_or_else(|| not_found(format!("parent of {}", params.coord_id)))?,
            ),
            None => None,
        };
        let record = TileRecord {
            coord_id: params.coord_id.clone(),
            persistent_id: self.backend.mint_id(),
            parent_coord_id: parent.as_ref().map(|p| p.coord_id.clone()),
            depth: coordinate.depth() as u32,
            owner_id: params
                .fields
                .owner_id
                .or_else(|| parent.map(|p| p.owner_id))
                .unwrap_or_else(|| "owner-1".to_string()),
            title: params.fields.title,
            description: params.fields.description,
            link: params.fields.link,
            color_token: params
                .fields
                .color_token
                .unwrap_or_else(|| "zinc-50".to_string()),
        };
        self.backend.insert(record.clone());
        Ok(record)
    }

    async fn update_item(&self, params: UpdateTileParams) -> HoneycombResult<TileRecord> {
        self.faults.enter(Some(&params.coord_id)).await?;
        let mut record = self
            .backend
            .get(&params.coord_id)
            .filter(|tile| tile.persistent_id == params.persistent_id)
            .ok_or_else(|| not_found(format!("tile {}", params.persistent_id)))?;
        record.apply_patch(&params.patch);
        self.backend.insert(record.clone());
        Ok(record)
    }

    async fn delete_item(&self, params: DeleteTileParams) -> HoneycombResult<()> {
        self.faults.enter(Some(&params.coord_id)).await?;
        let coordinate = params.coord_id.coordinate()?;
        let subtree = self.backend.subtree(&coordinate, None);
        if subtree.is_empty() {
            return Err(not_found(format!("tile {}", params.persistent_id)));
        }
        let mut inner = lock(&self.backend.inner);
        for tile in subtree {
            inner.tiles.remove(&tile.coord_id);
        }
        Ok(())
    }

    async fn move_item(&self, old_coord: &CoordId, new_coord: &CoordId) -> HoneycombResult<MoveOutcome> {
        self.faults.enter(Some(old_coord)).await?;
        let old_root = old_coord.coordinate()?;
        let new_root = new_coord.coordinate()?;
        let moved = self
            .backend
            .get(old_coord)
            .ok_or_else(|| not_found(format!("tile at {}", old_coord)))?;
        if self.backend.get(new_coord).is_some() {
            return Err(conflict(new_coord));
        }
        let subtree = self.backend.subtree(&old_root, None);
        let mut affected = Vec::with_capacity(subtree.len());
        let mut inner = lock(&self.backend.inner);
        for tile in &subtree {
            inner.tiles.remove(&tile.coord_id);
        }
        for tile in subtree {
            let Some(target) = tile
                .coord_id
                .coordinate()
                .ok()
                .and_then(|c| c.rebase(&old_root, &new_root))
            else {
                continue;
            };
            let relocated = tile.relocated(target.to_id());
            inner.tiles.insert(relocated.coord_id.clone(), relocated.clone());
            affected.push(relocated);
        }
        Ok(MoveOutcome {
            moved_id: moved.persistent_id,
            affected_records: affected,
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A tile at `coord` with persistent id `id`.
///
/// # Panics
///
/// Panics if `coord` is not a valid coordinate.
pub fn tile(coord: &str, id: &str) -> TileRecord {
    let coord_id = CoordId::parse(coord).expect("fixture coordinate must parse");
    TileRecord {
        parent_coord_id: coord_id.parent(),
        depth: coord_id.depth().unwrap_or(0) as u32,
        coord_id,
        persistent_id: id.to_string(),
        owner_id: "owner-1".to_string(),
        title: format!("Tile {}", id),
        description: String::new(),
        link: String::new(),
        color_token: "zinc-50".to_string(),
    }
}

/// A root at `1,0` plus two branches:
///
/// ```text
/// root 1,0
/// 1    1,0:1        2 1,0:1,2    3 1,0:1,2,3    4 1,0:1,2,3,4
/// 5    1,0:2        6 1,0:2,3,4,5
/// ```
pub fn sample_tree() -> Vec<TileRecord> {
    vec![
        tile("1,0", "root"),
        tile("1,0:1", "1"),
        tile("1,0:1,2", "2"),
        tile("1,0:1,2,3", "3"),
        tile("1,0:1,2,3,4", "4"),
        tile("1,0:2", "5"),
        tile("1,0:2,3,4,5", "6"),
    ]
}

/// Install a test-writer subscriber once. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("HONEYCOMB_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for honeycomb types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_direction() -> impl Strategy<Value = Direction> {
        prop::sample::select(Direction::ALL.to_vec())
    }

    pub fn arb_coordinate_with_depth(max_depth: usize) -> impl Strategy<Value = Coordinate> {
        (
            -50i64..50,
            -50i64..50,
            prop::collection::vec(arb_direction(), 0..=max_depth),
        )
            .prop_map(|(a, b, path)| Coordinate::new(a, b, path))
    }

    pub fn arb_coordinate() -> impl Strategy<Value = Coordinate> {
        arb_coordinate_with_depth(8)
    }

    pub fn arb_tile_patch() -> impl Strategy<Value = TilePatch> {
        (
            prop::option::of("[a-zA-Z ]{1,24}"),
            prop::option::of("[a-z ]{0,48}"),
            prop::option::of("https://[a-z]{3,10}\\.test"),
            prop::option::of("[a-z]{3,6}-[1-9]00"),
        )
            .prop_map(|(title, description, link, color_token)| TilePatch {
                title,
                description,
                link,
                color_token,
            })
    }

    /// A tile with a well-formed coordinate and matching parent/depth.
    pub fn arb_tile() -> impl Strategy<Value = TileRecord> {
        (arb_coordinate(), "[a-z0-9]{4,12}", "[a-zA-Z ]{1,24}").prop_map(
            |(coordinate, id, title)| {
                let coord_id = coordinate.to_id();
                TileRecord {
                    parent_coord_id: coordinate.parent().map(|p| p.to_id()),
                    depth: coordinate.depth() as u32,
                    coord_id,
                    persistent_id: id,
                    owner_id: "owner-1".to_string(),
                    title,
                    description: String::new(),
                    link: String::new(),
                    color_token: "zinc-50".to_string(),
                }
            },
        )
    }
}
