//! Optimistic mutations with per-change rollback.
//!
//! When optimistic updates are enabled, each mutation is echoed into the
//! cache immediately and tracked with an undo plan. The plan covers only the
//! coordinates the echo touched, so unrelated changes that land while the
//! request is in flight survive a rollback.

use std::sync::Arc;

use honeycomb_core::{
    CoordId, Coordinate, CreateTileParams, DeleteTileParams, Direction, HoneycombError,
    HoneycombResult, MoveOutcome, MutationError, MutationService, TileFields, TilePatch,
    TileRecord, UpdateTileParams, PROVISIONAL_ID_PREFIX,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::action::CacheAction;
use crate::store::CacheContext;
use crate::timeout::with_timeout;
use crate::tracker::{ChangeId, ChangeKind, ChangeRecord, ChangeTracker, UndoStep};

/// Color token for a tile created without one.
pub fn default_color_token(coordinate: &Coordinate) -> String {
    let Some(first) = coordinate.path.first() else {
        return "zinc-50".to_string();
    };
    let family = match first {
        Direction::NorthWest => "violet",
        Direction::NorthEast => "indigo",
        Direction::East => "teal",
        Direction::SouthEast => "cyan",
        Direction::SouthWest => "amber",
        Direction::West => "rose",
    };
    format!("{}-{}", family, coordinate.depth().min(9) * 100)
}

fn provisional_tile(
    coordinate: &Coordinate,
    parent: Option<&TileRecord>,
    fields: &TileFields,
) -> TileRecord {
    TileRecord {
        coord_id: coordinate.to_id(),
        persistent_id: format!("{}{}", PROVISIONAL_ID_PREFIX, Uuid::now_v7()),
        parent_coord_id: coordinate.parent().map(|p| p.to_id()),
        depth: coordinate.depth() as u32,
        owner_id: fields
            .owner_id
            .clone()
            .or_else(|| parent.map(|p| p.owner_id.clone()))
            .unwrap_or_default(),
        title: fields.title.clone(),
        description: fields.description.clone(),
        link: fields.link.clone(),
        color_token: fields
            .color_token
            .clone()
            .unwrap_or_else(|| default_color_token(coordinate)),
    }
}

/// Applies tile mutations through the mutation service.
pub struct MutationCoordinator {
    ctx: CacheContext,
    service: Arc<dyn MutationService>,
    tracker: Arc<ChangeTracker>,
}

impl MutationCoordinator {
    pub fn new(
        ctx: CacheContext,
        service: Arc<dyn MutationService>,
        tracker: Arc<ChangeTracker>,
    ) -> Self {
        Self {
            ctx,
            service,
            tracker,
        }
    }

    pub fn tracker(&self) -> &Arc<ChangeTracker> {
        &self.tracker
    }

    /// Create a tile at `coord_id`. The parent must already be cached.
    pub async fn create_item(
        &self,
        coord_id: &CoordId,
        fields: TileFields,
    ) -> HoneycombResult<TileRecord> {
        let coordinate = coord_id.coordinate()?;
        let target = coordinate.to_id();

        let state = self.ctx.state();
        if state.item(&target).is_some() {
            return Err(MutationError::CoordinateOccupied { coord_id: target }.into());
        }
        let parent = match coordinate.parent() {
            Some(parent) => {
                let parent_id = parent.to_id();
                match state.item(&parent_id) {
                    Some(tile) => Some(tile.clone()),
                    None => {
                        return Err(MutationError::ParentNotLoaded { coord_id: parent_id }.into())
                    }
                }
            }
            None => None,
        };
        let optimistic = state.config.optimistic_enabled;
        let timeout_ms = state.config.request_timeout_ms;
        drop(state);

        let params = CreateTileParams {
            coord_id: target.clone(),
            parent_id: parent.as_ref().map(|p| p.persistent_id.clone()),
            fields,
        };
        let change = optimistic.then(|| {
            let provisional = provisional_tile(&coordinate, parent.as_ref(), &params.fields);
            self.echo(Vec::new(), vec![provisional]);
            self.tracker.register(
                ChangeKind::Create,
                target.clone(),
                None,
                vec![UndoStep::Remove(target.clone())],
                self.ctx.now_ms(),
            )
        });

        match with_timeout("create_item", timeout_ms, self.service.create_item(params)).await {
            Ok(record) => {
                let mut removed = Vec::new();
                if record.coord_id != target {
                    removed.push(target.clone());
                }
                debug!(coord = %target, id = %record.persistent_id, "Create confirmed");
                self.confirm(change, removed, vec![record.clone()]);
                Ok(record)
            }
            Err(err) => Err(self.revert(change, "create_item", err)),
        }
    }

    /// Edit the cached tile at `coord_id`.
    pub async fn update_item(
        &self,
        coord_id: &CoordId,
        patch: TilePatch,
    ) -> HoneycombResult<TileRecord> {
        let target = coord_id.coordinate()?.to_id();

        let state = self.ctx.state();
        let existing = state
            .item(&target)
            .cloned()
            .ok_or_else(|| MutationError::TileNotLoaded {
                coord_id: target.clone(),
            })?;
        let optimistic = state.config.optimistic_enabled;
        let timeout_ms = state.config.request_timeout_ms;
        drop(state);

        let params = UpdateTileParams {
            coord_id: target.clone(),
            persistent_id: existing.persistent_id.clone(),
            patch,
        };
        let change = optimistic.then(|| {
            let mut echoed = existing.clone();
            echoed.apply_patch(&params.patch);
            self.echo(Vec::new(), vec![echoed]);
            self.tracker.register(
                ChangeKind::Update,
                target.clone(),
                Some(existing.clone()),
                vec![UndoStep::Restore(existing.clone())],
                self.ctx.now_ms(),
            )
        });

        match with_timeout("update_item", timeout_ms, self.service.update_item(params)).await {
            Ok(record) => {
                self.confirm(change, Vec::new(), vec![record.clone()]);
                Ok(record)
            }
            Err(err) => Err(self.revert(change, "update_item", err)),
        }
    }

    /// Delete the tile at `coord_id` together with its cached descendants.
    pub async fn delete_item(&self, coord_id: &CoordId) -> HoneycombResult<()> {
        let coordinate = coord_id.coordinate()?;
        let target = coordinate.to_id();

        let state = self.ctx.state();
        let existing = state
            .item(&target)
            .cloned()
            .ok_or_else(|| MutationError::TileNotLoaded {
                coord_id: target.clone(),
            })?;
        let mut subtree = vec![existing.clone()];
        subtree.extend(state.descendants_of(&coordinate).into_iter().cloned());
        let optimistic = state.config.optimistic_enabled;
        let timeout_ms = state.config.request_timeout_ms;
        drop(state);

        let subtree_coords: Vec<CoordId> = subtree.iter().map(|t| t.coord_id.clone()).collect();
        let params = DeleteTileParams {
            coord_id: target.clone(),
            persistent_id: existing.persistent_id.clone(),
        };
        let change = optimistic.then(|| {
            self.echo(subtree_coords.clone(), Vec::new());
            self.tracker.register(
                ChangeKind::Delete,
                target.clone(),
                Some(existing.clone()),
                subtree.iter().cloned().map(UndoStep::Restore).collect(),
                self.ctx.now_ms(),
            )
        });

        match with_timeout("delete_item", timeout_ms, self.service.delete_item(params)).await {
            Ok(()) => {
                debug!(coord = %target, removed = subtree_coords.len(), "Delete confirmed");
                self.confirm(change, subtree_coords, Vec::new());
                Ok(())
            }
            Err(err) => Err(self.revert(change, "delete_item", err)),
        }
    }

    /// Move the tile at `from` and its cached subtree to `to`.
    pub async fn move_item(&self, from: &CoordId, to: &CoordId) -> HoneycombResult<MoveOutcome> {
        let old_root = from.coordinate()?;
        let new_root = to.coordinate()?;
        let from_id = old_root.to_id();
        let to_id = new_root.to_id();
        if old_root == new_root
            || old_root.is_ancestor_of(&new_root)
            || new_root.is_ancestor_of(&old_root)
        {
            return Err(MutationError::MoveIntoSelf {
                from: from_id,
                to: to_id,
            }
            .into());
        }

        let state = self.ctx.state();
        let existing = state
            .item(&from_id)
            .cloned()
            .ok_or_else(|| MutationError::TileNotLoaded {
                coord_id: from_id.clone(),
            })?;
        if state.item(&to_id).is_some() {
            return Err(MutationError::CoordinateOccupied { coord_id: to_id }.into());
        }
        let mut subtree = vec![existing.clone()];
        subtree.extend(state.descendants_of(&old_root).into_iter().cloned());
        let optimistic = state.config.optimistic_enabled;
        let timeout_ms = state.config.request_timeout_ms;
        drop(state);

        let old_coords: Vec<CoordId> = subtree.iter().map(|t| t.coord_id.clone()).collect();
        let relocated: Vec<TileRecord> = subtree
            .iter()
            .filter_map(|tile| {
                let moved = tile.coord_id.coordinate().ok()?.rebase(&old_root, &new_root)?;
                Some(tile.relocated(moved.to_id()))
            })
            .collect();

        let change = optimistic.then(|| {
            self.echo(old_coords.clone(), relocated.clone());
            let undo = relocated
                .iter()
                .map(|t| UndoStep::Remove(t.coord_id.clone()))
                .chain(subtree.iter().cloned().map(UndoStep::Restore))
                .collect();
            self.tracker.register(
                ChangeKind::Move,
                from_id.clone(),
                Some(existing.clone()),
                undo,
                self.ctx.now_ms(),
            )
        });

        match with_timeout(
            "move_item",
            timeout_ms,
            self.service.move_item(&from_id, &to_id),
        )
        .await
        {
            Ok(outcome) => {
                let mut upserts = relocated;
                upserts.extend(outcome.affected_records.iter().cloned());
                debug!(from = %from_id, to = %to_id, moved = upserts.len(), "Move confirmed");
                self.confirm(change, old_coords, upserts);
                Ok(outcome)
            }
            Err(err) => Err(self.revert(change, "move_item", err)),
        }
    }

    /// Undo one pending change.
    pub fn rollback(&self, change_id: ChangeId) -> HoneycombResult<()> {
        let record = self
            .tracker
            .take(change_id)
            .ok_or_else(|| MutationError::UnknownChange {
                change_id: change_id.to_string(),
            })?;
        info!(change = %change_id, kind = ?record.kind, coord = %record.coord_id, "Rolling back change");
        self.apply_undo(&record);
        Ok(())
    }

    /// Undo every pending change, newest first. Returns how many were undone.
    pub fn rollback_all(&self) -> usize {
        let records = self.tracker.drain();
        for record in records.iter().rev() {
            self.apply_undo(record);
        }
        if !records.is_empty() {
            info!(count = records.len(), "Rolled back all pending changes");
        }
        records.len()
    }

    pub fn list_pending(&self) -> Vec<ChangeRecord> {
        self.tracker.pending()
    }

    fn echo(&self, removed: Vec<CoordId>, upserts: Vec<TileRecord>) {
        for coord_id in removed {
            self.ctx.dispatch(CacheAction::RemoveItem(coord_id));
        }
        if !upserts.is_empty() {
            self.ctx.dispatch(CacheAction::UpsertItems {
                items: upserts,
                updated_at: self.ctx.now_ms(),
            });
        }
    }

    fn confirm(&self, change: Option<ChangeId>, removed: Vec<CoordId>, upserts: Vec<TileRecord>) {
        if let Some(id) = change {
            if self.tracker.take(id).is_none() {
                debug!(change = %id, "Change was rolled back before confirmation");
            }
        }
        self.echo(removed, upserts);
    }

    fn revert(
        &self,
        change: Option<ChangeId>,
        operation: &str,
        err: HoneycombError,
    ) -> HoneycombError {
        if let Some(record) = change.and_then(|id| self.tracker.take(id)) {
            self.apply_undo(&record);
        }
        warn!(operation, error = %err, "Mutation failed");
        self.ctx.dispatch(CacheAction::SetError(Some(err.clone())));
        err
    }

    fn apply_undo(&self, record: &ChangeRecord) {
        let mut removed = Vec::new();
        let mut restored = Vec::new();
        for step in &record.undo {
            match step {
                UndoStep::Remove(coord_id) => removed.push(coord_id.clone()),
                UndoStep::Restore(tile) => restored.push(tile.clone()),
            }
        }
        self.echo(removed, restored);
    }
}

impl std::fmt::Debug for MutationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationCoordinator")
            .field("pending", &self.tracker.len())
            .finish_non_exhaustive()
    }
}
