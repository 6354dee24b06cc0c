//! Honeycomb Core - Tile Types and Service Contracts
//!
//! Pure data structures shared by the cache runtime and its collaborators:
//! coordinate identifiers, tile records, configuration, the error taxonomy,
//! and the traits for the remote query, mutation and persistence services.

pub mod clock;
pub mod config;
pub mod coordinate;
pub mod error;
pub mod services;
pub mod tile;

pub use clock::{Clock, EpochMs, SystemClock};
pub use config::{CacheConfig, CacheConfigPatch, HoneycombConfig, SyncConfig, SyncConfigPatch};
pub use coordinate::{CoordId, Coordinate, Direction};
pub use error::{
    ConfigError, CoordinateError, HoneycombError, HoneycombResult, MutationError,
    PersistenceError, ServiceError, SyncError,
};
pub use services::{
    CreateTileParams, DeleteTileParams, MoveOutcome, MutationService, PersistenceService,
    QueryService, UpdateTileParams,
};
pub use tile::{TileFields, TilePatch, TileRecord, PROVISIONAL_ID_PREFIX};
