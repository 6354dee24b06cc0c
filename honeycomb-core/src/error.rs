//! Error types for honeycomb operations

use thiserror::Error;

use crate::coordinate::CoordId;

/// Coordinate parsing errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinateError {
    #[error("Coordinate identifier is empty")]
    Empty,

    #[error("Malformed scope in coordinate {input:?}")]
    MalformedScope { input: String },

    #[error("Invalid direction {value:?}, expected 1..6")]
    InvalidDirection { value: String },
}

/// Errors classified by the remote query/mutation services.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Service misuse: {reason}")]
    Misuse { reason: String },

    #[error("Request rejected with code {code}: {message}")]
    Rejected { code: String, message: String },
}

impl ServiceError {
    /// Stable machine-readable code for the failure.
    pub fn code(&self) -> &str {
        match self {
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Misuse { .. } => "MISUSE",
            Self::Rejected { code, .. } => code,
        }
    }
}

/// Local precondition failures of the optimistic mutation coordinator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("Coordinate {coord_id} is already occupied")]
    CoordinateOccupied { coord_id: CoordId },

    #[error("Parent of {coord_id} is not loaded")]
    ParentNotLoaded { coord_id: CoordId },

    #[error("No tile cached at {coord_id}")]
    TileNotLoaded { coord_id: CoordId },

    #[error("Cannot move {from} into its own subtree at {to}")]
    MoveIntoSelf { from: CoordId, to: CoordId },

    #[error("Unknown optimistic change {change_id}")]
    UnknownChange { change_id: String },
}

/// Sync engine conditions reported to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Sync already in progress")]
    AlreadyInProgress,

    #[error("Offline: {reason}")]
    Offline { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config: {reason}")]
    Parse { reason: String },
}

/// Persistence service errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("IO error for key {key}: {reason}")]
    Io { key: String, reason: String },

    #[error("Serialization error: {reason}")]
    Serde { reason: String },
}

/// Master error type for all honeycomb errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HoneycombError {
    /// Transport-level failure; the only retryable class.
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Coordinate error: {0}")]
    Coordinate(#[from] CoordinateError),

    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("{0}")]
    Other(String),
}

impl HoneycombError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after_ms,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Sync(SyncError::Offline { .. }))
    }
}

/// Result type alias for honeycomb operations.
pub type HoneycombResult<T> = Result<T, HoneycombError>;
