//! Error hierarchy for the watch engine and its write path.
//!
//! Errors are grouped by the layer that produced them: the coordination
//! service, the watch orchestration itself, and value serialization.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failures reported by (or while talking to) the coordination service
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    /// Watch tree orchestration failures
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Value <-> bytes conversion failures
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// Service unreachable or the call failed in transport
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single call exceeded its deadline
    #[error("Request on {path} timed out after {duration:?}")]
    Timeout { path: String, duration: Duration },

    #[error("Node not found: {path}")]
    NotFound { path: String },

    #[error("Node already exists: {path}")]
    NodeExists { path: String },

    /// Optimistic write rejected because the node moved past `expected`
    #[error("Version conflict on {path} (expected version {expected})")]
    VersionConflict { path: String, expected: i32 },

    #[error("Node has children: {path}")]
    NotEmpty { path: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The one-shot registration was dropped without firing (session loss)
    #[error("Watch on {path} was lost before it fired")]
    WatchLost { path: String },
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Spawn refused because the subtree already holds `limit` live branches
    #[error("Branch limit {limit} reached, not watching {path}")]
    BranchLimitExceeded { path: String, limit: usize },

    #[error("{path} is already being watched by this watcher")]
    AlreadyWatched { path: String },

    #[error("Watcher task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("JSON codec failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bincode codec failed: {0}")]
    Bincode(#[from] bincode::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Coordination(CoordinationError::NotFound { .. }))
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(
            self,
            Error::Coordination(CoordinationError::VersionConflict { .. })
        )
    }

    /// Outcomes of a lost check-then-act race in the create-or-update path.
    ///
    /// Re-checking existence and version is enough to make progress on any of these.
    pub fn is_retryable_write(&self) -> bool {
        matches!(
            self,
            Error::Coordination(
                CoordinationError::VersionConflict { .. }
                    | CoordinationError::NodeExists { .. }
                    | CoordinationError::NotFound { .. }
                    | CoordinationError::Timeout { .. }
            )
        )
    }
}

// ============== Conversion Implementations ============== //
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Codec(CodecError::Json(e))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Codec(CodecError::Bincode(e))
    }
}

impl From<JoinError> for Error {
    fn from(e: JoinError) -> Self {
        Error::Watch(WatchError::TaskFailed(e))
    }
}
