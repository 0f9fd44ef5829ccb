//! Operation set consumed from the hierarchical coordination service.
//!
//! The watch engine never talks to a wire protocol directly. Everything it
//! needs from the service goes through [`Coordinator`], whose watch-arming
//! calls hand back a [`OneShotWatch`]: a registration that fires at most once
//! and must be re-armed by issuing another `*_and_watch` call.
//!
//! [`MemoryCoordinator`] implements the full contract in process and backs
//! both embedded use and the test suite.

mod memory;
pub use memory::*;


use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::oneshot;

use crate::CoordinationError;
use crate::Result;

/// Node metadata returned alongside reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Data version, bumped by the service on every successful update
    pub version: i32,
    pub num_children: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    NodeCreated,
    DataChanged,
    NodeDeleted,
    ChildrenChanged,
}

/// Payload delivered exactly once per registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: String,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    pub fn new(
        path: impl Into<String>,
        kind: WatchEventKind,
    ) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// A single outstanding one-shot registration.
///
/// Consumed by [`OneShotWatch::fired`]; once it resolves the registration is
/// gone and the caller must arm a new one to keep observing the node.
#[derive(Debug)]
pub struct OneShotWatch {
    path: String,
    receiver: oneshot::Receiver<WatchEvent>,
}

impl OneShotWatch {
    pub fn new(
        path: impl Into<String>,
        receiver: oneshot::Receiver<WatchEvent>,
    ) -> Self {
        Self {
            path: path.into(),
            receiver,
        }
    }

    /// Create a registration together with the sender the service side fires.
    pub fn channel(path: impl Into<String>) -> (oneshot::Sender<WatchEvent>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self::new(path, rx))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the registration to fire.
    ///
    /// A sender dropped without firing means the connection layer discarded
    /// the registration, which surfaces as [`CoordinationError::WatchLost`].
    pub async fn fired(self) -> Result<WatchEvent> {
        let path = self.path;
        self.receiver
            .await
            .map_err(|_| CoordinationError::WatchLost { path }.into())
    }
}

/// Node lifetime requested at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    Persistent,
    /// Removed by the service when the creating session ends
    Ephemeral,
    /// Persistent, but reaped by the service once idle for the given duration
    PersistentWithTtl(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    pub perms: u32,
    pub scheme: String,
    pub id: String,
}

impl Acl {
    pub const PERM_READ: u32 = 1;
    pub const PERM_WRITE: u32 = 1 << 1;
    pub const PERM_CREATE: u32 = 1 << 2;
    pub const PERM_DELETE: u32 = 1 << 3;
    pub const PERM_ADMIN: u32 = 1 << 4;
    pub const PERM_ALL: u32 = 0x1f;

    /// Open ACL: anyone may do anything.
    pub fn world_all() -> Vec<Acl> {
        vec![Acl {
            perms: Self::PERM_ALL,
            scheme: "world".to_string(),
            id: "anyone".to_string(),
        }]
    }
}

/// Connection handle to the coordination service.
///
/// Implementations are shared by every watcher task without extra locking,
/// so they must be safe for concurrent use.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Coordinator: Send + Sync + 'static {
    /// Read the node's payload. Fails with `NotFound` if absent.
    async fn read(
        &self,
        path: &str,
    ) -> Result<(Vec<u8>, Stat)>;

    /// Read the node's payload and arm a one-shot data watch covering every
    /// change after the returned version.
    async fn read_and_watch(
        &self,
        path: &str,
    ) -> Result<(Vec<u8>, Stat, OneShotWatch)>;

    /// List child names (unqualified).
    async fn children(
        &self,
        path: &str,
    ) -> Result<Vec<String>>;

    /// List child names and arm a one-shot children watch.
    async fn children_and_watch(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, OneShotWatch)>;

    async fn exists(
        &self,
        path: &str,
    ) -> Result<Option<Stat>>;

    /// Create a node. Fails with `NodeExists` if already present.
    async fn create(
        &self,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
        acl: &[Acl],
    ) -> Result<Stat>;

    /// Version-guarded update. Fails with `VersionConflict` if
    /// `expected_version` is stale.
    async fn update(
        &self,
        path: &str,
        data: Vec<u8>,
        expected_version: i32,
    ) -> Result<Stat>;

    /// Version-guarded delete of a childless node.
    async fn delete(
        &self,
        path: &str,
        expected_version: i32,
    ) -> Result<()>;
}
