use std::collections::BTreeSet;
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::trace;

use super::Acl;
use super::Coordinator;
use super::CreateMode;
use super::OneShotWatch;
use super::Stat;
use super::WatchEvent;
use super::WatchEventKind;
use crate::path::node_name;
use crate::path::parent_path;
use crate::path::validate_path;
use crate::path::ROOT;
use crate::CoordinationError;
use crate::Result;

#[derive(Debug)]
struct ZNode {
    data: Vec<u8>,
    version: i32,
    children: BTreeSet<String>,
    mode: CreateMode,
}

impl ZNode {
    fn new(
        data: Vec<u8>,
        mode: CreateMode,
    ) -> Self {
        Self {
            data,
            version: 0,
            children: BTreeSet::new(),
            mode,
        }
    }

    fn stat(&self) -> Stat {
        Stat {
            version: self.version,
            num_children: self.children.len(),
        }
    }
}

#[derive(Debug, Default)]
struct Namespace {
    nodes: HashMap<String, ZNode>,
    data_watches: HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
    child_watches: HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
    connected: bool,
}

impl Namespace {
    fn node(
        &self,
        path: &str,
    ) -> Result<&ZNode> {
        self.nodes.get(path).ok_or_else(|| not_found(path))
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(CoordinationError::Connection("session is not connected".to_string()).into())
        }
    }

    fn arm(
        watches: &mut HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
        path: &str,
    ) -> OneShotWatch {
        let (tx, watch) = OneShotWatch::channel(path);
        watches.entry(path.to_string()).or_default().push(tx);
        watch
    }

    /// Fire and discard every registration of one kind on `path`.
    fn fire(
        watches: &mut HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
        path: &str,
        kind: WatchEventKind,
    ) {
        if let Some(senders) = watches.remove(path) {
            trace!(path, ?kind, watchers = senders.len(), "firing one-shot watches");
            for tx in senders {
                // receiver may already be gone (cancelled watcher)
                let _ = tx.send(WatchEvent::new(path, kind));
            }
        }
    }
}

/// In-process hierarchical, versioned namespace with one-shot watches.
///
/// Semantics follow the coordination service contract:
/// - a node can only be created under an existing parent
/// - only childless nodes can be deleted
/// - a data watch fires `DataChanged` on update and `NodeDeleted` on delete
/// - a children watch fires `ChildrenChanged` when a child is created or
///   deleted and `NodeDeleted` when the node itself goes away
/// - each registration fires exactly once and is then discarded
///
/// [`disconnect`](Self::disconnect) simulates session loss: all outstanding
/// registrations are dropped unfired and every call fails with
/// `CoordinationError::Connection` until [`reconnect`](Self::reconnect).
#[derive(Debug)]
pub struct MemoryCoordinator {
    inner: Mutex<Namespace>,
}

impl Default for MemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT.to_string(), ZNode::new(Vec::new(), CreateMode::Persistent));
        Self {
            inner: Mutex::new(Namespace {
                nodes,
                connected: true,
                ..Default::default()
            }),
        }
    }

    pub fn disconnect(&self) {
        let mut ns = self.inner.lock();
        ns.connected = false;
        ns.data_watches.clear();
        ns.child_watches.clear();
        debug!("memory coordinator disconnected, outstanding watches dropped");
    }

    pub fn reconnect(&self) {
        self.inner.lock().connected = true;
    }

    /// Number of outstanding data registrations on `path`.
    pub fn data_watch_count(
        &self,
        path: &str,
    ) -> usize {
        let ns = self.inner.lock();
        ns.data_watches
            .get(path)
            .map(|w| w.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Number of outstanding children registrations on `path`.
    pub fn child_watch_count(
        &self,
        path: &str,
    ) -> usize {
        let ns = self.inner.lock();
        ns.child_watches
            .get(path)
            .map(|w| w.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    pub fn create_mode(
        &self,
        path: &str,
    ) -> Option<CreateMode> {
        self.inner.lock().nodes.get(path).map(|n| n.mode)
    }

    /// Delete `path` and everything below it, deepest first.
    pub fn delete_recursive(
        &self,
        path: &str,
    ) -> Result<()> {
        validate_path(path)?;
        let mut ns = self.inner.lock();
        ns.ensure_connected()?;
        let mut stack = vec![path.to_string()];
        let mut order = Vec::new();
        while let Some(p) = stack.pop() {
            let node = ns.node(&p)?;
            stack.extend(node.children.iter().map(|c| crate::path::join_path(&p, c)));
            order.push(p);
        }
        for p in order.iter().rev() {
            Self::remove_node(&mut ns, p);
        }
        Ok(())
    }

    fn remove_node(
        ns: &mut Namespace,
        path: &str,
    ) {
        ns.nodes.remove(path);
        Namespace::fire(&mut ns.data_watches, path, WatchEventKind::NodeDeleted);
        Namespace::fire(&mut ns.child_watches, path, WatchEventKind::NodeDeleted);
        if let Some(parent) = parent_path(path) {
            if let Some(p) = ns.nodes.get_mut(parent) {
                p.children.remove(node_name(path));
            }
            Namespace::fire(&mut ns.child_watches, parent, WatchEventKind::ChildrenChanged);
        }
        debug!(path, "node deleted");
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn read(
        &self,
        path: &str,
    ) -> Result<(Vec<u8>, Stat)> {
        validate_path(path)?;
        let ns = self.inner.lock();
        ns.ensure_connected()?;
        let node = ns.node(path)?;
        Ok((node.data.clone(), node.stat()))
    }

    async fn read_and_watch(
        &self,
        path: &str,
    ) -> Result<(Vec<u8>, Stat, OneShotWatch)> {
        validate_path(path)?;
        let mut ns = self.inner.lock();
        ns.ensure_connected()?;
        let (data, stat) = {
            let node = ns.node(path)?;
            (node.data.clone(), node.stat())
        };
        let watch = Namespace::arm(&mut ns.data_watches, path);
        Ok((data, stat, watch))
    }

    async fn children(
        &self,
        path: &str,
    ) -> Result<Vec<String>> {
        validate_path(path)?;
        let ns = self.inner.lock();
        ns.ensure_connected()?;
        Ok(ns.node(path)?.children.iter().cloned().collect())
    }

    async fn children_and_watch(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, OneShotWatch)> {
        validate_path(path)?;
        let mut ns = self.inner.lock();
        ns.ensure_connected()?;
        let children = ns.node(path)?.children.iter().cloned().collect();
        let watch = Namespace::arm(&mut ns.child_watches, path);
        Ok((children, watch))
    }

    async fn exists(
        &self,
        path: &str,
    ) -> Result<Option<Stat>> {
        validate_path(path)?;
        let ns = self.inner.lock();
        ns.ensure_connected()?;
        Ok(ns.nodes.get(path).map(ZNode::stat))
    }

    async fn create(
        &self,
        path: &str,
        data: Vec<u8>,
        mode: CreateMode,
        _acl: &[Acl],
    ) -> Result<Stat> {
        validate_path(path)?;
        let parent = parent_path(path).ok_or_else(|| CoordinationError::NodeExists {
            path: path.to_string(),
        })?;

        let mut ns = self.inner.lock();
        ns.ensure_connected()?;
        if ns.nodes.contains_key(path) {
            return Err(CoordinationError::NodeExists {
                path: path.to_string(),
            }
            .into());
        }
        match ns.nodes.get_mut(parent) {
            Some(p) => {
                p.children.insert(node_name(path).to_string());
            }
            None => return Err(not_found(parent)),
        }

        let node = ZNode::new(data, mode);
        let stat = node.stat();
        ns.nodes.insert(path.to_string(), node);
        Namespace::fire(&mut ns.child_watches, parent, WatchEventKind::ChildrenChanged);
        debug!(path, "node created");
        Ok(stat)
    }

    async fn update(
        &self,
        path: &str,
        data: Vec<u8>,
        expected_version: i32,
    ) -> Result<Stat> {
        validate_path(path)?;
        let mut ns = self.inner.lock();
        ns.ensure_connected()?;
        let node = ns.nodes.get_mut(path).ok_or_else(|| not_found(path))?;
        if node.version != expected_version {
            return Err(CoordinationError::VersionConflict {
                path: path.to_string(),
                expected: expected_version,
            }
            .into());
        }
        node.data = data;
        node.version += 1;
        let stat = node.stat();
        Namespace::fire(&mut ns.data_watches, path, WatchEventKind::DataChanged);
        trace!(path, version = stat.version, "node updated");
        Ok(stat)
    }

    async fn delete(
        &self,
        path: &str,
        expected_version: i32,
    ) -> Result<()> {
        validate_path(path)?;
        if path == ROOT {
            return Err(CoordinationError::InvalidPath(path.to_string()).into());
        }
        let mut ns = self.inner.lock();
        ns.ensure_connected()?;
        let node = ns.node(path)?;
        if node.version != expected_version {
            return Err(CoordinationError::VersionConflict {
                path: path.to_string(),
                expected: expected_version,
            }
            .into());
        }
        if !node.children.is_empty() {
            return Err(CoordinationError::NotEmpty {
                path: path.to_string(),
            }
            .into());
        }
        Self::remove_node(&mut ns, path);
        Ok(())
    }
}

fn not_found(path: &str) -> crate::Error {
    CoordinationError::NotFound {
        path: path.to_string(),
    }
    .into()
}
