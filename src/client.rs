//! Application-facing facade over the watch engine and the write path.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::CallbackRegistry;
use crate::CallbackSet;
use crate::Codec;
use crate::CombinedWatcher;
use crate::CoordinationError;
use crate::Coordinator;
use crate::Error;
use crate::JsonCodec;
use crate::Mutator;
use crate::Result;
use crate::Stat;
use crate::SubtreeWatcher;
use crate::WatchExit;
use crate::WatchHandle;
use crate::ZconfConfig;

/// Point-in-time copy of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub path: String,
    pub data: Vec<u8>,
    pub version: i32,
}

/// Configuration tree client.
///
/// Owns the callback registry shared by every watch it starts, so callbacks
/// set here apply to watches that are already running.
///
/// # Examples
/// ```ignore
/// let zconf = Zconf::new(coordinator, ZconfConfig::new()?.validate()?);
/// zconf.on_node_changed(|path, data| println!("{path} -> {} bytes", data.len()));
/// zconf.put("/app/db", &json!({"host": "10.0.0.1"})).await?;
/// let handle = zconf.spawn_watch_path(CancellationToken::new(), "/app");
/// ```
pub struct Zconf<K: Codec + Clone = JsonCodec> {
    coordinator: Arc<dyn Coordinator>,
    registry: Arc<CallbackRegistry>,
    mutator: Mutator<K>,
    codec: K,
    config: ZconfConfig,
}

impl Zconf<JsonCodec> {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        config: ZconfConfig,
    ) -> Self {
        Self::with_codec(coordinator, config, JsonCodec)
    }
}

impl<K: Codec + Clone> Zconf<K> {
    pub fn with_codec(
        coordinator: Arc<dyn Coordinator>,
        config: ZconfConfig,
        codec: K,
    ) -> Self {
        let mutator = Mutator::new(
            coordinator.clone(),
            codec.clone(),
            config.write.clone(),
            config.retry.put,
        );
        Self {
            coordinator,
            registry: Arc::new(CallbackRegistry::new()),
            mutator,
            codec,
            config,
        }
    }

    pub fn config(&self) -> &ZconfConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<CallbackRegistry> {
        self.registry.clone()
    }

    pub fn coordinator(&self) -> Arc<dyn Coordinator> {
        self.coordinator.clone()
    }

    // ------------------------------------------------------------------
    // Callbacks

    pub fn on_node_changed(
        &self,
        f: impl Fn(&str, &[u8]) + Send + Sync + 'static,
    ) {
        let cb: crate::NodeCallback = Arc::new(f);
        self.registry
            .update_defaults(|set| set.changed = Some(cb.clone()));
    }

    pub fn on_node_deleted(
        &self,
        f: impl Fn(&str, &[u8]) + Send + Sync + 'static,
    ) {
        let cb: crate::NodeCallback = Arc::new(f);
        self.registry
            .update_defaults(|set| set.deleted = Some(cb.clone()));
    }

    pub fn on_node_children(
        &self,
        f: impl Fn(&str, &[String], &[String]) + Send + Sync + 'static,
    ) {
        let cb: crate::ChildrenCallback = Arc::new(f);
        self.registry
            .update_defaults(|set| set.children = Some(cb.clone()));
    }

    pub fn on_node_error(
        &self,
        f: impl Fn(&str, &Error) + Send + Sync + 'static,
    ) {
        let cb: crate::ErrorCallback = Arc::new(f);
        self.registry
            .update_defaults(|set| set.error = Some(cb.clone()));
    }

    /// Route events for exactly `path` to `callbacks` instead of the defaults.
    pub fn bind(
        &self,
        path: impl Into<String>,
        callbacks: CallbackSet,
    ) {
        self.registry.bind(path, callbacks);
    }

    pub fn unbind(
        &self,
        path: &str,
    ) -> Option<Arc<CallbackSet>> {
        self.registry.unbind(path)
    }

    // ------------------------------------------------------------------
    // Reads

    pub async fn get(
        &self,
        path: &str,
    ) -> Result<Node> {
        let (data, stat) = self.coordinator.read(path).await?;
        Ok(Node {
            path: path.to_string(),
            data,
            version: stat.version,
        })
    }

    /// Read `path` and decode its payload.
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T> {
        let node = self.get(path).await?;
        self.codec.decode(&node.data)
    }

    /// Snapshots of every child of `path`, sorted by name.
    ///
    /// A child deleted between the listing and its read is left out.
    pub async fn children(
        &self,
        path: &str,
    ) -> Result<Vec<Node>> {
        let mut names = self.coordinator.children(path).await?;
        names.sort();

        let mut nodes = Vec::with_capacity(names.len());
        for name in names {
            let child = crate::path::join_path(path, &name);
            match self.get(&child).await {
                Ok(node) => nodes.push(node),
                Err(e) if e.is_not_found() => {
                    debug!(path = %child, "child vanished while listing");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(nodes)
    }

    // ------------------------------------------------------------------
    // Watches

    /// Watch one node's data and children until it is deleted, a watch call
    /// fails, or `token` fires. Does not descend into children.
    pub async fn watch_node(
        &self,
        token: CancellationToken,
        path: impl Into<String>,
    ) -> Result<WatchExit> {
        CombinedWatcher::new(
            self.coordinator.clone(),
            self.registry.clone(),
            path,
            self.config.watch.read_timeout(),
        )
        .run(token.child_token())
        .await
    }

    /// Watch `path` and every descendant, blocking until the root branch and
    /// all branches below it have stopped.
    pub async fn watch_path(
        &self,
        token: CancellationToken,
        path: impl Into<String>,
    ) -> Result<WatchExit> {
        let path = path.into();
        info!(path = %path, "watching subtree");
        self.subtree_watcher().watch(path, token).await
    }

    /// Like [`watch_path`](Self::watch_path) but runs on its own task.
    pub fn spawn_watch_path(
        &self,
        token: CancellationToken,
        path: impl Into<String>,
    ) -> WatchHandle {
        let path = path.into();
        info!(path = %path, "spawning subtree watch");
        self.subtree_watcher().spawn(path, token)
    }

    fn subtree_watcher(&self) -> Arc<SubtreeWatcher> {
        Arc::new(SubtreeWatcher::new(
            self.coordinator.clone(),
            self.registry.clone(),
            &self.config.watch,
        ))
    }

    // ------------------------------------------------------------------
    // Writes

    /// Create or update `path` with the encoded `value`.
    ///
    /// # Errors
    /// - [`crate::CodecError`] if `value` cannot be encoded
    /// - [`CoordinationError::VersionConflict`] if concurrent writers kept
    ///   winning until the retry budget ran out
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
    ) -> Result<Stat> {
        self.mutator.put(path, value).await
    }

    pub async fn put_raw(
        &self,
        path: &str,
        data: Vec<u8>,
    ) -> Result<Stat> {
        self.mutator.put_raw(path, data).await
    }

    /// Delete `path` at the version observed just before the call.
    ///
    /// # Errors
    /// - [`CoordinationError::NotFound`] if the node does not exist
    /// - [`CoordinationError::VersionConflict`] if it changed in between
    /// - [`CoordinationError::NotEmpty`] if it still has children
    pub async fn delete(
        &self,
        path: &str,
    ) -> Result<()> {
        let stat = self
            .coordinator
            .exists(path)
            .await?
            .ok_or_else(|| CoordinationError::NotFound {
                path: path.to_string(),
            })?;
        self.coordinator.delete(path, stat.version).await
    }
}
