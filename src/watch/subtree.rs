use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;

use super::call_or_cancel;
use super::BranchSupervisor;
use super::CombinedWatcher;
use super::Dispatch;
use super::WatchExit;
use crate::path::join_path;
use crate::Coordinator;
use crate::Error;
use crate::Result;
use crate::WatchConfig;
use crate::WatchError;

/// How a child name reached the spawn decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Discovery {
    /// Listed while the parent branch started up
    Eager,
    /// First dispatch of the parent's children watcher
    Initial,
    /// Appeared in a later children watch fire
    Changed,
    /// Re-attempt after the previous branch for the same name finished
    Retry,
}

#[derive(Debug, Clone)]
struct ClaimSlot {
    generation: u64,
    done: CancellationToken,
}

enum Claim {
    Fresh(ClaimSlot),
    /// Already claimed; carries the holder's completion token
    Busy(CancellationToken),
}

/// Per-parent set of child names that currently own a branch.
///
/// The claim is taken atomically at spawn decision time, which is what keeps
/// the eager enumeration and the children watcher from double-spawning. A
/// claim is released when its branch ends, so a name that is deleted and
/// later re-created gets a fresh branch.
#[derive(Debug, Default)]
struct ChildClaims {
    live: DashMap<String, ClaimSlot>,
    next_generation: AtomicU64,
}

impl ChildClaims {
    fn claim(
        &self,
        name: &str,
    ) -> Claim {
        let fresh = || ClaimSlot {
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            done: CancellationToken::new(),
        };
        match self.live.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().done.is_cancelled() {
                    let slot = fresh();
                    entry.insert(slot.clone());
                    Claim::Fresh(slot)
                } else {
                    Claim::Busy(entry.get().done.clone())
                }
            }
            Entry::Vacant(entry) => {
                let slot = fresh();
                entry.insert(slot.clone());
                Claim::Fresh(slot)
            }
        }
    }

    fn release(
        &self,
        name: &str,
        generation: u64,
    ) {
        self.live.remove_if(name, |_, slot| slot.generation == generation);
    }

    /// Completion tokens of every branch still holding a claim
    fn pending(&self) -> Vec<CancellationToken> {
        self.live.iter().map(|slot| slot.done.clone()).collect()
    }
}

struct ParentClaim {
    claims: Arc<ChildClaims>,
    name: String,
    slot: ClaimSlot,
}

/// Held by a running branch; dropping it returns the branch's slot to the
/// supervisor and its name to the parent's claim set, then signals completion.
struct BranchLease {
    path: String,
    supervisor: Arc<BranchSupervisor>,
    parent: Option<ParentClaim>,
}

impl BranchLease {
    fn is_discovered(&self) -> bool {
        self.parent.is_some()
    }
}

impl Drop for BranchLease {
    fn drop(&mut self) {
        self.supervisor.release(&self.path);
        if let Some(parent) = &self.parent {
            parent.claims.release(&parent.name, parent.slot.generation);
            parent.slot.done.cancel();
        }
        trace!(path = %self.path, "branch lease dropped");
    }
}

/// Children sink of one branch: forwards to the user's dispatch, then spawns
/// a branch for every newly added child.
struct SpawningDispatch {
    inner: Arc<dyn Dispatch>,
    watcher: Arc<SubtreeWatcher>,
    claims: Arc<ChildClaims>,
    token: CancellationToken,
    first_listing: AtomicBool,
}

impl Dispatch for SpawningDispatch {
    fn changed(
        &self,
        path: &str,
        data: &[u8],
    ) {
        self.inner.changed(path, data);
    }

    fn deleted(
        &self,
        path: &str,
        data: &[u8],
    ) {
        self.inner.deleted(path, data);
    }

    fn children(
        &self,
        path: &str,
        all: &[String],
        added: &[String],
    ) {
        self.inner.children(path, all, added);

        let discovery = if self.first_listing.swap(false, Ordering::SeqCst) {
            Discovery::Initial
        } else {
            Discovery::Changed
        };
        for name in added {
            self.watcher
                .spawn_child(&self.claims, path, name, &self.token, discovery);
        }
    }

    fn error(
        &self,
        path: &str,
        err: &Error,
    ) {
        self.inner.error(path, err);
    }
}

/// Recursively watches a whole subtree from a single entry point.
///
/// One branch runs per node: a [`CombinedWatcher`] plus zero or more child
/// branches, each with a cancellation token inherited from its parent.
/// Existing children are spawned eagerly at branch start; later ones are
/// spawned as the children watcher reports them. A branch ends when its node
/// is deleted, a watch call fails, or its token fires. Ending a branch
/// cancels its descendants but never its parent or siblings.
pub struct SubtreeWatcher {
    coordinator: Arc<dyn Coordinator>,
    dispatch: Arc<dyn Dispatch>,
    supervisor: Arc<BranchSupervisor>,
    read_timeout: Duration,
}

impl SubtreeWatcher {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        dispatch: Arc<dyn Dispatch>,
        config: &WatchConfig,
    ) -> Self {
        Self {
            coordinator,
            dispatch,
            supervisor: Arc::new(BranchSupervisor::new(config.branch_limit())),
            read_timeout: config.read_timeout(),
        }
    }

    pub fn supervisor(&self) -> Arc<BranchSupervisor> {
        self.supervisor.clone()
    }

    /// Watch `root` and everything below it.
    ///
    /// Returns once the root branch has terminated and every descendant
    /// branch has wound down.
    pub async fn watch(
        self: Arc<Self>,
        root: impl Into<String>,
        token: CancellationToken,
    ) -> Result<WatchExit> {
        let root = root.into();
        let admitted = match self.supervisor.admit(&root) {
            Ok(true) => Ok(()),
            Ok(false) => Err(WatchError::AlreadyWatched { path: root.clone() }.into()),
            Err(e) => Err(e),
        };
        if let Err(e) = admitted {
            self.dispatch.error(&root, &e);
            return Err(e);
        }

        let lease = BranchLease {
            path: root.clone(),
            supervisor: self.supervisor.clone(),
            parent: None,
        };
        let exit = self.clone().run_branch(lease, token.child_token()).await;
        self.supervisor.drained().await;

        info!(
            root = %root,
            exit = ?exit,
            spawned = self.supervisor.total_spawned(),
            "subtree watch finished"
        );
        exit
    }

    /// Run [`watch`](Self::watch) on its own task.
    pub fn spawn(
        self: Arc<Self>,
        root: impl Into<String>,
        token: CancellationToken,
    ) -> WatchHandle {
        let root = root.into();
        let token = token.child_token();
        let supervisor = self.supervisor.clone();
        let task = tokio::spawn(self.watch(root.clone(), token.clone()));
        WatchHandle {
            root,
            token,
            supervisor,
            task,
        }
    }

    fn run_branch(
        self: Arc<Self>,
        lease: BranchLease,
        token: CancellationToken,
    ) -> BoxFuture<'static, Result<WatchExit>> {
        async move {
            let path = lease.path.clone();
            let discovered = lease.is_discovered();

            // snapshot: the node must exist before anything below it is watched
            let snapshot = call_or_cancel(
                &token,
                &path,
                self.read_timeout,
                self.coordinator.read(&path),
            )
            .await;
            match snapshot {
                None => return Ok(WatchExit::Cancelled),
                Some(Ok(_)) => {}
                Some(Err(e)) => return self.startup_failed(&path, discovered, e),
            }

            let claims = Arc::new(ChildClaims::default());
            let spawner: Arc<dyn Dispatch> = Arc::new(SpawningDispatch {
                inner: self.dispatch.clone(),
                watcher: self.clone(),
                claims: claims.clone(),
                token: token.clone(),
                first_listing: AtomicBool::new(true),
            });

            let listing = call_or_cancel(
                &token,
                &path,
                self.read_timeout,
                self.coordinator.children(&path),
            )
            .await;
            match listing {
                None => return Ok(WatchExit::Cancelled),
                Some(Ok(names)) => {
                    for name in &names {
                        self.spawn_child(&claims, &path, name, &token, Discovery::Eager);
                    }
                }
                Some(Err(e)) => return self.startup_failed(&path, discovered, e),
            }

            debug!(path = %path, "branch started");
            let exit = CombinedWatcher::new(
                self.coordinator.clone(),
                self.dispatch.clone(),
                path.clone(),
                self.read_timeout,
            )
            .with_children_dispatch(spawner)
            .run(token.clone())
            .await;

            if matches!(exit, Ok(WatchExit::Deleted)) {
                self.settle_children(&path, &claims, &token).await;
            }
            token.cancel();
            debug!(path = %path, exit = ?exit, "branch stopped");
            drop(lease);
            exit
        }
        .boxed()
    }

    /// A node is only deleted after its children, so their branches are
    /// already ending on their own. Let them report it before the token takes
    /// them down, bounded by the read timeout.
    async fn settle_children(
        &self,
        path: &str,
        claims: &ChildClaims,
        token: &CancellationToken,
    ) {
        let pending = claims.pending();
        if pending.is_empty() {
            return;
        }
        trace!(path, pending = pending.len(), "waiting for child branches to wind down");
        let all_done = join_all(pending.iter().map(|done| done.cancelled()));
        tokio::select! {
            _ = token.cancelled() => {}
            settled = timeout(self.read_timeout, all_done) => {
                if settled.is_err() {
                    debug!(path, "child branches outlived their parent's deletion, cancelling");
                }
            }
        }
    }

    /// A discovered child that vanished before its branch could start is an
    /// ordinary race, not a failure: nothing was ever dispatched for it.
    fn startup_failed(
        &self,
        path: &str,
        discovered: bool,
        e: Error,
    ) -> Result<WatchExit> {
        if discovered && e.is_not_found() {
            debug!(path, "node vanished before its branch started");
            return Ok(WatchExit::Deleted);
        }
        self.dispatch.error(path, &e);
        Err(e)
    }

    fn spawn_child(
        self: &Arc<Self>,
        claims: &Arc<ChildClaims>,
        parent: &str,
        name: &str,
        parent_token: &CancellationToken,
        discovery: Discovery,
    ) {
        if parent_token.is_cancelled() {
            return;
        }
        let path = join_path(parent, name);

        let slot = match claims.claim(name) {
            Claim::Fresh(slot) => slot,
            Claim::Busy(previous) if discovery == Discovery::Changed => {
                // gone and back again while the old branch is still winding down
                debug!(path = %path, "waiting for previous branch before respawning");
                let watcher = self.clone();
                let claims = claims.clone();
                let parent = parent.to_string();
                let name = name.to_string();
                let token = parent_token.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {}
                        _ = previous.cancelled() => {
                            watcher.spawn_child(&claims, &parent, &name, &token, Discovery::Retry);
                        }
                    }
                });
                return;
            }
            Claim::Busy(_) => {
                trace!(path = %path, ?discovery, "child already has a branch");
                return;
            }
        };

        match self.supervisor.admit(&path) {
            Ok(true) => {}
            Ok(false) => {
                claims.release(name, slot.generation);
                trace!(path = %path, "path already live under this root");
                return;
            }
            Err(e) => {
                claims.release(name, slot.generation);
                self.dispatch.error(&path, &e);
                return;
            }
        }

        let lease = BranchLease {
            path: path.clone(),
            supervisor: self.supervisor.clone(),
            parent: Some(ParentClaim {
                claims: claims.clone(),
                name: name.to_string(),
                slot,
            }),
        };
        debug!(path = %path, ?discovery, "spawning branch");
        tokio::spawn(self.clone().run_branch(lease, parent_token.child_token()));
    }
}

/// Handle to a subtree watch running on its own task
pub struct WatchHandle {
    root: String,
    token: CancellationToken,
    supervisor: Arc<BranchSupervisor>,
    task: JoinHandle<Result<WatchExit>>,
}

impl WatchHandle {
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Cancel the whole subtree. Does not wait.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn supervisor(&self) -> &Arc<BranchSupervisor> {
        &self.supervisor
    }

    pub fn live_paths(&self) -> Vec<String> {
        self.supervisor.live_paths()
    }

    pub fn live_branches(&self) -> usize {
        self.supervisor.live_branches()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the root branch and all descendants to finish.
    pub async fn join(self) -> Result<WatchExit> {
        self.task.await?
    }

    pub async fn shutdown(self) -> Result<WatchExit> {
        self.cancel();
        self.join().await
    }
}
