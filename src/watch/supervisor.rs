use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use dashmap::DashSet;
use tokio::sync::Notify;
use tracing::trace;

use crate::Result;
use crate::WatchError;

/// Book-keeping for every live branch under one subtree root.
///
/// Admission is the single point where the optional branch cap is enforced.
/// Paths are unique: a path is admitted at most once until released.
#[derive(Debug)]
pub struct BranchSupervisor {
    live: DashSet<String>,
    count: AtomicUsize,
    spawned: AtomicU64,
    limit: Option<usize>,
    idle: Notify,
}

impl BranchSupervisor {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            live: DashSet::new(),
            count: AtomicUsize::new(0),
            spawned: AtomicU64::new(0),
            limit,
            idle: Notify::new(),
        }
    }

    /// Reserve a slot for `path`.
    ///
    /// `Ok(false)` when `path` is already live under this root.
    pub fn admit(
        &self,
        path: &str,
    ) -> Result<bool> {
        let reserved = self.count.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match self.limit {
            Some(limit) if n >= limit => None,
            _ => Some(n + 1),
        });
        if reserved.is_err() {
            return Err(WatchError::BranchLimitExceeded {
                path: path.to_string(),
                limit: self.limit.unwrap_or_default(),
            }
            .into());
        }

        if !self.live.insert(path.to_string()) {
            self.count.fetch_sub(1, Ordering::SeqCst);
            return Ok(false);
        }
        self.spawned.fetch_add(1, Ordering::Relaxed);
        trace!(path, live = self.live_branches(), "branch admitted");
        Ok(true)
    }

    pub fn release(
        &self,
        path: &str,
    ) {
        if self.live.remove(path).is_none() {
            return;
        }
        let before = self.count.fetch_sub(1, Ordering::SeqCst);
        trace!(path, live = before - 1, "branch released");
        if before == 1 {
            self.idle.notify_waiters();
        }
    }

    pub fn is_live(
        &self,
        path: &str,
    ) -> bool {
        self.live.contains(path)
    }

    pub fn live_branches(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Sorted snapshot of live paths.
    pub fn live_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.live.iter().map(|p| p.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Branches admitted since creation, released ones included.
    pub fn total_spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Resolve once no branch is live.
    pub async fn drained(&self) {
        loop {
            let notified = self.idle.notified();
            if self.live_branches() == 0 {
                return;
            }
            notified.await;
        }
    }
}
