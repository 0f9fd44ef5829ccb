use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::call_or_cancel;
use super::Dispatch;
use super::WatchExit;
use crate::Coordinator;
use crate::Result;

/// Child names observed at one point in time. Order is irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildrenSnapshot {
    names: BTreeSet<String>,
}

impl ChildrenSnapshot {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// `self − previous`, by name. With no previous observation every name is new.
    pub fn added_since(
        &self,
        previous: Option<&ChildrenSnapshot>,
    ) -> Vec<String> {
        match previous {
            Some(prev) => self.names.difference(&prev.names).cloned().collect(),
            None => self.to_vec(),
        }
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }
}

/// Keeps a single node's children watch perpetually armed.
///
/// Dispatches `children(path, all, added)` after every listing. The first
/// listing has no baseline, so every existing child is reported as added.
/// Names that disappear are not reported here; each child's own
/// [`super::NodeWatcher`] reports its deletion.
///
/// When the watched node itself is deleted the re-read finds it missing and
/// the automaton stops quietly with [`WatchExit::Deleted`], leaving the
/// `deleted` dispatch to the node watcher.
pub struct ChildrenWatcher {
    coordinator: Arc<dyn Coordinator>,
    dispatch: Arc<dyn Dispatch>,
    path: String,
    read_timeout: Duration,
}

impl ChildrenWatcher {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        dispatch: Arc<dyn Dispatch>,
        path: impl Into<String>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            dispatch,
            path: path.into(),
            read_timeout,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn run(
        self,
        token: CancellationToken,
    ) -> Result<WatchExit> {
        let path = self.path.as_str();
        let mut previous: Option<ChildrenSnapshot> = None;

        loop {
            let armed = call_or_cancel(
                &token,
                path,
                self.read_timeout,
                self.coordinator.children_and_watch(path),
            )
            .await;

            let (names, watch) = match armed {
                None => return Ok(WatchExit::Cancelled),
                Some(Ok(armed)) => armed,
                Some(Err(e)) if e.is_not_found() && previous.is_some() => {
                    debug!(path, "children watcher stopping, node is gone");
                    return Ok(WatchExit::Deleted);
                }
                Some(Err(e)) => {
                    self.dispatch.error(path, &e);
                    return Err(e);
                }
            };

            if token.is_cancelled() {
                return Ok(WatchExit::Cancelled);
            }

            let current = ChildrenSnapshot::new(names);
            let added = current.added_since(previous.as_ref());
            trace!(path, total = current.len(), added = ?added, "children watch armed");
            self.dispatch.children(path, &current.to_vec(), &added);
            previous = Some(current);

            tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(WatchExit::Cancelled),
                fired = watch.fired() => match fired {
                    // NodeDeleted included: the re-read decides whether the node is really gone
                    Ok(event) => {
                        trace!(path, kind = ?event.kind, "children watch fired, re-arming");
                    }
                    Err(e) => {
                        self.dispatch.error(path, &e);
                        return Err(e);
                    }
                },
            }
        }
    }
}
