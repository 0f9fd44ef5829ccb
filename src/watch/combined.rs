use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::select;
use futures::future::Either;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::ChildrenWatcher;
use super::Dispatch;
use super::NodeWatcher;
use super::WatchExit;
use crate::Coordinator;
use crate::Error;
use crate::Result;

/// Forwards to `inner`, letting through only the first error of a pair.
///
/// Both automata watch the same node, so one failure (session loss above all)
/// usually reaches both of them.
struct ReportOnce {
    inner: Arc<dyn Dispatch>,
    reported: Arc<AtomicBool>,
}

impl Dispatch for ReportOnce {
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
    }

    fn error(
        &self,
        path: &str,
        err: &Error,
    ) {
        if self.reported.swap(true, Ordering::SeqCst) {
            trace!(path, "error already reported for this node: {}", err);
            return;
        }
        self.inner.error(path, err);
    }
}

/// A node's data automaton and children automaton, run as two tasks.
///
/// The pair lives until either automaton terminates or `token` fires. On the
/// way out only the pair's own child token is cancelled: `token` itself, and
/// whatever else inherited it, is left to the caller. When the children
/// automaton sees the deletion first, the node automaton is still awaited
/// uncancelled so the `deleted` dispatch is not lost. A failure seen by both
/// automata reaches `error` once.
pub struct CombinedWatcher {
    coordinator: Arc<dyn Coordinator>,
    node_dispatch: Arc<dyn Dispatch>,
    children_dispatch: Arc<dyn Dispatch>,
    path: String,
    read_timeout: Duration,
}

impl CombinedWatcher {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        dispatch: Arc<dyn Dispatch>,
        path: impl Into<String>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            node_dispatch: dispatch.clone(),
            children_dispatch: dispatch,
            path: path.into(),
            read_timeout,
        }
    }

    /// Route children events through a different sink than data events.
    pub fn with_children_dispatch(
        mut self,
        dispatch: Arc<dyn Dispatch>,
    ) -> Self {
        self.children_dispatch = dispatch;
        self
    }

    pub async fn run(
        self,
        token: CancellationToken,
    ) -> Result<WatchExit> {
        let reported = Arc::new(AtomicBool::new(false));
        let node_dispatch: Arc<dyn Dispatch> = Arc::new(ReportOnce {
            inner: self.node_dispatch.clone(),
            reported: reported.clone(),
        });
        let children_dispatch: Arc<dyn Dispatch> = Arc::new(ReportOnce {
            inner: self.children_dispatch.clone(),
            reported,
        });

        let node = NodeWatcher::new(
            self.coordinator.clone(),
            node_dispatch.clone(),
            self.path.clone(),
            self.read_timeout,
        );
        let children = ChildrenWatcher::new(
            self.coordinator.clone(),
            children_dispatch,
            self.path.clone(),
            self.read_timeout,
        );

        let token = token.child_token();
        let node_task = tokio::spawn(node.run(token.clone()));
        let children_task = tokio::spawn(children.run(token.clone()));

        let (node_result, children_result) = match select(node_task, children_task).await {
            Either::Left((node_result, children_task)) => {
                token.cancel();
                (node_result, children_task.await)
            }
            Either::Right((children_result, node_task)) => {
                if !matches!(children_result, Ok(Ok(WatchExit::Deleted))) {
                    token.cancel();
                }
                let node_result = node_task.await;
                token.cancel();
                (node_result, children_result)
            }
        };

        let node_exit = self.flatten(node_result, &node_dispatch);
        let children_exit = self.flatten(children_result, &node_dispatch);
        debug!(path = %self.path, node = ?node_exit, children = ?children_exit, "watch pair stopped");

        match (node_exit, children_exit) {
            (Err(e), _) | (_, Err(e)) => Err(e),
            (Ok(WatchExit::Deleted), _) => Ok(WatchExit::Deleted),
            (Ok(_), Ok(_)) => Ok(WatchExit::Cancelled),
        }
    }

    /// A panicked automaton never dispatched its own error, so report it here.
    fn flatten(
        &self,
        joined: std::result::Result<Result<WatchExit>, JoinError>,
        dispatch: &Arc<dyn Dispatch>,
    ) -> Result<WatchExit> {
        match joined {
            Ok(r) => r,
            Err(e) => {
                let e = Error::from(e);
                dispatch.error(&self.path, &e);
                Err(e)
            }
        }
    }
}
