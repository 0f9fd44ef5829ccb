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
use crate::WatchEventKind;

/// Keeps a single node's data watch perpetually armed.
///
/// Every successful read dispatches `changed`, the very first one included.
/// A `NodeDeleted` fire dispatches `deleted` with the last observed payload
/// and ends the automaton. A read or arm failure is dispatched as `error`
/// exactly once and also ends it; restarting is up to the caller.
pub struct NodeWatcher {
    coordinator: Arc<dyn Coordinator>,
    dispatch: Arc<dyn Dispatch>,
    path: String,
    read_timeout: Duration,
}

impl NodeWatcher {
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
        let mut last: Option<Vec<u8>> = None;

        loop {
            // Reading
            let armed = call_or_cancel(
                &token,
                path,
                self.read_timeout,
                self.coordinator.read_and_watch(path),
            )
            .await;

            let (data, stat, watch) = match armed {
                None => return Ok(self.cancelled()),
                Some(Ok(armed)) => armed,
                // changed, then gone before we could re-read: that is the deletion
                Some(Err(e)) if e.is_not_found() && last.is_some() => {
                    return Ok(self.deleted(last.unwrap_or_default()));
                }
                Some(Err(e)) => {
                    self.dispatch.error(path, &e);
                    return Err(e);
                }
            };

            if token.is_cancelled() {
                return Ok(self.cancelled());
            }
            trace!(path, version = stat.version, "node watch armed");
            self.dispatch.changed(path, &data);
            last = Some(data);

            // Armed
            tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(self.cancelled()),
                fired = watch.fired() => match fired {
                    Ok(event) if event.kind == WatchEventKind::NodeDeleted => {
                        return Ok(self.deleted(last.unwrap_or_default()));
                    }
                    Ok(event) => {
                        trace!(path, kind = ?event.kind, "node watch fired, re-arming");
                    }
                    Err(e) => {
                        self.dispatch.error(path, &e);
                        return Err(e);
                    }
                },
            }
        }
    }

    fn deleted(
        &self,
        last: Vec<u8>,
    ) -> WatchExit {
        debug!(path = %self.path, "node deleted");
        self.dispatch.deleted(&self.path, &last);
        WatchExit::Deleted
    }

    fn cancelled(&self) -> WatchExit {
        trace!(path = %self.path, "node watcher cancelled");
        WatchExit::Cancelled
    }
}
