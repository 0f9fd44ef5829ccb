//! Perpetual watches built from one-shot registrations.
//!
//! The coordination service only offers watches that fire once. Everything in
//! this module exists to turn that into continuous notification:
//!
//! - [`NodeWatcher`] keeps one node's data watch armed: read, arm, dispatch
//!   `changed`, wait, repeat; dispatch `deleted` and stop on deletion.
//! - [`ChildrenWatcher`] keeps one node's children watch armed and reports the
//!   names that appeared since the previous listing.
//! - [`CombinedWatcher`] runs both automata for a node as two tasks and tears
//!   the pair down together.
//! - [`SubtreeWatcher`] mirrors a whole subtree: one combined watcher per node,
//!   spawning a new branch for every child it discovers.
//!
//! ```text
//!        Armed ──(event)──▶ Reading ──(ok)──▶ Armed
//!          │                   │
//!          │ NodeDeleted       │ read error
//!          ▼                   ▼
//!      Terminated          Terminated(errored)
//!
//!   cancellation in any state ──▶ Terminated(cancelled)
//! ```
//!
//! Callbacks are delivered through [`Dispatch`]; [`CallbackRegistry`] is the
//! default implementation, resolving per-path overrides on every event.
//!
//! Each branch costs two long-lived tasks plus its orchestrator, and the tree
//! grows with the namespace. [`crate::WatchConfig::max_branches`] can cap it.

mod callbacks;
mod children_watcher;
mod combined;
mod node_watcher;
mod subtree;
mod supervisor;

pub use callbacks::*;
pub use children_watcher::*;
pub use combined::*;
pub use node_watcher::*;
pub use subtree::*;
pub use supervisor::*;


use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::CoordinationError;
use crate::Result;

/// How a watcher stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    /// The watched node was deleted
    Deleted,
    /// The branch's cancellation token fired
    Cancelled,
}

/// Await a coordination call, bounded by `limit`, unless `token` fires first.
///
/// `None` means the call was abandoned because of cancellation.
pub(crate) async fn call_or_cancel<T, F>(
    token: &CancellationToken,
    path: &str,
    limit: Duration,
    call: F,
) -> Option<Result<T>>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        r = timeout(limit, call) => Some(r.unwrap_or_else(|_| {
            Err(CoordinationError::Timeout {
                path: path.to_string(),
                duration: limit,
            }
            .into())
        })),
    }
}
