//! Resilient recursive change notification over a hierarchical
//! coordination namespace.
//!
//! The coordination service only offers one-shot watches. This crate keeps
//! them perpetually re-armed, mirrors whole subtrees by spawning a watcher
//! per discovered node, and routes every change to user callbacks. Writes go
//! through a create-or-update path guarded by the node's data version.
//!
//! Entry point for applications is [`Zconf`]; the building blocks
//! ([`NodeWatcher`], [`ChildrenWatcher`], [`SubtreeWatcher`], [`Mutator`])
//! are public for callers that need finer control.

mod client;
mod codec;
mod config;
mod coordination;
mod errors;
mod mutator;
pub mod utils;
mod watch;

pub use client::*;
pub use codec::*;
pub use self::config::*;
pub use coordination::*;
pub use errors::*;
pub use mutator::*;
pub use utils::*;
pub use watch::*;


//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
