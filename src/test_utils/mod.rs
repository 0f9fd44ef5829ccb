//! Shared helpers for the unit tests: logger setup, a recording callback
//! sink, namespace seeding and a service that never answers.
mod common;
mod recorder;
mod stalled;

pub use common::*;
pub use recorder::*;
pub use stalled::*;
