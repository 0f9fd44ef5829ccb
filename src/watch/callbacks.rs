use std::fmt::Debug;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tracing::trace;
use tracing::warn;

use crate::Error;

pub type NodeCallback = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;
pub type ChildrenCallback = Arc<dyn Fn(&str, &[String], &[String]) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&str, &Error) + Send + Sync>;

/// Sink for everything a watcher observes.
///
/// Invocation is synchronous: a watcher does not re-arm until the call
/// returns, so a slow implementation only throttles the branch calling it.
pub trait Dispatch: Send + Sync + 'static {
    fn changed(
        &self,
        path: &str,
        data: &[u8],
    );

    fn deleted(
        &self,
        path: &str,
        data: &[u8],
    );

    /// `all` is the full current listing, `added` the names absent at the
    /// previous observation.
    fn children(
        &self,
        path: &str,
        all: &[String],
        added: &[String],
    );

    fn error(
        &self,
        path: &str,
        err: &Error,
    );
}

/// Four independently optional callbacks. Unset ones are skipped.
#[derive(Clone, Default)]
pub struct CallbackSet {
    pub changed: Option<NodeCallback>,
    pub deleted: Option<NodeCallback>,
    pub children: Option<ChildrenCallback>,
    pub error: Option<ErrorCallback>,
}

impl Debug for CallbackSet {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CallbackSet")
            .field("changed", &self.changed.is_some())
            .field("deleted", &self.deleted.is_some())
            .field("children", &self.children.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

impl CallbackSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_changed(
        mut self,
        f: impl Fn(&str, &[u8]) + Send + Sync + 'static,
    ) -> Self {
        self.changed = Some(Arc::new(f));
        self
    }

    pub fn on_deleted(
        mut self,
        f: impl Fn(&str, &[u8]) + Send + Sync + 'static,
    ) -> Self {
        self.deleted = Some(Arc::new(f));
        self
    }

    pub fn on_children(
        mut self,
        f: impl Fn(&str, &[String], &[String]) + Send + Sync + 'static,
    ) -> Self {
        self.children = Some(Arc::new(f));
        self
    }

    pub fn on_error(
        mut self,
        f: impl Fn(&str, &Error) + Send + Sync + 'static,
    ) -> Self {
        self.error = Some(Arc::new(f));
        self
    }
}

impl Dispatch for CallbackSet {
    fn changed(
        &self,
        path: &str,
        data: &[u8],
    ) {
        if let Some(cb) = &self.changed {
            cb(path, data);
        }
    }

    fn deleted(
        &self,
        path: &str,
        data: &[u8],
    ) {
        if let Some(cb) = &self.deleted {
            cb(path, data);
        }
    }

    fn children(
        &self,
        path: &str,
        all: &[String],
        added: &[String],
    ) {
        if let Some(cb) = &self.children {
            cb(path, all, added);
        }
    }

    fn error(
        &self,
        path: &str,
        err: &Error,
    ) {
        match &self.error {
            Some(cb) => cb(path, err),
            None => warn!(path, "watch error with no error callback bound: {}", err),
        }
    }
}

/// Default callback set plus optional per-path overrides.
///
/// A per-path binding fully replaces the defaults for that exact path; sets
/// are never merged. Both layers may be changed while watchers run: every
/// dispatch resolves a snapshot (`Arc<CallbackSet>`) and invokes it without
/// holding any lock, so a callback may itself rebind handlers.
#[derive(Default)]
pub struct CallbackRegistry {
    defaults: ArcSwap<CallbackSet>,
    overrides: DashMap<String, Arc<CallbackSet>>,
}

impl Debug for CallbackRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("defaults", &**self.defaults.load())
            .field("overrides", &self.overrides.len())
            .finish()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(defaults: CallbackSet) -> Self {
        Self {
            defaults: ArcSwap::from_pointee(defaults),
            overrides: DashMap::new(),
        }
    }

    pub fn set_defaults(
        &self,
        defaults: CallbackSet,
    ) {
        self.defaults.store(Arc::new(defaults));
    }

    /// Copy-on-write edit of the default set.
    ///
    /// `f` may run more than once if another writer races this one.
    pub fn update_defaults<F>(
        &self,
        f: F,
    ) where
        F: Fn(&mut CallbackSet),
    {
        self.defaults.rcu(|current| {
            let mut next = CallbackSet::clone(current);
            f(&mut next);
            next
        });
    }

    pub fn bind(
        &self,
        path: impl Into<String>,
        callbacks: CallbackSet,
    ) {
        let path = path.into();
        trace!(path = %path, ?callbacks, "binding per-path callbacks");
        self.overrides.insert(path, Arc::new(callbacks));
    }

    pub fn unbind(
        &self,
        path: &str,
    ) -> Option<Arc<CallbackSet>> {
        self.overrides.remove(path).map(|(_, set)| set)
    }

    /// The set that applies to `path` right now.
    pub fn resolve(
        &self,
        path: &str,
    ) -> Arc<CallbackSet> {
        match self.overrides.get(path) {
            Some(set) => set.value().clone(),
            None => self.defaults.load_full(),
        }
    }
}

impl Dispatch for CallbackRegistry {
    fn changed(
        &self,
        path: &str,
        data: &[u8],
    ) {
        self.resolve(path).changed(path, data);
    }

    fn deleted(
        &self,
        path: &str,
        data: &[u8],
    ) {
        self.resolve(path).deleted(path, data);
    }

    fn children(
        &self,
        path: &str,
        all: &[String],
        added: &[String],
    ) {
        self.resolve(path).children(path, all, added);
    }

    fn error(
        &self,
        path: &str,
        err: &Error,
    ) {
        self.resolve(path).error(path, err);
    }
}
