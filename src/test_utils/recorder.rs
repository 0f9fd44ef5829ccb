use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::timeout;

use super::WAIT;
use crate::Dispatch;
use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Changed {
        path: String,
        data: String,
    },
    Deleted {
        path: String,
        data: String,
    },
    Children {
        path: String,
        all: Vec<String>,
        added: Vec<String>,
    },
    Error {
        path: String,
        message: String,
    },
}

impl Recorded {
    pub fn path(&self) -> &str {
        match self {
            Recorded::Changed { path, .. }
            | Recorded::Deleted { path, .. }
            | Recorded::Children { path, .. }
            | Recorded::Error { path, .. } => path,
        }
    }
}

/// Dispatch sink that keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<Recorded>>,
    notify: Notify,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(
        &self,
        event: Recorded,
    ) {
        self.events.lock().push(event);
        self.notify.notify_waiters();
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn changes_for(
        &self,
        path: &str,
    ) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Changed { path: p, data } if p == path => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn deletions_for(
        &self,
        path: &str,
    ) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Deleted { path: p, data } if p == path => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(all, added)` per children dispatch for `path`.
    pub fn children_for(
        &self,
        path: &str,
    ) -> Vec<(Vec<String>, Vec<String>)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Children { path: p, all, added } if p == path => {
                    Some((all.clone(), added.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn errors_for(
        &self,
        path: &str,
    ) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Error { path: p, message } if p == path => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn all_errors(&self) -> Vec<Recorded> {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, Recorded::Error { .. }))
            .cloned()
            .collect()
    }

    /// Wait until `cond` holds over the recorded events; panics after [`WAIT`].
    pub async fn wait_for<F>(
        &self,
        what: &str,
        cond: F,
    ) where
        F: Fn(&[Recorded]) -> bool,
    {
        let waited = timeout(WAIT, async {
            loop {
                let notified = self.notify.notified();
                if cond(&self.events.lock()) {
                    return;
                }
                notified.await;
            }
        })
        .await;
        if waited.is_err() {
            panic!("timed out waiting for: {what}\nrecorded: {:#?}", self.events());
        }
    }

    pub async fn wait_for_change(
        &self,
        path: &str,
        data: &str,
    ) {
        self.wait_for(&format!("changed({path}, {data})"), |events| {
            events.iter().any(|e| {
                matches!(e, Recorded::Changed { path: p, data: d } if p == path && d == data)
            })
        })
        .await;
    }

    pub async fn wait_for_deletion(
        &self,
        path: &str,
    ) {
        self.wait_for(&format!("deleted({path})"), |events| {
            events
                .iter()
                .any(|e| matches!(e, Recorded::Deleted { path: p, .. } if p == path))
        })
        .await;
    }
}

fn text(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

impl Dispatch for EventLog {
    fn changed(
        &self,
        path: &str,
        data: &[u8],
    ) {
        self.push(Recorded::Changed {
            path: path.to_string(),
            data: text(data),
        });
    }

    fn deleted(
        &self,
        path: &str,
        data: &[u8],
    ) {
        self.push(Recorded::Deleted {
            path: path.to_string(),
            data: text(data),
        });
    }

    fn children(
        &self,
        path: &str,
        all: &[String],
        added: &[String],
    ) {
        self.push(Recorded::Children {
            path: path.to_string(),
            all: all.to_vec(),
            added: added.to_vec(),
        });
    }

    fn error(
        &self,
        path: &str,
        err: &Error,
    ) {
        self.push(Recorded::Error {
            path: path.to_string(),
            message: err.to_string(),
        });
    }
}
