use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::sleep;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;
use zconf::MemoryCoordinator;
use zconf::Zconf;
use zconf::ZconfConfig;

pub const WAIT: Duration = Duration::from_secs(3);

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zconf=info")),
        )
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for integration test.");
}

/// Lines recorded by the callbacks a test installs.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(
        &self,
        line: String,
    ) {
        self.0.lock().push(line);
    }

    pub fn contains(
        &self,
        line: &str,
    ) -> bool {
        self.0.lock().iter().any(|l| l == line)
    }

    pub fn count(
        &self,
        line: &str,
    ) -> usize {
        self.0.lock().iter().filter(|l| *l == line).count()
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub async fn wait_for(
        &self,
        line: &str,
    ) {
        let deadline = Instant::now() + WAIT;
        while !self.contains(line) {
            if Instant::now() > deadline {
                panic!("timed out waiting for {line:?}, journal: {:#?}", self.lines());
            }
            sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Client over a fresh namespace with every callback journaled as
/// `changed <path> <data>`, `deleted <path>`, `added <path> <name>`, `error <path>`.
pub fn journaled_client(config: ZconfConfig) -> (Arc<MemoryCoordinator>, Zconf, Journal) {
    let coordinator = Arc::new(MemoryCoordinator::new());
    let zconf = Zconf::new(coordinator.clone(), config);
    let journal = Journal::default();

    let j = journal.clone();
    zconf.on_node_changed(move |path, data| {
        j.push(format!("changed {path} {}", String::from_utf8_lossy(data)))
    });
    let j = journal.clone();
    zconf.on_node_deleted(move |path, _| j.push(format!("deleted {path}")));
    let j = journal.clone();
    zconf.on_node_children(move |path, _, added| {
        for name in added {
            j.push(format!("added {path} {name}"));
        }
    });
    let j = journal.clone();
    zconf.on_node_error(move |path, _| j.push(format!("error {path}")));

    (coordinator, zconf, journal)
}
