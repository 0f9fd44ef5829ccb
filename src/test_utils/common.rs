use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::Acl;
use crate::Coordinator;
use crate::CreateMode;
use crate::MemoryCoordinator;
use crate::WatchConfig;

pub const WAIT: Duration = Duration::from_secs(3);

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("zconf=debug")),
        )
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

pub fn test_watch_config() -> WatchConfig {
    WatchConfig {
        read_timeout_ms: 1000,
        max_branches: 0,
    }
}

/// Fresh namespace containing `nodes`, created in the given order.
pub async fn seeded(nodes: &[(&str, &str)]) -> Arc<MemoryCoordinator> {
    let coordinator = Arc::new(MemoryCoordinator::new());
    for (path, data) in nodes {
        create(&coordinator, path, data).await;
    }
    coordinator
}

pub async fn create(
    coordinator: &MemoryCoordinator,
    path: &str,
    data: &str,
) {
    coordinator
        .create(
            path,
            data.as_bytes().to_vec(),
            CreateMode::Persistent,
            &Acl::world_all(),
        )
        .await
        .unwrap_or_else(|e| panic!("seeding {path} failed: {e}"));
}

pub async fn update(
    coordinator: &MemoryCoordinator,
    path: &str,
    data: &str,
) {
    let stat = coordinator
        .exists(path)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("{path} missing"));
    coordinator
        .update(path, data.as_bytes().to_vec(), stat.version)
        .await
        .unwrap();
}

pub async fn remove(
    coordinator: &MemoryCoordinator,
    path: &str,
) {
    let stat = coordinator.exists(path).await.unwrap().unwrap();
    coordinator.delete(path, stat.version).await.unwrap();
}

/// Poll `cond` until it holds; panics after [`WAIT`].
pub async fn wait_until<F>(
    what: &str,
    cond: F,
) where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + WAIT;
    while !cond() {
        if Instant::now() > deadline {
            panic!("timed out waiting for: {what}");
        }
        sleep(Duration::from_millis(5)).await;
    }
}
