use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use zconf::WatchExit;
use zconf::ZconfConfig;

use crate::common::enable_logger;
use crate::common::journaled_client;

fn config() -> ZconfConfig {
    let mut config = ZconfConfig::default();
    config.write.create_parents = true;
    config
}

#[tokio::test]
async fn test_subtree_mirrors_every_change() {
    enable_logger();
    let (_coordinator, zconf, journal) = journaled_client(config());
    zconf.put("/svc/api/port", &8080).await.unwrap();

    let handle = zconf.spawn_watch_path(CancellationToken::new(), "/svc");
    journal.wait_for("changed /svc/api/port 8080").await;
    assert!(journal.contains("changed /svc "));
    assert!(journal.contains("changed /svc/api "));

    // grow the tree two levels below a node created after the watch started
    zconf
        .put("/svc/worker/limits/cpu", &json!({"max": 2}))
        .await
        .unwrap();
    journal.wait_for(r#"changed /svc/worker/limits/cpu {"max":2}"#).await;
    assert!(journal.contains("added /svc worker"));

    zconf.put("/svc/api/port", &9090).await.unwrap();
    journal.wait_for("changed /svc/api/port 9090").await;

    zconf.delete("/svc/api/port").await.unwrap();
    journal.wait_for("deleted /svc/api/port").await;
    assert_eq!(journal.count("deleted /svc/api/port"), 1);

    let expected = ["/svc", "/svc/api", "/svc/worker", "/svc/worker/limits", "/svc/worker/limits/cpu"];
    for _ in 0..600 {
        if handle.live_paths() == expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(handle.live_paths(), expected);
    assert_eq!(handle.shutdown().await.unwrap(), WatchExit::Cancelled);
    assert!(!journal.lines().iter().any(|l| l.starts_with("error")));
}

#[tokio::test]
async fn test_shutdown_releases_every_watch() {
    enable_logger();
    let (coordinator, zconf, journal) = journaled_client(config());
    for path in ["/t/a/x", "/t/a/y", "/t/b"] {
        zconf.put(path, "v").await.unwrap();
    }

    let handle = zconf.spawn_watch_path(CancellationToken::new(), "/t");
    journal.wait_for(r#"changed /t/a/y "v""#).await;
    journal.wait_for(r#"changed /t/b "v""#).await;
    assert_eq!(handle.live_branches(), 5);

    handle.shutdown().await.unwrap();

    for path in ["/t", "/t/a", "/t/a/x", "/t/a/y", "/t/b"] {
        assert_eq!(coordinator.data_watch_count(path), 0, "{path}");
        assert_eq!(coordinator.child_watch_count(path), 0, "{path}");
    }
    // writes after shutdown go unobserved
    zconf.put("/t/b", "late").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!journal.contains(r#"changed /t/b "late""#));
}

#[tokio::test]
async fn test_watch_path_returns_when_root_is_deleted() {
    enable_logger();
    let (coordinator, zconf, journal) = journaled_client(config());
    zconf.put("/gone/child", "c").await.unwrap();

    let watch = zconf.watch_path(CancellationToken::new(), "/gone");
    let deleter = async {
        journal.wait_for(r#"changed /gone/child "c""#).await;
        coordinator.delete_recursive("/gone").unwrap();
    };
    let (exit, _) = tokio::join!(watch, deleter);

    assert_eq!(exit.unwrap(), WatchExit::Deleted);
    assert!(journal.contains("deleted /gone"));
}

#[tokio::test]
async fn test_session_loss_surfaces_through_error_callback() {
    enable_logger();
    let (coordinator, zconf, journal) = journaled_client(config());
    zconf.put("/s/a", "1").await.unwrap();

    let handle = zconf.spawn_watch_path(CancellationToken::new(), "/s");
    journal.wait_for(r#"changed /s/a "1""#).await;

    coordinator.disconnect();

    assert!(handle.join().await.is_err());
    assert_eq!(journal.count("error /s"), 1);
    assert!(journal.count("error /s/a") <= 1);
    assert!(!journal.contains("deleted /s"));
}
