use std::io::Write;

use serde::Deserialize;
use serde::Serialize;
use tempfile::NamedTempFile;
use zconf::CreateMode;
use zconf::ZconfConfig;

use crate::common::enable_logger;
use crate::common::journaled_client;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Feature {
    enabled: bool,
    rollout: u8,
}

#[tokio::test]
async fn test_put_is_create_or_update() {
    enable_logger();
    let mut config = ZconfConfig::default();
    config.write.create_parents = true;
    let (_coordinator, zconf, _journal) = journaled_client(config);
    let feature = Feature {
        enabled: true,
        rollout: 10,
    };

    assert_eq!(zconf.put("/features/dark", &feature).await.unwrap().version, 0);
    let feature = Feature {
        rollout: 50,
        ..feature
    };
    assert_eq!(zconf.put("/features/dark", &feature).await.unwrap().version, 1);
    assert_eq!(zconf.get_as::<Feature>("/features/dark").await.unwrap(), feature);

    let children = zconf.children("/features").await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].path, "/features/dark");
}

#[tokio::test]
async fn test_missing_parent_without_create_parents() {
    enable_logger();
    let (_coordinator, zconf, _journal) = journaled_client(ZconfConfig::default());

    let err = zconf.put("/no/parent", "x").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_write_section_loaded_from_file() {
    enable_logger();
    let mut file = NamedTempFile::with_suffix(".toml").unwrap();
    writeln!(
        file,
        r#"
[write]
create_mode = "ephemeral"
create_parents = true

[retry.put]
max_retries = 5
"#
    )
    .unwrap();
    let config = ZconfConfig::default()
        .with_override_config(file.path().to_str().unwrap())
        .unwrap()
        .validate()
        .unwrap();
    assert_eq!(config.retry.put.max_retries, 5);

    let (coordinator, zconf, _journal) = journaled_client(config);
    zconf.put("/eph/node", "x").await.unwrap();

    assert_eq!(coordinator.create_mode("/eph/node"), Some(CreateMode::Ephemeral));
    assert_eq!(coordinator.create_mode("/eph"), Some(CreateMode::Persistent));
}
