use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::CreateMode;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CreateModeKind {
    #[default]
    Persistent,
    Ephemeral,
    PersistentWithTtl,
}

/// Create-or-update write path
///
/// ```toml
/// [write]
/// create_mode = "persistent_with_ttl"
/// ttl_ms = 60000
/// create_parents = true
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct WriteConfig {
    /// Lifetime of nodes created by `put`
    #[serde(default)]
    pub create_mode: CreateModeKind,

    /// Only meaningful with `persistent_with_ttl` (unit: milliseconds)
    #[serde(default)]
    pub ttl_ms: u64,

    /// Create missing ancestors (empty payload) before creating the node
    #[serde(default)]
    pub create_parents: bool,
}

impl WriteConfig {
    pub fn create_mode(&self) -> CreateMode {
        match self.create_mode {
            CreateModeKind::Persistent => CreateMode::Persistent,
            CreateModeKind::Ephemeral => CreateMode::Ephemeral,
            CreateModeKind::PersistentWithTtl => {
                CreateMode::PersistentWithTtl(Duration::from_millis(self.ttl_ms))
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.create_mode == CreateModeKind::PersistentWithTtl && self.ttl_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "write.ttl_ms must be greater than 0 when create_mode = persistent_with_ttl"
                    .to_string(),
            )));
        }
        Ok(())
    }
}
