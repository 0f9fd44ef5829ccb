use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Watch tree behaviour
///
/// ```toml
/// [watch]
/// read_timeout_ms = 5000
/// max_branches = 0 # unbounded
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Upper bound for each read-and-arm round trip (unit: milliseconds)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Cap on concurrently live branches under one subtree root (0 = unbounded)
    ///
    /// A spawn beyond the cap is skipped and reported through the error
    /// callback of the path that could not be watched.
    #[serde(default)]
    pub max_branches: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout_ms(),
            max_branches: 0,
        }
    }
}

impl WatchConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn branch_limit(&self) -> Option<usize> {
        (self.max_branches > 0).then_some(self.max_branches)
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch.read_timeout_ms must be greater than 0".to_string(),
            )));
        }
        Ok(())
    }
}

fn default_read_timeout_ms() -> u64 {
    5000
}
