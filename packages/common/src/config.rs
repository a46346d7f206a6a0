use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONFIG_NAME: &str = "flowdeck.config.json";

/// Flowdeck configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Quiet period before an embedded widget's query string is committed
    #[serde(default = "default_query_sync_quiet_ms")]
    pub query_sync_quiet_ms: u64,

    /// Fallback tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Separator placed between a block name and its uniqueness counter
    #[serde(default = "default_name_suffix_separator")]
    pub name_suffix_separator: String,
}

fn default_query_sync_quiet_ms() -> u64 {
    5_000
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_name_suffix_separator() -> String {
    "_".to_string()
}

impl Config {
    /// Load config from a directory
    pub fn load(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            debug!(path = %config_path.display(), "Loading config");
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            // Return default config if none exists
            Ok(Config::default())
        }
    }

    pub fn query_sync_quiet_period(&self) -> Duration {
        Duration::from_millis(self.query_sync_quiet_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            query_sync_quiet_ms: default_query_sync_quiet_ms(),
            log_filter: default_log_filter(),
            name_suffix_separator: default_name_suffix_separator(),
        }
    }
}
