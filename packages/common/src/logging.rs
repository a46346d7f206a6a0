//! Tracing bootstrap for hosts embedding flowdeck.

use crate::Config;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber. `RUST_LOG` wins over `Config::log_filter`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init(config: &Config) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .try_init()
        .is_ok()
}
