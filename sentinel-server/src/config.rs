//! TOML file configuration.
//!
//! Maps directly to the `sentinel-config.toml` file format:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//!
//! [listener]
//! rpc_url = "wss://eth-sepolia.example.com/v2/<key>"
//! ```

use sentinel_core::config::ListenerConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    pub listener: ListenerConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
        let config: FileConfig = toml::from_str(&raw)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config: FileConfig = toml::from_str(
            r#"
            [listener]
            rpc_url = "wss://eth-sepolia.example.com/v2/key"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert_eq!(config.listener.error_threshold, 3);
        assert_eq!(config.listener.settle_delay_ms, 1000);
    }

    #[test]
    fn parses_full_config() {
        let config: FileConfig = toml::from_str(
            r#"
            [server]
            listen = "127.0.0.1:3000"

            [listener]
            rpc_url = "https://eth-sepolia.example.com/v2/key"
            error_threshold = 5
            payment_poll_interval_ms = 2500
            reconcile_from_block = 7500000
            "#,
        )
        .unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.listener.error_threshold, 5);
        assert_eq!(config.listener.payment_poll_interval_ms, 2500);
        assert_eq!(config.listener.reconcile_from_block, 7_500_000);
        // Unset fields keep their defaults.
        assert_eq!(config.listener.badge_poll_interval_ms, 10_000);
    }
}
