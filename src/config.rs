//! Configuration for a Deva or Manusya node.
//!
//! Everything a group needs to find its peers, its data directory, and
//! its consensus timing, loaded from a TOML file with sensible defaults
//! for local runs.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for this group's `log/`, `raft_meta/`, `snapshot/`,
    /// and `db/` subdirectories.
    pub data_path: PathBuf,

    /// Address this node's RPC/consensus listener binds to.
    pub listen_address: SocketAddr,

    /// Comma-separated initial peer list for cluster bootstrap.
    pub initial_configuration: String,

    /// Raft election timeout, in milliseconds.
    pub election_timeout_ms: u64,

    /// Interval between snapshot attempts, in seconds.
    pub snapshot_interval_s: u64,

    /// Disable the interactive CLI surface (`sad`) entirely.
    pub disable_cli: bool,

    /// Durable store backend selection.
    pub storage: StorageConfig,
}

/// Storage backend selection and its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which `Store` implementation to construct.
    pub backend: StorageBackend,
}

/// Available `Store` backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Volatile in-memory map. Used for tests and ephemeral nodes.
    Memory,
    /// Durable, ordered, embedded key-value store (sled), rooted under
    /// `data_path/db`.
    Sled,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./data"),
            listen_address: "127.0.0.1:7870".parse().expect("static address parses"),
            initial_configuration: String::new(),
            election_timeout_ms: 500,
            snapshot_interval_s: 120,
            disable_cli: false,
            storage: StorageConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { backend: StorageBackend::Memory }
    }
}

impl Config {
    /// Parse configuration from a TOML file on disk.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::invalid_argument(format!("bad config at {}: {e}", path.display())))
    }

    /// Load configuration from an optional path, falling back to defaults
    /// and logging the outcome either way.
    pub fn load_or_default(path: Option<&std::path::Path>) -> Self {
        match path {
            Some(path) => match Self::load(path) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to load configuration, using defaults");
                    Config::default()
                }
            },
            None => {
                tracing::info!("no config file specified, using defaults");
                Config::default()
            }
        }
    }

    /// Peer addresses parsed out of `initial_configuration`.
    pub fn peers(&self) -> Vec<String> {
        self.initial_configuration
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// The `db/` subdirectory under `data_path`, used by the durable
    /// `Store` backend.
    pub fn db_path(&self) -> PathBuf {
        self.data_path.join("db")
    }

    /// The `snapshot/` subdirectory under `data_path`.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_path.join("snapshot")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert!(config.peers().is_empty());
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn parses_peer_list() {
        let mut config = Config::default();
        config.initial_configuration = "127.0.0.1:7870, 127.0.0.1:7871,127.0.0.1:7872".into();
        assert_eq!(config.peers(), vec!["127.0.0.1:7870", "127.0.0.1:7871", "127.0.0.1:7872"]);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.listen_address, config.listen_address);
        assert_eq!(parsed.election_timeout_ms, config.election_timeout_ms);
    }

    #[test]
    fn load_or_default_falls_back_on_missing_file() {
        let config = Config::load_or_default(Some(std::path::Path::new("/nonexistent/path/config.toml")));
        assert_eq!(config.data_path, Config::default().data_path);
    }
}
