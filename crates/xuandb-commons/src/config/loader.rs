//! Loading, normalization, and validation of the cluster configuration.

use std::fs;
use std::path::Path;

use thiserror::Error;

use super::{Config, NodeConfig, RaftSnapshotStore, RaftStore};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load a configuration from a TOML file and normalize it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path)?;
        Config::from_toml(&text)
    }

    /// Parse a configuration from TOML text and normalize it.
    pub fn from_toml(text: &str) -> Result<Config, ConfigError> {
        let mut cfg: Config = toml::from_str(text)?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    /// The configuration of the node with the given id.
    pub fn node(&self, id: u64) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn normalize_and_validate(&mut self) -> Result<(), ConfigError> {
        if self.cluster_name.is_empty() {
            return Err(ConfigError::Invalid("'cluster-name' is required".into()));
        }
        if self.nodes.is_empty() {
            return Err(ConfigError::Invalid("at least one node is required".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for node in &mut self.nodes {
            if node.id == 0 {
                return Err(ConfigError::Invalid("node id must be > 0".into()));
            }
            if !seen.insert(node.id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
            node.normalize_and_validate()?;
        }

        Ok(())
    }
}

impl NodeConfig {
    fn normalize_and_validate(&mut self) -> Result<(), ConfigError> {
        if self.http_addr.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "node {}: 'http-addr' is required",
                self.id
            )));
        }
        if self.meta.raft_addr.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "node {}: 'meta.raft-addr' is required",
                self.id
            )));
        }

        let meta = &mut self.meta;
        if !meta.raft_voter {
            // Non-voters never recover local raft state, so durable stores
            // would only accumulate garbage.
            meta.raft_store = RaftStore::Memory;
            meta.raft_snapshot_store = RaftSnapshotStore::Discard;
            meta.data_dir = None;
            return Ok(());
        }

        let needs_dir = meta.raft_store == RaftStore::Rocksdb
            || meta.raft_snapshot_store == RaftSnapshotStore::File;
        if needs_dir && meta.data_dir.is_none() {
            return Err(ConfigError::Invalid(format!(
                "node {}: 'meta.data-dir' is required for persistent stores",
                self.id
            )));
        }

        Ok(())
    }
}
