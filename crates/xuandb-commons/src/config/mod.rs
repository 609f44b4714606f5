//! Cluster configuration.
//!
//! Loaded from a TOML file shared by every node; each process picks its own
//! entry out of `nodes` by id. Keys are kebab-case:
//!
//! ```toml
//! cluster-name = "xuan"
//!
//! [log]
//! level = "info"
//!
//! [[nodes]]
//! id = 1
//! http-addr = "127.0.0.1:8001"
//!
//! [nodes.meta]
//! raft-voter = true
//! raft-addr = "127.0.0.1:9001"
//! raft-store = "rocksdb"
//! raft-snapshot-store = "file"
//! data-dir = "/var/lib/xuandb/1"
//! ```

mod loader;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use loader::ConfigError;

/// The complete cluster configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    #[serde(default)]
    pub log: LogConfig,
}

/// Configuration of a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeConfig {
    pub id: u64,

    /// Address the node HTTP API listens on.
    pub http_addr: String,

    /// When set, the host part of `http-addr` and `meta.raft-addr` is
    /// rewritten to this name so containerized peers can reach the node by
    /// a stable hostname.
    #[serde(default)]
    pub domain_name: Option<String>,

    pub meta: MetaConfig,

    /// Present when the node runs the data service.
    #[serde(default)]
    pub data: Option<DataConfig>,

    /// Present when the node runs the query service.
    #[serde(default)]
    pub query: Option<QueryConfig>,
}

impl NodeConfig {
    /// The HTTP address peers should use to reach this node. When
    /// `domain-name` is set the host part is replaced by it, so the
    /// listen address can stay a wildcard inside a container.
    pub fn advertised_http_addr(&self) -> String {
        match &self.domain_name {
            Some(domain) => rewrite_host(&self.http_addr, domain),
            None => self.http_addr.clone(),
        }
    }

    /// The Raft RPC address peers should use to reach this node.
    pub fn advertised_raft_addr(&self) -> String {
        match &self.domain_name {
            Some(domain) => rewrite_host(&self.meta.raft_addr, domain),
            None => self.meta.raft_addr.clone(),
        }
    }
}

/// Replace the host part of a `host:port` address, keeping the port.
fn rewrite_host(addr: &str, host: &str) -> String {
    match addr.rsplit_once(':') {
        Some((_, port)) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Meta service configuration of a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetaConfig {
    #[serde(default)]
    pub raft_voter: bool,

    /// Address the Raft RPC server listens on.
    pub raft_addr: String,

    #[serde(default)]
    pub raft_store: RaftStore,

    #[serde(default)]
    pub raft_snapshot_store: RaftSnapshotStore,

    /// Directory for the persistent Raft store and snapshots. Required for
    /// voters using persistent stores.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Backing store for the Raft log and vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaftStore {
    #[serde(alias = "inmem")]
    Memory,
    #[default]
    #[serde(alias = "disk")]
    Rocksdb,
}

/// Backing store for Raft snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaftSnapshotStore {
    #[serde(alias = "none", alias = "null")]
    Discard,
    #[serde(alias = "inmem")]
    Memory,
    #[default]
    File,
}

/// Data service configuration; its presence marks the role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataConfig {}

/// Query service configuration; its presence marks the role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryConfig {}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path; console-only when absent.
    #[serde(default)]
    pub file_path: Option<String>,

    #[serde(default = "default_true")]
    pub log_to_console: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            file_path: None,
            log_to_console: true,
        }
    }
}

fn default_cluster_name() -> String {
    "xuandb".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
