//! # xuandb-meta
//!
//! The meta service keeps the cluster's authoritative catalog (nodes,
//! users, and databases) strongly consistent across voters via a Raft
//! log.
//!
//! ## Key pieces
//!
//! - [`MetaService`]: the service instance owned by the process; startup,
//!   membership negotiation, and the programmatic write/read API.
//! - [`catalog::Catalog`]: the in-memory catalog with copy-on-write
//!   updates under a single mutex.
//! - [`command::MetaCommand`]: the closed set of commands replicated
//!   through the log, JSON-tagged by `op`.
//! - [`fsm::MetaFsm`]: applies committed commands; snapshot and restore.
//! - [`storage::MetaRaftStore`]: combined Raft storage, in-memory or
//!   RocksDB-backed, with pluggable snapshot persistence.
//! - [`network`] / [`http`]: the HTTP JSON Raft transport and the admin
//!   endpoints.
//! - [`statement::Statement`]: the administrative statements the query
//!   layer feeds into the service.

pub mod auth;
pub mod catalog;
pub mod client;
pub mod command;
pub mod error;
pub mod fsm;
pub mod heartbeat;
pub mod http;
pub mod network;
pub mod service;
pub mod statement;
pub mod storage;

pub use client::{CLUSTER_HEADER, LEADER_HINT_HEADER};
pub use error::{MetaError, Result};
pub use service::{JoinRequest, MetaService};
pub use statement::{Statement, StatementResult};
