//! # xuandb-commons
//!
//! Shared types and utilities for XuanDB: the catalog models (users,
//! databases, privileges), runtime node descriptors, extended duration
//! parsing, and the cluster configuration surface consumed by the services.

pub mod config;
pub mod duration;
pub mod models;

pub use config::{Config, MetaConfig, NodeConfig};
pub use duration::Duration;
pub use models::{
    Database, FieldValue, NodeInfo, NodeRole, NodeState, NodeStatus, Privilege,
    RequiredPrivileges, User,
};
