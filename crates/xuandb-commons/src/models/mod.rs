//! Core data model of the cluster catalog and node runtime state.

mod database;
mod field_value;
mod node;
mod privilege;
mod user;

pub use database::Database;
pub use field_value::FieldValue;
pub use node::{NodeInfo, NodeRole, NodeState, NodeStatus};
pub use privilege::{Privilege, RequiredPrivileges};
pub use user::User;
