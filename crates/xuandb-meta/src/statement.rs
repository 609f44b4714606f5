//! Administrative statements.
//!
//! The SQL front end parses text into these statements; the meta service
//! consumes them. A statement knows the privileges its caller must hold
//! and how to execute itself, so the query layer stays a thin loop:
//! authorize, execute, render the rows.

use std::sync::Arc;

use xuandb_commons::{
    Database, Duration, FieldValue, NodeStatus, Privilege, RequiredPrivileges, User,
};

use crate::error::Result;
use crate::service::MetaService;

/// A parsed administrative statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateUser {
        name: String,
        password: String,
        privilege: Privilege,
    },
    DropUser {
        name: String,
    },
    SetPassword {
        name: String,
        password: String,
    },
    CreateDatabase {
        name: String,
        duration: Duration,
    },
    DropDatabase {
        name: String,
    },
    ShowUsers,
    ShowDatabases,
    ShowNodes,
}

/// Tabular result of a statement; empty for mutations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementResult {
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<FieldValue>>,
}

impl StatementResult {
    fn empty() -> StatementResult {
        StatementResult::default()
    }
}

impl Statement {
    /// The privileges required to execute this statement.
    pub fn required_privileges(&self) -> RequiredPrivileges {
        match self {
            Statement::CreateUser { .. }
            | Statement::DropUser { .. }
            | Statement::SetPassword { .. }
            | Statement::CreateDatabase { .. }
            | Statement::DropDatabase { .. }
            | Statement::ShowUsers => RequiredPrivileges::global(Privilege::ADMIN),
            Statement::ShowNodes => RequiredPrivileges::global(Privilege::DEBUG),
            Statement::ShowDatabases => RequiredPrivileges::default(),
        }
    }

    /// Execute the statement against the meta service.
    pub async fn execute(&self, svc: &MetaService) -> Result<StatementResult> {
        match self {
            Statement::CreateUser {
                name,
                password,
                privilege,
            } => {
                let mut user = User::new(name.clone(), password.clone());
                user.privilege = *privilege;
                svc.create_user(user).await?;
                Ok(StatementResult::empty())
            }
            Statement::DropUser { name } => {
                svc.drop_user(name).await?;
                Ok(StatementResult::empty())
            }
            Statement::SetPassword { name, password } => {
                svc.set_password(name, password).await?;
                Ok(StatementResult::empty())
            }
            Statement::CreateDatabase { name, duration } => {
                svc.create_database(Database::new(name.clone(), *duration)).await?;
                Ok(StatementResult::empty())
            }
            Statement::DropDatabase { name } => {
                svc.drop_database(name).await?;
                Ok(StatementResult::empty())
            }
            Statement::ShowUsers => Ok(user_rows(&svc.users())),
            Statement::ShowDatabases => Ok(database_rows(&svc.databases())),
            Statement::ShowNodes => Ok(node_rows(&svc.node_statuses())),
        }
    }
}

fn user_rows(users: &[Arc<User>]) -> StatementResult {
    StatementResult {
        columns: vec!["name", "system", "privilege"],
        rows: users
            .iter()
            .map(|u| {
                vec![
                    FieldValue::from(u.name.clone()),
                    FieldValue::from(u.system),
                    FieldValue::from(u.privilege.to_string()),
                ]
            })
            .collect(),
    }
}

fn database_rows(databases: &[Arc<Database>]) -> StatementResult {
    StatementResult {
        columns: vec!["name", "duration"],
        rows: databases
            .iter()
            .map(|d| {
                vec![
                    FieldValue::from(d.name.clone()),
                    FieldValue::from(d.duration),
                ]
            })
            .collect(),
    }
}

fn node_rows(nodes: &[NodeStatus]) -> StatementResult {
    StatementResult {
        columns: vec!["id", "address", "role", "leader", "state", "lastHeartbeat"],
        rows: nodes
            .iter()
            .map(|n| {
                vec![
                    FieldValue::from(n.info.id),
                    FieldValue::from(n.info.addr.clone()),
                    FieldValue::from(n.info.role.to_string()),
                    FieldValue::from(n.leader),
                    FieldValue::from(n.state.to_string()),
                    FieldValue::from(n.info.last_heartbeat_time),
                ]
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use xuandb_commons::{NodeInfo, NodeRole, NodeState};

    #[test]
    fn test_required_privileges() {
        let admin_only = [
            Statement::CreateUser {
                name: "a".into(),
                password: "b".into(),
                privilege: Privilege::NONE,
            },
            Statement::DropUser { name: "a".into() },
            Statement::ShowUsers,
        ];
        for stmt in &admin_only {
            assert_eq!(
                stmt.required_privileges(),
                RequiredPrivileges::global(Privilege::ADMIN)
            );
        }

        assert_eq!(
            Statement::ShowNodes.required_privileges(),
            RequiredPrivileges::global(Privilege::DEBUG)
        );
        assert_eq!(
            Statement::ShowDatabases.required_privileges(),
            RequiredPrivileges::default()
        );
    }

    #[test]
    fn test_user_rows() {
        let mut root = User::new("root", "pw");
        root.system = true;
        root.privilege = Privilege::ADMIN;

        let result = user_rows(&[Arc::new(root)]);
        assert_eq!(result.columns, ["name", "system", "privilege"]);
        assert_eq!(
            result.rows,
            vec![vec![
                FieldValue::from("root"),
                FieldValue::from(true),
                FieldValue::from("ADMIN"),
            ]]
        );
    }

    #[test]
    fn test_database_rows() {
        let db = Database::new("metrics", "7d".parse().unwrap());
        let result = database_rows(&[Arc::new(db)]);
        assert_eq!(result.rows[0][1], FieldValue::Duration("7d".parse().unwrap()));
    }

    #[test]
    fn test_node_rows() {
        let status = NodeStatus {
            info: NodeInfo {
                id: 2,
                addr: "10.0.0.2:8002".into(),
                role: NodeRole::META,
                last_heartbeat_time: Utc::now(),
            },
            leader: true,
            state: NodeState::Alive,
        };
        let result = node_rows(&[status]);
        assert_eq!(result.rows[0][0], FieldValue::Integer(2));
        assert_eq!(result.rows[0][3], FieldValue::Bool(true));
        assert_eq!(result.rows[0][4], FieldValue::from("alive"));
    }
}
