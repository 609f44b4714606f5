//! The replicated state machine.
//!
//! Raft applies committed entries here in strict log order. Every apply
//! re-validates its precondition: a command may have raced another for the
//! same key between the leader's pre-check and the commit, so `create`
//! rejects duplicates again, `drop` treats absence as success, and
//! `set-password` rejects a user that vanished in between.

use std::sync::Arc;

use crate::catalog::{Catalog, CatalogSnapshot};
use crate::command::{ApplyOutcome, MetaCommand};
use crate::heartbeat::NodeTable;

/// State mutated by committed log entries: the durable catalog plus the
/// runtime node table (which is replicated but never snapshotted, since
/// heartbeats rebuild it).
pub struct MetaFsm {
    catalog: Arc<Catalog>,
    nodes: Arc<NodeTable>,
}

impl MetaFsm {
    pub fn new(catalog: Arc<Catalog>, nodes: Arc<NodeTable>) -> MetaFsm {
        MetaFsm { catalog, nodes }
    }

    /// Apply a committed command.
    pub fn apply(&self, cmd: &MetaCommand) -> ApplyOutcome {
        let result = match cmd {
            MetaCommand::CreateUser { user } => {
                let r = self.catalog.create_user(user.clone());
                if r.is_ok() {
                    log::info!("user created: {}", user.name);
                }
                r
            }
            MetaCommand::DropUser { name } => {
                self.catalog.drop_user(name);
                log::info!("user dropped: {name}");
                Ok(())
            }
            MetaCommand::SetPassword { name, password } => {
                self.catalog.set_password(name, password)
            }
            MetaCommand::CreateDatabase { database } => {
                let r = self.catalog.create_database(database.clone());
                if r.is_ok() {
                    log::info!("database created: {}", database.name);
                }
                r
            }
            MetaCommand::DropDatabase { name } => {
                self.catalog.drop_database(name);
                log::info!("database dropped: {name}");
                Ok(())
            }
            MetaCommand::UpdateNodeList { nodes } => {
                self.nodes.apply_node_list(nodes);
                log::debug!("node list updated: {} entries", nodes.len());
                Ok(())
            }
        };

        if let Err(e) = &result {
            log::debug!("apply rejected: {e}");
        }
        ApplyOutcome::from_result(result)
    }

    /// Point-in-time clone of the catalog for a snapshot.
    pub fn snapshot(&self) -> CatalogSnapshot {
        self.catalog.snapshot()
    }

    /// Replace the catalog with one decoded from a snapshot.
    pub fn restore(&self, snapshot: CatalogSnapshot) {
        self.catalog.restore(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xuandb_commons::{Database, Duration, NodeInfo, Privilege, User};

    fn fsm() -> MetaFsm {
        MetaFsm::new(Arc::new(Catalog::new()), Arc::new(NodeTable::new()))
    }

    fn create_user(name: &str) -> MetaCommand {
        MetaCommand::CreateUser {
            user: User::new(name, "pw"),
        }
    }

    #[test]
    fn test_create_user_revalidates() {
        let fsm = fsm();
        assert_eq!(fsm.apply(&create_user("root")), ApplyOutcome::Ok);

        // a racing duplicate is rejected at apply time
        match fsm.apply(&create_user("ROOT")) {
            ApplyOutcome::Error { code, .. } => assert_eq!(code, 409),
            ApplyOutcome::Ok => panic!("duplicate accepted"),
        }
    }

    #[test]
    fn test_first_user_rule_through_apply() {
        let fsm = fsm();
        let mut user = User::new("root", "pw");
        user.privilege = Privilege::READ;
        fsm.apply(&MetaCommand::CreateUser { user });

        let snapshot = fsm.snapshot();
        let root = &snapshot.users["root"];
        assert!(root.system);
        assert_eq!(root.privilege, Privilege::ADMIN);
    }

    #[test]
    fn test_drop_is_unconditional_set_password_is_not() {
        let fsm = fsm();
        assert_eq!(
            fsm.apply(&MetaCommand::DropUser {
                name: "ghost".to_string()
            }),
            ApplyOutcome::Ok
        );
        match fsm.apply(&MetaCommand::SetPassword {
            name: "ghost".to_string(),
            password: "x".to_string(),
        }) {
            ApplyOutcome::Error { code, .. } => assert_eq!(code, 404),
            ApplyOutcome::Ok => panic!("set-password on missing user accepted"),
        }
    }

    #[test]
    fn test_update_node_list_reaches_table() {
        let catalog = Arc::new(Catalog::new());
        let nodes = Arc::new(NodeTable::new());
        let fsm = MetaFsm::new(catalog, nodes.clone());

        fsm.apply(&MetaCommand::UpdateNodeList {
            nodes: vec![NodeInfo::placeholder(1), NodeInfo::placeholder(2)],
        });
        assert_eq!(nodes.all_sorted().len(), 2);

        fsm.apply(&MetaCommand::UpdateNodeList {
            nodes: vec![NodeInfo::placeholder(2)],
        });
        assert_eq!(nodes.all_sorted().len(), 1);
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let fsm = fsm();
        fsm.apply(&create_user("root"));
        fsm.apply(&MetaCommand::CreateDatabase {
            database: Database::new("metrics", Duration::from_hours(24)),
        });

        let snapshot = fsm.snapshot();
        let restored = self::fsm();
        restored.restore(snapshot.clone());
        assert_eq!(restored.snapshot(), snapshot);
    }
}
