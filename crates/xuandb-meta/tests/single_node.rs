//! End-to-end exercise of the meta service on a single-voter cluster.
//!
//! Uses in-memory stores and no HTTP listeners: with one voter there is
//! nothing to join or forward to, so the full write path (leader check,
//! raft apply, state machine) runs in-process.

use std::sync::Arc;
use std::time::Duration;

use xuandb_commons::config::{
    Config, LogConfig, MetaConfig, NodeConfig, RaftSnapshotStore, RaftStore,
};
use xuandb_commons::{Database, Privilege, RequiredPrivileges, User};
use xuandb_meta::{MetaError, MetaService};

fn single_node_config() -> Config {
    Config {
        cluster_name: "xuan-test".to_string(),
        nodes: vec![NodeConfig {
            id: 1,
            http_addr: "127.0.0.1:18001".to_string(),
            domain_name: None,
            meta: MetaConfig {
                raft_voter: true,
                raft_addr: "127.0.0.1:19001".to_string(),
                raft_store: RaftStore::Memory,
                raft_snapshot_store: RaftSnapshotStore::Memory,
                data_dir: None,
            },
            data: None,
            query: None,
        }],
        log: LogConfig::default(),
    }
}

/// Start the service and wait for it to elect itself.
async fn start_leader() -> Arc<MetaService> {
    let svc = MetaService::start(single_node_config(), 1).await.unwrap();
    svc.begin_membership();

    for _ in 0..150 {
        if svc.is_leader() {
            return svc;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("single-node cluster failed to elect a leader");
}

#[tokio::test]
async fn test_catalog_write_path() {
    let svc = start_leader().await;

    // the first user becomes the system administrator, whatever the
    // request asked for
    let mut root = User::new("root", "pw");
    root.privilege = Privilege::READ;
    svc.create_user(root).await.unwrap();

    let users = svc.users();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, "root");
    assert!(users[0].system);
    assert_eq!(users[0].privilege, Privilege::ADMIN);

    // duplicate names conflict case-insensitively
    assert_eq!(
        svc.create_user(User::new("ROOT", "x")).await.unwrap_err(),
        MetaError::UserExists
    );

    // authentication round-trip against the replicated catalog
    assert_eq!(
        svc.auth("root", "pw", &RequiredPrivileges::default()),
        Ok(())
    );
    assert_eq!(
        svc.auth("root", "wrong", &RequiredPrivileges::default()),
        Err(MetaError::PasswordMismatch)
    );

    // system users cannot be dropped
    let err = svc.drop_user("root").await.unwrap_err();
    assert_eq!(err, MetaError::SystemUser);
    assert_eq!(err.status_code(), 403);

    // ordinary users can; dropping a missing user succeeds
    svc.create_user(User::new("bob", "x")).await.unwrap();
    svc.drop_user("bob").await.unwrap();
    svc.drop_user("bob").await.unwrap();
    assert!(svc.user_by_name("bob").is_none());

    // password changes are replicated and visible to auth
    svc.create_user(User::new("carol", "old")).await.unwrap();
    svc.set_password("carol", "new").await.unwrap();
    assert_eq!(
        svc.auth("carol", "new", &RequiredPrivileges::default()),
        Ok(())
    );
    assert_eq!(
        svc.set_password("ghost", "x").await.unwrap_err(),
        MetaError::UserNotExists
    );

    svc.shutdown().await;
}

#[tokio::test]
async fn test_database_lifecycle() {
    let svc = start_leader().await;

    svc.create_database(Database::new("metrics", "7d".parse().unwrap()))
        .await
        .unwrap();

    let dbs = svc.databases();
    assert_eq!(dbs.len(), 1);
    assert_eq!(dbs[0].name, "metrics");
    assert_eq!(dbs[0].duration, "7d".parse().unwrap());

    let err = svc
        .create_database(Database::new("METRICS", "1h".parse().unwrap()))
        .await
        .unwrap_err();
    assert_eq!(err, MetaError::DatabaseExists);
    assert_eq!(err.status_code(), 409);

    svc.drop_database("Metrics").await.unwrap();
    assert_eq!(
        svc.drop_database("metrics").await.unwrap_err(),
        MetaError::DatabaseNotExists
    );

    svc.shutdown().await;
}

#[tokio::test]
async fn test_node_status_converges() {
    let svc = start_leader().await;

    // the heartbeat task stamps this node and the leader broadcasts the
    // node list through the log
    let mut statuses = Vec::new();
    for _ in 0..100 {
        statuses = svc.node_statuses();
        if !statuses.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].info.id, 1);
    assert!(statuses[0].leader);

    svc.shutdown().await;
}
