//! The meta service.
//!
//! Owns the Raft instance, the catalog, the node table, and the
//! background tasks. Unless persisted state already exists, membership
//! negotiation tries to join through each configured voter, falls back
//! to bootstrapping (voters only), and otherwise waits for a leader to
//! admit this node, retrying the join in the background.
//!
//! Every write operation works from any node: the leader applies it to
//! the Raft log directly, a follower forwards it to the leader's HTTP
//! API.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use openraft::error::{ClientWriteError, RaftError as RaftApiError};
use openraft::storage::Adaptor;
use openraft::{ChangeMembers, Config as RaftConfig, Raft};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use xuandb_commons::config::{Config, NodeConfig, RaftSnapshotStore, RaftStore};
use xuandb_commons::{
    Database, NodeInfo, NodeRole, NodeState, NodeStatus, RequiredPrivileges, User,
};

use crate::catalog::Catalog;
use crate::client::PeerClient;
use crate::command::MetaCommand;
use crate::error::{MetaError, Result};
use crate::fsm::MetaFsm;
use crate::heartbeat::{self, NodeTable};
use crate::network::HttpNetworkFactory;
use crate::storage::{MetaNode, MetaRaftStore, MetaTypeConfig, SnapshotPersistence, StorageAdaptor};

/// Request to add a node to the cluster, also sent by joining nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub cluster_name: String,
    pub id: u64,
    /// Raft RPC address of the node being added.
    pub addr: String,
    pub voter: bool,
}

/// The meta service instance owned by the process.
pub struct MetaService {
    node_id: u64,
    voter: bool,
    cluster_name: String,
    node_cfg: NodeConfig,
    config: Config,

    raft: Raft<MetaTypeConfig>,
    catalog: Arc<Catalog>,
    nodes: Arc<NodeTable>,
    client: PeerClient,

    /// Whether this node started without persisted raft state and still
    /// has to negotiate its way into the cluster.
    needs_membership: bool,

    stop: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MetaService {
    /// Start the meta service for `node_id` as configured in `config`.
    pub async fn start(config: Config, node_id: u64) -> Result<Arc<MetaService>> {
        let node_cfg = config.node(node_id).cloned().ok_or_else(|| {
            MetaError::InvalidArgument(format!("node {node_id} is not in the configuration"))
        })?;

        let catalog = Arc::new(Catalog::new());
        let nodes = Arc::new(NodeTable::new());
        let fsm = MetaFsm::new(catalog.clone(), nodes.clone());

        let snapshots = match node_cfg.meta.raft_snapshot_store {
            RaftSnapshotStore::Discard => SnapshotPersistence::Discard,
            RaftSnapshotStore::Memory => SnapshotPersistence::Memory,
            RaftSnapshotStore::File => {
                let dir = node_cfg.meta.data_dir.clone().ok_or_else(|| {
                    MetaError::InvalidArgument("'data-dir' is required for the file snapshot store".into())
                })?;
                SnapshotPersistence::File(dir.join("snapshots"))
            }
        };
        let store = match node_cfg.meta.raft_store {
            RaftStore::Memory => MetaRaftStore::new_in_memory(fsm, snapshots),
            RaftStore::Rocksdb => {
                let dir = node_cfg.meta.data_dir.clone().ok_or_else(|| {
                    MetaError::InvalidArgument("'data-dir' is required for the rocksdb store".into())
                })?;
                MetaRaftStore::open_rocksdb(fsm, &dir, snapshots)?
            }
        };
        let has_state = store.has_existing_state();

        let raft_config = RaftConfig {
            cluster_name: config.cluster_name.clone(),
            heartbeat_interval: 500,
            election_timeout_min: 1500,
            election_timeout_max: 3000,
            install_snapshot_timeout: 10_000,
            ..Default::default()
        };
        let raft_config = Arc::new(
            raft_config
                .validate()
                .map_err(|e| MetaError::InvalidArgument(e.to_string()))?,
        );

        let (log_store, state_machine): (StorageAdaptor, StorageAdaptor) =
            Adaptor::new(store.clone());
        let raft = Raft::new(
            node_id,
            raft_config,
            HttpNetworkFactory::new(),
            log_store,
            state_machine,
        )
        .await
        .map_err(|e| MetaError::Raft(format!("{e:?}")))?;

        let (stop, _) = watch::channel(false);
        let client = PeerClient::new(config.cluster_name.clone());
        let svc = Arc::new(MetaService {
            node_id,
            voter: node_cfg.meta.raft_voter,
            cluster_name: config.cluster_name.clone(),
            node_cfg,
            config,
            raft,
            catalog,
            nodes,
            client,
            needs_membership: !has_state,
            stop,
            tasks: Mutex::new(Vec::new()),
        });

        let heartbeat = heartbeat::spawn(svc.clone(), svc.stop.subscribe());
        svc.tasks.lock().push(heartbeat);

        Ok(svc)
    }

    /// Stop the background tasks, shut Raft down, and wait for the tasks.
    pub async fn shutdown(&self) {
        let _ = self.stop.send(true);

        if let Err(e) = self.raft.shutdown().await {
            log::error!("failed to shutdown raft: {e:?}");
        }

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        log::info!("meta service stopped");
    }

    // --- accessors ---

    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    pub fn is_voter(&self) -> bool {
        self.voter
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn raft(&self) -> &Raft<MetaTypeConfig> {
        &self.raft
    }

    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    /// Whether the local node is currently the Raft leader.
    pub fn is_leader(&self) -> bool {
        let metrics = self.raft.metrics().borrow().clone();
        metrics.current_leader == Some(metrics.id)
    }

    /// The current leader's node id, if known.
    pub fn leader_id(&self) -> Option<u64> {
        self.raft.metrics().borrow().current_leader
    }

    /// The current leader's HTTP address, resolved through the node table.
    pub fn leader_http_addr(&self) -> Option<String> {
        self.leader_id().and_then(|id| self.nodes.http_addr(id))
    }

    // --- membership ---

    /// Negotiate this node's way into the cluster in the background.
    ///
    /// Must be called once the Raft RPC listener is accepting requests,
    /// since a remote leader starts replicating to this node while the
    /// join call is still in flight. Nodes with persisted state skip the
    /// negotiation; Raft recovers and rejoins its peers on its own.
    pub fn begin_membership(self: &Arc<Self>) {
        if !self.needs_membership {
            log::info!("existing raft state found, skipping join/bootstrap");
            return;
        }

        let svc = self.clone();
        let mut stop = self.stop.subscribe();

        let handle = tokio::spawn(async move {
            if svc.try_join().await {
                return;
            }

            // Non-voters never bootstrap; they wait to be added by the
            // leader.
            if svc.voter {
                log::info!("cannot join an existing cluster, trying to bootstrap");
                let members: BTreeMap<u64, MetaNode> = svc
                    .config
                    .nodes
                    .iter()
                    .filter(|nc| nc.meta.raft_voter)
                    .map(|nc| {
                        (
                            nc.id,
                            MetaNode::new(nc.advertised_raft_addr(), nc.advertised_http_addr()),
                        )
                    })
                    .collect();

                // Several voters may race to bootstrap with the same
                // member set; at most one election wins and the rest
                // follow.
                match svc.raft.initialize(members).await {
                    Ok(()) => {
                        log::info!("meta service bootstrapped");
                        return;
                    }
                    Err(e) => log::error!("failed to bootstrap cluster: {e}"),
                }
            } else {
                log::info!("failed to join an existing cluster, waiting for the leader");
            }

            // keep retrying the join until a leader admits this node
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = stop.changed() => return,
                    _ = ticker.tick() => {}
                }
                if svc.try_join().await {
                    return;
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    /// Try to join through each configured voter; true on success.
    async fn try_join(&self) -> bool {
        for nc in &self.config.nodes {
            if nc.id == self.node_id || !nc.meta.raft_voter {
                continue;
            }
            let addr = nc.advertised_http_addr();
            match self.join(&addr).await {
                Ok(()) => {
                    log::info!("join cluster succeeded via {addr}");
                    return true;
                }
                Err(e) => {
                    log::debug!("failed to join via {addr}: {e}");
                }
            }
        }
        false
    }

    /// Ask the cluster behind `peer_http_addr` to add this node.
    async fn join(&self, peer_http_addr: &str) -> Result<()> {
        let req = JoinRequest {
            cluster_name: self.cluster_name.clone(),
            id: self.node_id,
            addr: self.node_cfg.advertised_raft_addr(),
            voter: self.voter,
        };
        self.client.post(peer_http_addr, "/meta/nodes", &req).await
    }

    /// Add a node to the cluster, forwarding to the leader when needed.
    pub async fn add_node(&self, id: u64, raft_addr: String, voter: bool) -> Result<()> {
        if self.is_leader() {
            return self.leader_add_node(id, raft_addr, voter).await;
        }
        let req = JoinRequest {
            cluster_name: self.cluster_name.clone(),
            id,
            addr: raft_addr,
            voter,
        };
        self.forward_post("/meta/nodes", &req).await
    }

    pub(crate) async fn leader_add_node(
        &self,
        id: u64,
        raft_addr: String,
        voter: bool,
    ) -> Result<()> {
        let metrics = self.raft.metrics().borrow().clone();
        let voters: BTreeSet<u64> = metrics.membership_config.membership().voter_ids().collect();
        if voters.contains(&id) {
            log::debug!("node {id} is already a voter");
            return Ok(());
        }

        let node = MetaNode::new(raft_addr, String::new());
        self.raft
            .add_learner(id, node, true)
            .await
            .map_err(write_error)?;

        if voter {
            let mut new_voters = voters;
            new_voters.insert(id);
            self.raft
                .change_membership(new_voters, false)
                .await
                .map_err(write_error)?;
        }

        log::info!("node added: {id}");
        Ok(())
    }

    /// Remove a node from the cluster, forwarding to the leader when needed.
    pub async fn drop_node(&self, id: u64) -> Result<()> {
        if self.is_leader() {
            return self.leader_drop_node(id).await;
        }
        self.forward_delete("/meta/nodes", &[("id", &id.to_string())])
            .await
    }

    pub(crate) async fn leader_drop_node(&self, id: u64) -> Result<()> {
        let metrics = self.raft.metrics().borrow().clone();
        let voters: BTreeSet<u64> = metrics.membership_config.membership().voter_ids().collect();

        if voters.contains(&id) {
            let mut remaining = voters;
            remaining.remove(&id);
            self.raft
                .change_membership(remaining, false)
                .await
                .map_err(write_error)?;
        } else {
            self.raft
                .change_membership(ChangeMembers::RemoveNodes(BTreeSet::from([id])), false)
                .await
                .map_err(write_error)?;
        }

        log::info!("node dropped: {id}");
        Ok(())
    }

    // --- raft plumbing ---

    /// Append a command to the Raft log and wait for it to be applied.
    pub(crate) async fn raft_apply(&self, cmd: MetaCommand) -> Result<()> {
        let resp = self.raft.client_write(cmd).await.map_err(write_error)?;
        resp.data.into_result()
    }

    async fn forward_post<T: Serialize>(&self, path: &str, body: &T) -> Result<()> {
        let addr = self.leader_http_addr().ok_or(MetaError::NoMetaService)?;
        self.client.post(&addr, path, body).await
    }

    async fn forward_put<T: Serialize>(&self, path: &str, body: &T) -> Result<()> {
        let addr = self.leader_http_addr().ok_or(MetaError::NoMetaService)?;
        self.client.put(&addr, path, body).await
    }

    async fn forward_delete(&self, path: &str, query: &[(&str, &str)]) -> Result<()> {
        let addr = self.leader_http_addr().ok_or(MetaError::NoMetaService)?;
        self.client.delete(&addr, path, query).await
    }

    // --- users ---

    /// Create a user. Callers cannot mint system users; the flag is only
    /// ever set by the first-user rule inside the state machine.
    pub async fn create_user(&self, mut user: User) -> Result<()> {
        user.system = false;
        if self.is_leader() {
            self.leader_create_user(user).await
        } else {
            self.forward_post("/meta/users", &user).await
        }
    }

    pub(crate) async fn leader_create_user(&self, mut user: User) -> Result<()> {
        if self.catalog.user(&user.name).is_some() {
            log::debug!("user already exists: {}", user.name);
            return Err(MetaError::UserExists);
        }

        user.created_at = Utc::now();
        self.raft_apply(MetaCommand::CreateUser { user }).await
    }

    /// Drop a user; dropping a missing user succeeds.
    pub async fn drop_user(&self, name: &str) -> Result<()> {
        if self.is_leader() {
            self.leader_drop_user(name).await
        } else {
            self.forward_delete("/meta/users", &[("name", name)]).await
        }
    }

    pub(crate) async fn leader_drop_user(&self, name: &str) -> Result<()> {
        match self.catalog.user(name) {
            None => {
                log::debug!("user does not exist: {name}");
                return Ok(());
            }
            Some(user) if user.system => {
                log::debug!("cannot drop system user: {name}");
                return Err(MetaError::SystemUser);
            }
            Some(_) => {}
        }

        self.raft_apply(MetaCommand::DropUser {
            name: name.to_string(),
        })
        .await
    }

    /// Change a user's password.
    pub async fn set_password(&self, name: &str, password: &str) -> Result<()> {
        if self.is_leader() {
            self.leader_set_password(name, password).await
        } else {
            self.forward_put("/meta/users", &User::new(name, password))
                .await
        }
    }

    pub(crate) async fn leader_set_password(&self, name: &str, password: &str) -> Result<()> {
        if self.catalog.user(name).is_none() {
            log::debug!("user does not exist: {name}");
            return Err(MetaError::UserNotExists);
        }

        self.raft_apply(MetaCommand::SetPassword {
            name: name.to_string(),
            password: password.to_string(),
        })
        .await
    }

    /// All users, sorted by name.
    pub fn users(&self) -> Vec<Arc<User>> {
        self.catalog.users()
    }

    /// A user by name, or `None` if it does not exist.
    pub fn user_by_name(&self, name: &str) -> Option<Arc<User>> {
        self.catalog.user(name)
    }

    // --- databases ---

    pub async fn create_database(&self, database: Database) -> Result<()> {
        if self.is_leader() {
            self.leader_create_database(database).await
        } else {
            self.forward_post("/meta/databases", &database).await
        }
    }

    pub(crate) async fn leader_create_database(&self, database: Database) -> Result<()> {
        if self.catalog.database(&database.name).is_some() {
            log::debug!("database already exists: {}", database.name);
            return Err(MetaError::DatabaseExists);
        }

        self.raft_apply(MetaCommand::CreateDatabase { database }).await
    }

    pub async fn drop_database(&self, name: &str) -> Result<()> {
        if self.is_leader() {
            self.leader_drop_database(name).await
        } else {
            self.forward_delete("/meta/databases", &[("name", name)])
                .await
        }
    }

    pub(crate) async fn leader_drop_database(&self, name: &str) -> Result<()> {
        if self.catalog.database(name).is_none() {
            log::debug!("database does not exist: {name}");
            return Err(MetaError::DatabaseNotExists);
        }

        self.raft_apply(MetaCommand::DropDatabase {
            name: name.to_string(),
        })
        .await
    }

    /// All databases, sorted by name.
    pub fn databases(&self) -> Vec<Arc<Database>> {
        self.catalog.databases()
    }

    /// A database by name, or `None` if it does not exist.
    pub fn database_by_name(&self, name: &str) -> Option<Arc<Database>> {
        self.catalog.database(name)
    }

    // --- node status ---

    /// The status of every known node, sorted by id.
    pub fn node_statuses(&self) -> Vec<NodeStatus> {
        let leader = self.leader_id();
        let now = Utc::now();

        self.nodes
            .all_sorted()
            .into_iter()
            .map(|info| {
                let state = NodeState::of_heartbeat_age(now - info.last_heartbeat_time);
                NodeStatus {
                    leader: leader == Some(info.id),
                    state,
                    info,
                }
            })
            .collect()
    }

    pub(crate) fn self_node_info(&self) -> NodeInfo {
        let mut role = NodeRole::NONE;
        if self.node_cfg.meta.raft_voter {
            role |= NodeRole::META;
        }
        if self.node_cfg.data.is_some() {
            role |= NodeRole::DATA;
        }
        if self.node_cfg.query.is_some() {
            role |= NodeRole::QUERY;
        }

        NodeInfo {
            id: self.node_id,
            addr: self.node_cfg.advertised_http_addr(),
            role,
            last_heartbeat_time: Utc::now(),
        }
    }

    pub(crate) async fn send_heartbeat_to_leader(&self, info: &NodeInfo) {
        let Some(addr) = self.leader_http_addr() else {
            log::debug!("leader unknown, skipping heartbeat");
            return;
        };

        match self.client.post(&addr, "/meta/node/heartbeat", info).await {
            Ok(()) => log::debug!("heartbeat sent to leader"),
            Err(e) => log::error!("failed to send heartbeat to leader: {e}"),
        }
    }

    /// Replicate the node list derived from the Raft configuration, with
    /// blank placeholders for servers not seen yet.
    pub(crate) async fn broadcast_node_list(&self) {
        let metrics = self.raft.metrics().borrow().clone();
        let ids: Vec<u64> = metrics
            .membership_config
            .membership()
            .nodes()
            .map(|(id, _)| *id)
            .collect();

        let nodes = self.nodes.snapshot_for(&ids);
        match self.raft_apply(MetaCommand::UpdateNodeList { nodes }).await {
            Ok(()) => log::debug!("node list replicated"),
            Err(e) => log::error!("failed to replicate node list: {e}"),
        }
    }

    // --- auth ---

    /// Authenticate and check the required privileges.
    pub fn auth(&self, name: &str, password: &str, required: &RequiredPrivileges) -> Result<()> {
        crate::auth::authenticate(&self.catalog, name, password, required)
    }
}

/// Translate a raft write error, preserving the leader hint.
fn write_error(e: RaftApiError<u64, ClientWriteError<u64, MetaNode>>) -> MetaError {
    match e {
        RaftApiError::APIError(ClientWriteError::ForwardToLeader(f)) => MetaError::NotLeader {
            leader: f.leader_id,
        },
        other => MetaError::Raft(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_request_json_shape() {
        let req = JoinRequest {
            cluster_name: "xuan".to_string(),
            id: 4,
            addr: "10.0.0.4:9004".to_string(),
            voter: false,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["clusterName"], "xuan");
        assert_eq!(v["id"], 4);
        assert_eq!(v["addr"], "10.0.0.4:9004");
        assert_eq!(v["voter"], false);
    }
}
