//! Node heartbeats and status gossip.
//!
//! Every node stamps itself once per second. Followers send their
//! `NodeInfo` to the leader; the leader consolidates the table and, every
//! fifth tick, replicates it to everyone through an `update-node-list`
//! log entry. Statuses are derived from heartbeat age, so the table never
//! needs to be persisted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use xuandb_commons::NodeInfo;

use crate::service::MetaService;

/// The runtime node table, guarded by its own mutex.
#[derive(Default)]
pub struct NodeTable {
    inner: Mutex<HashMap<u64, NodeInfo>>,
}

impl NodeTable {
    pub fn new() -> NodeTable {
        NodeTable::default()
    }

    /// Install or refresh the local node's own entry.
    pub fn update_self(&self, info: &NodeInfo) {
        let mut table = self.inner.lock();
        match table.get_mut(&info.id) {
            Some(entry) => entry.last_heartbeat_time = info.last_heartbeat_time,
            None => {
                table.insert(info.id, info.clone());
            }
        }
    }

    /// Record a received heartbeat. Only entries that already exist are
    /// updated; the leader-side gossip is the sole creator of entries.
    /// Returns whether the node was known.
    pub fn record_heartbeat(&self, info: &NodeInfo) -> bool {
        let mut table = self.inner.lock();
        match table.get_mut(&info.id) {
            Some(entry) => {
                *entry = info.clone();
                true
            }
            None => false,
        }
    }

    /// Merge a replicated node list: entries absent from the list are
    /// dropped, and an incoming record only replaces a local one when its
    /// heartbeat is strictly newer, so out-of-order deliveries cannot
    /// regress a node's timestamp.
    pub fn apply_node_list(&self, nodes: &[NodeInfo]) {
        let keep: HashSet<u64> = nodes.iter().map(|n| n.id).collect();
        let mut table = self.inner.lock();

        table.retain(|id, _| keep.contains(id));

        for incoming in nodes {
            match table.get(&incoming.id) {
                Some(current)
                    if current.last_heartbeat_time >= incoming.last_heartbeat_time => {}
                _ => {
                    table.insert(incoming.id, incoming.clone());
                }
            }
        }
    }

    pub fn get(&self, id: u64) -> Option<NodeInfo> {
        self.inner.lock().get(&id).cloned()
    }

    /// The HTTP address of a node, if known and non-empty.
    pub fn http_addr(&self, id: u64) -> Option<String> {
        self.inner
            .lock()
            .get(&id)
            .map(|n| n.addr.clone())
            .filter(|a| !a.is_empty())
    }

    /// All entries, sorted by node id.
    pub fn all_sorted(&self) -> Vec<NodeInfo> {
        let mut result: Vec<_> = self.inner.lock().values().cloned().collect();
        result.sort_by_key(|n| n.id);
        result
    }

    /// The current table for the given server set, with blank placeholders
    /// for servers that have not been observed yet.
    pub fn snapshot_for(&self, ids: &[u64]) -> Vec<NodeInfo> {
        let table = self.inner.lock();
        ids.iter()
            .map(|id| {
                table
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| NodeInfo::placeholder(*id))
            })
            .collect()
    }
}

/// Spawn the per-second heartbeat task for a service.
pub(crate) fn spawn(svc: Arc<MetaService>, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick of `interval` fires immediately; swallow it so the
        // loop runs on whole-second boundaries
        ticker.tick().await;

        let mut info = svc.self_node_info();

        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                _ = stop.changed() => return,
                _ = ticker.tick() => {}
            }

            info.last_heartbeat_time = Utc::now();
            svc.nodes().update_self(&info);

            if !svc.is_leader() {
                svc.send_heartbeat_to_leader(&info).await;
            } else if ticks % 5 == 0 {
                svc.broadcast_node_list().await;
            }
            ticks += 1;
        }
    })
}
