//! Raft type configuration and combined storage.
//!
//! Implements the combined `RaftStorage` trait (v1 API), which covers log
//! access, vote persistence, state machine application, and snapshots.
//! This avoids the sealed `RaftStateMachine` and `RaftLogStorage` v2
//! traits; the `Adaptor` splits it into the two halves `Raft::new` wants.
//!
//! The log always lives in an in-memory `BTreeMap`; with the RocksDB
//! backend every mutation is mirrored to disk and reloaded on startup, so
//! a restarted voter recovers its vote and log. Snapshots can be
//! discarded, kept in memory, or persisted under `<data-dir>/snapshots/`.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io::Cursor;
use std::ops::RangeBounds;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use openraft::storage::{Adaptor, LogState, RaftLogReader, RaftStorage, Snapshot};
use openraft::{
    Entry, EntryPayload, LogId, OptionalSend, RaftSnapshotBuilder, RaftTypeConfig, SnapshotMeta,
    StorageError, StorageIOError, StoredMembership, Vote,
};
use parking_lot::RwLock;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogSnapshot;
use crate::command::{ApplyOutcome, MetaCommand};
use crate::error::MetaError;
use crate::fsm::MetaFsm;

/// Type configuration for the meta service Raft group.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct MetaTypeConfig;

impl RaftTypeConfig for MetaTypeConfig {
    type D = MetaCommand;
    type R = ApplyOutcome;
    type NodeId = u64;
    type Node = MetaNode;
    type Entry = Entry<Self>;
    type SnapshotData = Cursor<Vec<u8>>;
    type AsyncRuntime = openraft::TokioRuntime;
    type Responder = openraft::impls::OneshotResponder<Self>;
}

/// Adaptor splitting the combined store into the two halves `Raft::new`
/// expects.
pub type StorageAdaptor = Adaptor<MetaTypeConfig, Arc<MetaRaftStore>>;

/// Node addresses carried in the Raft membership configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MetaNode {
    /// Address of the Raft RPC server.
    pub raft_addr: String,
    /// HTTP address; may be empty for nodes admitted via join, whose
    /// address is learned through heartbeats instead.
    pub api_addr: String,
}

impl MetaNode {
    pub fn new(raft_addr: impl Into<String>, api_addr: impl Into<String>) -> MetaNode {
        MetaNode {
            raft_addr: raft_addr.into(),
            api_addr: api_addr.into(),
        }
    }
}

impl std::fmt::Display for MetaNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.raft_addr, self.api_addr)
    }
}

impl std::error::Error for MetaNode {}

/// A log entry as stored: the payload is kept serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogEntryData {
    log_id: LogId<u64>,
    payload: Vec<u8>,
}

/// What a snapshot serializes: applied position, membership, and the
/// catalog (itself serialized, so the outer shape is stable).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StateMachineData {
    last_applied_log: Option<LogId<u64>>,
    last_membership: StoredMembership<u64, MetaNode>,
    state: Vec<u8>,
}

/// A built snapshot held by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSnapshot {
    pub meta: SnapshotMeta<u64, MetaNode>,
    pub data: Vec<u8>,
}

/// Where built snapshots go.
pub enum SnapshotPersistence {
    /// Never persisted; non-voters run with this.
    Discard,
    /// Kept only in process memory.
    Memory,
    /// Persisted under the given directory, retaining the latest one.
    File(PathBuf),
}

impl SnapshotPersistence {
    fn save(&self, snapshot: &StoredSnapshot) -> std::io::Result<()> {
        let dir = match self {
            SnapshotPersistence::Discard | SnapshotPersistence::Memory => return Ok(()),
            SnapshotPersistence::File(dir) => dir,
        };

        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.snap", snapshot.meta.snapshot_id));
        let data = serde_json::to_vec(snapshot).map_err(std::io::Error::other)?;
        std::fs::write(&path, data)?;

        // retain only the snapshot just written
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.path() != path
                && entry.path().extension().is_some_and(|e| e == "snap")
            {
                let _ = std::fs::remove_file(entry.path());
            }
        }
        Ok(())
    }

    fn load_latest(&self) -> Option<StoredSnapshot> {
        let dir = match self {
            SnapshotPersistence::Discard | SnapshotPersistence::Memory => return None,
            SnapshotPersistence::File(dir) => dir,
        };

        let mut latest: Option<StoredSnapshot> = None;
        for entry in std::fs::read_dir(dir).ok()? {
            let path = match entry {
                Ok(e) => e.path(),
                Err(_) => continue,
            };
            if !path.extension().is_some_and(|e| e == "snap") {
                continue;
            }
            let snapshot: StoredSnapshot = match std::fs::read(&path)
                .ok()
                .and_then(|data| serde_json::from_slice(&data).ok())
            {
                Some(s) => s,
                None => {
                    log::warn!("ignoring unreadable snapshot file {}", path.display());
                    continue;
                }
            };
            let newer = match &latest {
                Some(cur) => cur.meta.last_log_id < snapshot.meta.last_log_id,
                None => true,
            };
            if newer {
                latest = Some(snapshot);
            }
        }
        latest
    }
}

const CF_LOG: &str = "log";
const CF_META: &str = "meta";
const KEY_VOTE: &[u8] = b"vote";
const KEY_COMMITTED: &[u8] = b"committed";
const KEY_PURGED: &[u8] = b"purged";

enum LogBackend {
    Memory,
    RocksDb(DB),
}

impl LogBackend {
    fn put(&self, cf: &str, key: &[u8], value: &[u8]) -> Result<(), rocksdb::Error> {
        if let LogBackend::RocksDb(db) = self {
            let handle = db.cf_handle(cf).expect("column family exists");
            db.put_cf(handle, key, value)?;
        }
        Ok(())
    }

    fn delete(&self, cf: &str, key: &[u8]) -> Result<(), rocksdb::Error> {
        if let LogBackend::RocksDb(db) = self {
            let handle = db.cf_handle(cf).expect("column family exists");
            db.delete_cf(handle, key)?;
        }
        Ok(())
    }
}

/// Combined Raft storage for the meta service.
pub struct MetaRaftStore {
    fsm: MetaFsm,

    /// In-memory log entries (index -> entry).
    log: RwLock<BTreeMap<u64, LogEntryData>>,

    vote: RwLock<Option<Vote<u64>>>,
    committed: RwLock<Option<LogId<u64>>>,
    last_purged: RwLock<Option<LogId<u64>>>,

    last_applied: RwLock<Option<LogId<u64>>>,
    last_membership: RwLock<StoredMembership<u64, MetaNode>>,

    snapshot_idx: AtomicU64,
    current_snapshot: RwLock<Option<StoredSnapshot>>,
    snapshots: SnapshotPersistence,

    backend: LogBackend,
}

impl Debug for MetaRaftStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaRaftStore")
            .field("snapshot_idx", &self.snapshot_idx)
            .finish_non_exhaustive()
    }
}

impl MetaRaftStore {
    /// A store with no durable backing.
    pub fn new_in_memory(fsm: MetaFsm, snapshots: SnapshotPersistence) -> Arc<MetaRaftStore> {
        let store = MetaRaftStore {
            fsm,
            log: RwLock::new(BTreeMap::new()),
            vote: RwLock::new(None),
            committed: RwLock::new(None),
            last_purged: RwLock::new(None),
            last_applied: RwLock::new(None),
            last_membership: RwLock::new(StoredMembership::default()),
            snapshot_idx: AtomicU64::new(0),
            current_snapshot: RwLock::new(None),
            snapshots,
            backend: LogBackend::Memory,
        };
        store.load_snapshot_on_startup();
        Arc::new(store)
    }

    /// A store persisted in RocksDB under `<data-dir>/raft`.
    pub fn open_rocksdb(
        fsm: MetaFsm,
        data_dir: &Path,
        snapshots: SnapshotPersistence,
    ) -> Result<Arc<MetaRaftStore>, MetaError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_LOG, Options::default()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&opts, data_dir.join("raft"), cfs)
            .map_err(|e| MetaError::Storage(e.to_string()))?;

        let mut log = BTreeMap::new();
        {
            let handle = db.cf_handle(CF_LOG).expect("column family exists");
            for item in db.iterator_cf(handle, IteratorMode::Start) {
                let (_, value) = item.map_err(|e| MetaError::Storage(e.to_string()))?;
                let entry: LogEntryData = serde_json::from_slice(&value)?;
                log.insert(entry.log_id.index, entry);
            }
        }

        let read_meta = |key: &[u8]| -> Result<Option<Vec<u8>>, MetaError> {
            let handle = db.cf_handle(CF_META).expect("column family exists");
            db.get_cf(handle, key)
                .map_err(|e| MetaError::Storage(e.to_string()))
        };
        let vote: Option<Vote<u64>> = match read_meta(KEY_VOTE)? {
            Some(data) => Some(serde_json::from_slice(&data)?),
            None => None,
        };
        let committed: Option<LogId<u64>> = match read_meta(KEY_COMMITTED)? {
            Some(data) => Some(serde_json::from_slice(&data)?),
            None => None,
        };
        let purged: Option<LogId<u64>> = match read_meta(KEY_PURGED)? {
            Some(data) => Some(serde_json::from_slice(&data)?),
            None => None,
        };

        let store = MetaRaftStore {
            fsm,
            log: RwLock::new(log),
            vote: RwLock::new(vote),
            committed: RwLock::new(committed),
            last_purged: RwLock::new(purged),
            last_applied: RwLock::new(None),
            last_membership: RwLock::new(StoredMembership::default()),
            snapshot_idx: AtomicU64::new(0),
            current_snapshot: RwLock::new(None),
            snapshots,
            backend: LogBackend::RocksDb(db),
        };
        store.load_snapshot_on_startup();
        Ok(Arc::new(store))
    }

    /// Restore the state machine from the newest persisted snapshot, if
    /// any. Raft replays log entries after the snapshot point.
    fn load_snapshot_on_startup(&self) {
        let Some(stored) = self.snapshots.load_latest() else {
            return;
        };
        let sm_data: StateMachineData = match serde_json::from_slice(&stored.data) {
            Ok(data) => data,
            Err(e) => {
                log::error!("failed to decode persisted snapshot: {e}");
                return;
            }
        };
        let catalog: CatalogSnapshot = match serde_json::from_slice(&sm_data.state) {
            Ok(c) => c,
            Err(e) => {
                log::error!("failed to decode snapshot catalog: {e}");
                return;
            }
        };

        self.fsm.restore(catalog);
        *self.last_applied.write() = sm_data.last_applied_log;
        *self.last_membership.write() = sm_data.last_membership;
        *self.current_snapshot.write() = Some(stored);
        log::info!(
            "state machine restored from snapshot at {:?}",
            self.last_applied.read().map(|id| id.index)
        );
    }

    /// Whether any prior Raft state exists. A node with existing state
    /// skips the join/bootstrap negotiation; Raft recovers on its own.
    pub fn has_existing_state(&self) -> bool {
        self.vote.read().is_some()
            || !self.log.read().is_empty()
            || self.last_purged.read().is_some()
            || self.current_snapshot.read().is_some()
    }

    fn get_log_entries_sync(&self, range: impl RangeBounds<u64>) -> Vec<Entry<MetaTypeConfig>> {
        let log = self.log.read();
        log.range(range)
            .map(|(_, entry)| {
                match serde_json::from_slice::<EntryPayload<MetaTypeConfig>>(&entry.payload) {
                    Ok(payload) => Entry {
                        log_id: entry.log_id,
                        payload,
                    },
                    Err(e) => {
                        log::warn!("failed to decode log entry {}: {e}", entry.log_id.index);
                        Entry {
                            log_id: entry.log_id,
                            payload: EntryPayload::Blank,
                        }
                    }
                }
            })
            .collect()
    }
}

/// Log reader sharing access to the store.
#[derive(Clone)]
pub struct MetaLogReader {
    store: Arc<MetaRaftStore>,
}

impl RaftLogReader<MetaTypeConfig> for MetaLogReader {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + OptionalSend>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<MetaTypeConfig>>, StorageError<u64>> {
        Ok(self.store.get_log_entries_sync(range))
    }
}

/// Builds snapshots by cloning the catalog under its lock.
pub struct MetaSnapshotBuilder {
    store: Arc<MetaRaftStore>,
}

impl RaftSnapshotBuilder<MetaTypeConfig> for MetaSnapshotBuilder {
    async fn build_snapshot(&mut self) -> Result<Snapshot<MetaTypeConfig>, StorageError<u64>> {
        let last_applied = *self.store.last_applied.read();
        let last_membership = self.store.last_membership.read().clone();

        let state = serde_json::to_vec(&self.store.fsm.snapshot())
            .map_err(|e| StorageIOError::read_state_machine(&e))?;
        let data = StateMachineData {
            last_applied_log: last_applied,
            last_membership: last_membership.clone(),
            state,
        };
        let serialized =
            serde_json::to_vec(&data).map_err(|e| StorageIOError::read_state_machine(&e))?;

        let snapshot_idx = self.store.snapshot_idx.fetch_add(1, Ordering::Relaxed) + 1;
        let snapshot_id = match last_applied {
            Some(last) => format!("{}-{}-{}", last.leader_id, last.index, snapshot_idx),
            None => format!("--{snapshot_idx}"),
        };

        let meta = SnapshotMeta {
            last_log_id: last_applied,
            last_membership,
            snapshot_id,
        };

        let stored = StoredSnapshot {
            meta: meta.clone(),
            data: serialized.clone(),
        };
        self.store
            .snapshots
            .save(&stored)
            .map_err(|e| StorageIOError::write_snapshot(Some(meta.signature()), &e))?;
        *self.store.current_snapshot.write() = Some(stored);

        Ok(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(serialized)),
        })
    }
}

impl RaftLogReader<MetaTypeConfig> for Arc<MetaRaftStore> {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + OptionalSend>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<MetaTypeConfig>>, StorageError<u64>> {
        Ok(self.get_log_entries_sync(range))
    }
}

#[allow(deprecated)] // RaftStorage is deprecated in favor of v2 traits, but v2 is sealed
impl RaftStorage<MetaTypeConfig> for Arc<MetaRaftStore> {
    type LogReader = MetaLogReader;
    type SnapshotBuilder = MetaSnapshotBuilder;

    // --- Vote ---

    async fn save_vote(&mut self, vote: &Vote<u64>) -> Result<(), StorageError<u64>> {
        let data = serde_json::to_vec(vote).map_err(|e| StorageIOError::write_vote(&e))?;
        self.backend
            .put(CF_META, KEY_VOTE, &data)
            .map_err(|e| StorageIOError::write_vote(&e))?;
        *self.vote.write() = Some(vote.clone());
        Ok(())
    }

    async fn read_vote(&mut self) -> Result<Option<Vote<u64>>, StorageError<u64>> {
        Ok(self.vote.read().clone())
    }

    async fn save_committed(
        &mut self,
        committed: Option<LogId<u64>>,
    ) -> Result<(), StorageError<u64>> {
        if let Some(c) = &committed {
            let data = serde_json::to_vec(c).map_err(|e| StorageIOError::write(&e))?;
            self.backend
                .put(CF_META, KEY_COMMITTED, &data)
                .map_err(|e| StorageIOError::write(&e))?;
        }
        *self.committed.write() = committed;
        Ok(())
    }

    async fn read_committed(&mut self) -> Result<Option<LogId<u64>>, StorageError<u64>> {
        Ok(*self.committed.read())
    }

    // --- Log ---

    async fn get_log_state(&mut self) -> Result<LogState<MetaTypeConfig>, StorageError<u64>> {
        let log = self.log.read();
        let last_purged = *self.last_purged.read();
        let last_log_id = log.iter().next_back().map(|(_, e)| e.log_id).or(last_purged);

        Ok(LogState {
            last_purged_log_id: last_purged,
            last_log_id,
        })
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        MetaLogReader {
            store: self.clone(),
        }
    }

    async fn append_to_log<I>(&mut self, entries: I) -> Result<(), StorageError<u64>>
    where
        I: IntoIterator<Item = Entry<MetaTypeConfig>> + OptionalSend,
    {
        let mut log = self.log.write();
        for entry in entries {
            let payload = serde_json::to_vec(&entry.payload)
                .map_err(|e| StorageIOError::write_logs(&e))?;
            let data = LogEntryData {
                log_id: entry.log_id,
                payload,
            };
            let serialized =
                serde_json::to_vec(&data).map_err(|e| StorageIOError::write_logs(&e))?;
            self.backend
                .put(CF_LOG, &entry.log_id.index.to_be_bytes(), &serialized)
                .map_err(|e| StorageIOError::write_logs(&e))?;
            log.insert(entry.log_id.index, data);
        }
        Ok(())
    }

    async fn delete_conflict_logs_since(
        &mut self,
        log_id: LogId<u64>,
    ) -> Result<(), StorageError<u64>> {
        let mut log = self.log.write();
        let keys: Vec<u64> = log.range(log_id.index..).map(|(k, _)| *k).collect();
        for key in keys {
            self.backend
                .delete(CF_LOG, &key.to_be_bytes())
                .map_err(|e| StorageIOError::write_logs(&e))?;
            log.remove(&key);
        }
        Ok(())
    }

    async fn purge_logs_upto(&mut self, log_id: LogId<u64>) -> Result<(), StorageError<u64>> {
        {
            let data = serde_json::to_vec(&log_id).map_err(|e| StorageIOError::write(&e))?;
            self.backend
                .put(CF_META, KEY_PURGED, &data)
                .map_err(|e| StorageIOError::write(&e))?;
        }

        let mut log = self.log.write();
        let keys: Vec<u64> = log.range(..=log_id.index).map(|(k, _)| *k).collect();
        for key in keys {
            self.backend
                .delete(CF_LOG, &key.to_be_bytes())
                .map_err(|e| StorageIOError::write_logs(&e))?;
            log.remove(&key);
        }
        *self.last_purged.write() = Some(log_id);
        Ok(())
    }

    // --- State machine ---

    async fn last_applied_state(
        &mut self,
    ) -> Result<(Option<LogId<u64>>, StoredMembership<u64, MetaNode>), StorageError<u64>> {
        Ok((*self.last_applied.read(), self.last_membership.read().clone()))
    }

    async fn apply_to_state_machine(
        &mut self,
        entries: &[Entry<MetaTypeConfig>],
    ) -> Result<Vec<ApplyOutcome>, StorageError<u64>> {
        let mut results = Vec::with_capacity(entries.len());

        for entry in entries {
            *self.last_applied.write() = Some(entry.log_id);

            match &entry.payload {
                EntryPayload::Blank => results.push(ApplyOutcome::Ok),
                EntryPayload::Normal(cmd) => results.push(self.fsm.apply(cmd)),
                EntryPayload::Membership(membership) => {
                    *self.last_membership.write() =
                        StoredMembership::new(Some(entry.log_id), membership.clone());
                    results.push(ApplyOutcome::Ok);
                }
            }
        }

        Ok(results)
    }

    // --- Snapshots ---

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        MetaSnapshotBuilder {
            store: self.clone(),
        }
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<Cursor<Vec<u8>>>, StorageError<u64>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<u64, MetaNode>,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError<u64>> {
        let data = snapshot.into_inner();

        let sm_data: StateMachineData = serde_json::from_slice(&data)
            .map_err(|e| StorageIOError::read_snapshot(Some(meta.signature()), &e))?;
        let catalog: CatalogSnapshot = serde_json::from_slice(&sm_data.state)
            .map_err(|e| StorageIOError::read_snapshot(Some(meta.signature()), &e))?;

        self.fsm.restore(catalog);

        *self.last_applied.write() = meta.last_log_id;
        *self.last_membership.write() = meta.last_membership.clone();

        let stored = StoredSnapshot {
            meta: meta.clone(),
            data,
        };
        self.snapshots
            .save(&stored)
            .map_err(|e| StorageIOError::write_snapshot(Some(meta.signature()), &e))?;
        *self.current_snapshot.write() = Some(stored);

        // drop log entries the snapshot already covers
        if let Some(last_log_id) = meta.last_log_id {
            let mut log = self.log.write();
            let keys: Vec<u64> = log.range(..=last_log_id.index).map(|(k, _)| *k).collect();
            for key in keys {
                self.backend
                    .delete(CF_LOG, &key.to_be_bytes())
                    .map_err(|e| StorageIOError::write_logs(&e))?;
                log.remove(&key);
            }
            *self.last_purged.write() = Some(last_log_id);
        }

        Ok(())
    }

    async fn get_current_snapshot(
        &mut self,
    ) -> Result<Option<Snapshot<MetaTypeConfig>>, StorageError<u64>> {
        let current = self.current_snapshot.read();
        Ok(current.as_ref().map(|snapshot| Snapshot {
            meta: snapshot.meta.clone(),
            snapshot: Box::new(Cursor::new(snapshot.data.clone())),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    use crate::catalog::Catalog;
    use crate::heartbeat::NodeTable;
    use xuandb_commons::User;

    fn fsm() -> MetaFsm {
        MetaFsm::new(StdArc::new(Catalog::new()), StdArc::new(NodeTable::new()))
    }

    fn entry(index: u64, cmd: MetaCommand) -> Entry<MetaTypeConfig> {
        Entry {
            log_id: LogId::new(openraft::CommittedLeaderId::new(1, 1), index),
            payload: EntryPayload::Normal(cmd),
        }
    }

    #[tokio::test]
    async fn test_vote_operations() {
        let mut store = MetaRaftStore::new_in_memory(fsm(), SnapshotPersistence::Memory);

        assert!(store.read_vote().await.unwrap().is_none());
        assert!(!store.has_existing_state());

        let vote = Vote::new(1, 1);
        store.save_vote(&vote).await.unwrap();
        assert_eq!(store.read_vote().await.unwrap(), Some(vote));
        assert!(store.has_existing_state());
    }

    #[tokio::test]
    async fn test_log_append_and_read() {
        let mut store = MetaRaftStore::new_in_memory(fsm(), SnapshotPersistence::Memory);

        let state = store.get_log_state().await.unwrap();
        assert!(state.last_log_id.is_none());

        let cmd = MetaCommand::DropUser {
            name: "ghost".to_string(),
        };
        store.append_to_log(vec![entry(1, cmd.clone())]).await.unwrap();

        let state = store.get_log_state().await.unwrap();
        assert_eq!(state.last_log_id.unwrap().index, 1);

        let entries = store.try_get_log_entries(1..=1).await.unwrap();
        assert_eq!(entries.len(), 1);
        match &entries[0].payload {
            EntryPayload::Normal(read) => assert_eq!(read, &cmd),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_apply_and_snapshot_round_trip() {
        let catalog = StdArc::new(Catalog::new());
        let nodes = StdArc::new(NodeTable::new());
        let mut store = MetaRaftStore::new_in_memory(
            MetaFsm::new(catalog.clone(), nodes),
            SnapshotPersistence::Memory,
        );

        let outcomes = store
            .apply_to_state_machine(&[entry(
                1,
                MetaCommand::CreateUser {
                    user: User::new("root", "pw"),
                },
            )])
            .await
            .unwrap();
        assert_eq!(outcomes, vec![ApplyOutcome::Ok]);
        assert!(catalog.user("root").is_some());

        let snapshot = store.get_snapshot_builder().await.build_snapshot().await.unwrap();
        assert_eq!(snapshot.meta.last_log_id.unwrap().index, 1);

        // install the snapshot into a fresh store and compare catalogs
        let catalog2 = StdArc::new(Catalog::new());
        let mut store2 = MetaRaftStore::new_in_memory(
            MetaFsm::new(catalog2.clone(), StdArc::new(NodeTable::new())),
            SnapshotPersistence::Memory,
        );
        store2
            .install_snapshot(&snapshot.meta, snapshot.snapshot)
            .await
            .unwrap();
        assert_eq!(catalog2.snapshot(), catalog.snapshot());
        assert!(catalog2.user("root").unwrap().system);
    }

    #[tokio::test]
    async fn test_rocksdb_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut store =
                MetaRaftStore::open_rocksdb(fsm(), dir.path(), SnapshotPersistence::Discard)
                    .unwrap();
            assert!(!store.has_existing_state());

            store.save_vote(&Vote::new(3, 2)).await.unwrap();
            store
                .append_to_log(vec![entry(
                    1,
                    MetaCommand::DropUser {
                        name: "x".to_string(),
                    },
                )])
                .await
                .unwrap();
        }

        let store =
            MetaRaftStore::open_rocksdb(fsm(), dir.path(), SnapshotPersistence::Discard).unwrap();
        assert!(store.has_existing_state());
        assert_eq!(*store.vote.read(), Some(Vote::new(3, 2)));
        assert_eq!(store.log.read().len(), 1);
    }

    #[tokio::test]
    async fn test_file_snapshot_store_restores_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let snap_dir = dir.path().join("snapshots");

        let catalog = StdArc::new(Catalog::new());
        let mut store = MetaRaftStore::new_in_memory(
            MetaFsm::new(catalog.clone(), StdArc::new(NodeTable::new())),
            SnapshotPersistence::File(snap_dir.clone()),
        );
        store
            .apply_to_state_machine(&[entry(
                1,
                MetaCommand::CreateUser {
                    user: User::new("root", "pw"),
                },
            )])
            .await
            .unwrap();
        store
            .get_snapshot_builder()
            .await
            .build_snapshot()
            .await
            .unwrap();

        // a fresh store picks the snapshot up from disk
        let catalog2 = StdArc::new(Catalog::new());
        let store2 = MetaRaftStore::new_in_memory(
            MetaFsm::new(catalog2.clone(), StdArc::new(NodeTable::new())),
            SnapshotPersistence::File(snap_dir),
        );
        assert!(store2.has_existing_state());
        assert!(catalog2.user("root").is_some());
    }
}
