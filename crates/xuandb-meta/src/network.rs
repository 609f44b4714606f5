//! Raft RPC transport.
//!
//! Raft RPCs travel as JSON over HTTP to the peer's `raft-addr`, on the
//! same stack the admin surface uses. The server side lives in
//! `http::configure_raft`; each response body is the serialized
//! `Result` of the local `Raft` call, so remote apply errors come back
//! typed instead of as opaque transport failures.

use openraft::error::{InstallSnapshotError, NetworkError, RPCError, RaftError, RemoteError};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::storage::{MetaNode, MetaTypeConfig};

/// Timeout for a single Raft RPC, including connect time.
const RPC_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Creates one HTTP connection handle per replication target.
#[derive(Clone)]
pub struct HttpNetworkFactory {
    client: reqwest::Client,
}

impl HttpNetworkFactory {
    pub fn new() -> HttpNetworkFactory {
        let client = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .expect("default reqwest client");
        HttpNetworkFactory { client }
    }
}

impl Default for HttpNetworkFactory {
    fn default() -> Self {
        HttpNetworkFactory::new()
    }
}

impl RaftNetworkFactory<MetaTypeConfig> for HttpNetworkFactory {
    type Network = HttpNetworkConnection;

    async fn new_client(&mut self, target: u64, node: &MetaNode) -> Self::Network {
        HttpNetworkConnection {
            client: self.client.clone(),
            target,
            target_node: node.clone(),
        }
    }
}

/// A connection to one peer.
pub struct HttpNetworkConnection {
    client: reqwest::Client,
    target: u64,
    target_node: MetaNode,
}

impl HttpNetworkConnection {
    async fn send_rpc<Req, Resp, Err>(
        &self,
        path: &str,
        req: &Req,
    ) -> Result<Resp, RPCError<u64, MetaNode, Err>>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
        Err: std::error::Error + DeserializeOwned,
    {
        let url = format!("http://{}{}", self.target_node.raft_addr, path);

        let resp = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| RPCError::Network(NetworkError::new(&e)))?;

        let result: Result<Resp, Err> = resp
            .json()
            .await
            .map_err(|e| RPCError::Network(NetworkError::new(&e)))?;

        result.map_err(|e| RPCError::RemoteError(RemoteError::new(self.target, e)))
    }
}

impl RaftNetwork<MetaTypeConfig> for HttpNetworkConnection {
    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<MetaTypeConfig>,
        _option: RPCOption,
    ) -> Result<AppendEntriesResponse<u64>, RPCError<u64, MetaNode, RaftError<u64>>> {
        self.send_rpc("/raft/append", &rpc).await
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<MetaTypeConfig>,
        _option: RPCOption,
    ) -> Result<
        InstallSnapshotResponse<u64>,
        RPCError<u64, MetaNode, RaftError<u64, InstallSnapshotError>>,
    > {
        self.send_rpc("/raft/snapshot", &rpc).await
    }

    async fn vote(
        &mut self,
        rpc: VoteRequest<u64>,
        _option: RPCOption,
    ) -> Result<VoteResponse<u64>, RPCError<u64, MetaNode, RaftError<u64>>> {
        self.send_rpc("/raft/vote", &rpc).await
    }
}
