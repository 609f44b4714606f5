//! Outbound HTTP client for peer calls.
//!
//! Wraps joins, heartbeats, and leader-forwarded writes. A 2xx response
//! is success; any other response body is the remote error message, from
//! which a status-coded error is reconstructed, so a forwarded call fails
//! exactly like a local one. Every call carries the cluster header that
//! marks it as node-to-node traffic, and no call waits longer than five
//! seconds.
//!
//! No retries happen here: when the leader moved, the 503 response
//! carries `X-Meta-Leader-Hint` so a higher-level client can retry.

use serde::Serialize;

use crate::error::{MetaError, Result};

/// Header naming the leader's HTTP address on responses from non-leaders.
pub const LEADER_HINT_HEADER: &str = "X-Meta-Leader-Hint";

/// Header marking cluster-internal requests; carries the cluster name.
pub const CLUSTER_HEADER: &str = "X-Xuan-Cluster";

/// Timeout for a single peer call, including connect time.
const PEER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// HTTP client for node-to-node calls.
pub struct PeerClient {
    http: reqwest::Client,
    cluster_name: String,
}

impl PeerClient {
    pub fn new(cluster_name: impl Into<String>) -> PeerClient {
        let http = reqwest::Client::builder()
            .timeout(PEER_TIMEOUT)
            .build()
            .expect("default reqwest client");
        PeerClient {
            http,
            cluster_name: cluster_name.into(),
        }
    }

    /// POST a JSON body to a peer.
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        addr: &str,
        path: &str,
        body: &T,
    ) -> Result<()> {
        let req = self
            .http
            .post(format!("http://{addr}{path}"))
            .header(CLUSTER_HEADER, &self.cluster_name)
            .json(body);
        Self::finish(req.send().await?).await
    }

    /// PUT a JSON body to a peer.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        addr: &str,
        path: &str,
        body: &T,
    ) -> Result<()> {
        let req = self
            .http
            .put(format!("http://{addr}{path}"))
            .header(CLUSTER_HEADER, &self.cluster_name)
            .json(body);
        Self::finish(req.send().await?).await
    }

    /// DELETE with query parameters.
    pub async fn delete(&self, addr: &str, path: &str, query: &[(&str, &str)]) -> Result<()> {
        let req = self
            .http
            .delete(format!("http://{addr}{path}"))
            .header(CLUSTER_HEADER, &self.cluster_name)
            .query(query);
        Self::finish(req.send().await?).await
    }

    async fn finish(resp: reqwest::Response) -> Result<()> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let message = resp.text().await.unwrap_or_default();
        Err(MetaError::from_status(
            status.as_u16(),
            message.trim_end().to_string(),
        ))
    }
}
