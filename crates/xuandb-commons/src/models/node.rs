//! Runtime node descriptors.
//!
//! `NodeInfo` is not part of the durable catalog; it is rebuilt from
//! heartbeats and replicated through node-list updates in the Raft log.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::user::default_timestamp;

/// Bitset of the roles a node plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeRole(u8);

impl NodeRole {
    pub const NONE: NodeRole = NodeRole(0);
    /// Voting member of the meta service.
    pub const META: NodeRole = NodeRole(1);
    /// Runs the data service.
    pub const DATA: NodeRole = NodeRole(2);
    /// Runs the query service.
    pub const QUERY: NodeRole = NodeRole(4);

    pub const fn contains(self, other: NodeRole) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for NodeRole {
    type Output = NodeRole;

    fn bitor(self, rhs: NodeRole) -> NodeRole {
        NodeRole(self.0 | rhs.0)
    }
}

impl BitOrAssign for NodeRole {
    fn bitor_assign(&mut self, rhs: NodeRole) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (bit, name) in [
            (NodeRole::META, "meta"),
            (NodeRole::DATA, "data"),
            (NodeRole::QUERY, "query"),
        ] {
            if self.contains(bit) {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<NodeRole, String> {
        let mut v = NodeRole::NONE;
        for part in s.split(',') {
            match part.trim().to_ascii_lowercase().as_str() {
                "" => {}
                "meta" => v |= NodeRole::META,
                "data" => v |= NodeRole::DATA,
                "query" => v |= NodeRole::QUERY,
                other => return Err(format!("invalid node role: {other}")),
            }
        }
        Ok(v)
    }
}

impl Serialize for NodeRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<NodeRole, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Runtime information of a node, carried by heartbeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub id: u64,

    /// HTTP address of the node.
    #[serde(default)]
    pub addr: String,

    #[serde(default)]
    pub role: NodeRole,

    #[serde(default = "default_timestamp")]
    pub last_heartbeat_time: DateTime<Utc>,
}

impl NodeInfo {
    /// A placeholder entry for a node that has not sent a heartbeat yet.
    pub fn placeholder(id: u64) -> Self {
        NodeInfo {
            id,
            addr: String::new(),
            role: NodeRole::NONE,
            last_heartbeat_time: default_timestamp(),
        }
    }
}

/// Liveness of a node, derived from the age of its last heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Alive,
    Unknown,
    Dead,
}

impl NodeState {
    /// Thresholds: alive under 10 s, unknown under 30 s, dead beyond.
    pub fn of_heartbeat_age(age: TimeDelta) -> NodeState {
        if age >= TimeDelta::seconds(30) {
            NodeState::Dead
        } else if age >= TimeDelta::seconds(10) {
            NodeState::Unknown
        } else {
            NodeState::Alive
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Alive => f.write_str("alive"),
            NodeState::Unknown => f.write_str("unknown"),
            NodeState::Dead => f.write_str("dead"),
        }
    }
}

/// `NodeInfo` extended with status fields for the node status API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    #[serde(flatten)]
    pub info: NodeInfo,
    pub leader: bool,
    pub state: NodeState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        let r = NodeRole::META | NodeRole::QUERY;
        assert_eq!(r.to_string(), "meta,query");
        assert_eq!("meta,query".parse::<NodeRole>().unwrap(), r);
        assert_eq!("".parse::<NodeRole>().unwrap(), NodeRole::NONE);
        assert!("gateway".parse::<NodeRole>().is_err());
    }

    #[test]
    fn test_state_thresholds() {
        assert_eq!(
            NodeState::of_heartbeat_age(TimeDelta::seconds(1)),
            NodeState::Alive
        );
        assert_eq!(
            NodeState::of_heartbeat_age(TimeDelta::seconds(11)),
            NodeState::Unknown
        );
        assert_eq!(
            NodeState::of_heartbeat_age(TimeDelta::seconds(31)),
            NodeState::Dead
        );
        // a heartbeat from the (near) future is still alive
        assert_eq!(
            NodeState::of_heartbeat_age(TimeDelta::seconds(-5)),
            NodeState::Alive
        );
    }

    #[test]
    fn test_node_info_json() {
        let ni = NodeInfo {
            id: 3,
            addr: "10.0.0.3:8003".to_string(),
            role: NodeRole::META | NodeRole::DATA,
            last_heartbeat_time: Utc::now(),
        };
        let v = serde_json::to_value(&ni).unwrap();
        assert_eq!(v["id"], 3);
        assert_eq!(v["role"], "meta,data");
        assert!(v["lastHeartbeatTime"].is_string());
    }
}
