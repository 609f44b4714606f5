//! Commands replicated through the Raft log.
//!
//! Each committed log entry is a JSON object discriminated by its `op`
//! field, e.g. `{"op":"create-user","name":"root",...}`. The command set
//! is a closed enum, so an unknown op fails at decode time, which is a
//! programming error.

use serde::{Deserialize, Serialize};
use xuandb_commons::{Database, NodeInfo, User};

use crate::error::{MetaError, Result};

/// A state machine command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum MetaCommand {
    CreateUser {
        #[serde(flatten)]
        user: User,
    },
    DropUser {
        name: String,
    },
    SetPassword {
        name: String,
        password: String,
    },
    CreateDatabase {
        #[serde(flatten)]
        database: Database,
    },
    DropDatabase {
        name: String,
    },
    /// The leader's consolidated view of the node list, broadcast
    /// periodically so every replica converges on the same table.
    UpdateNodeList {
        nodes: Vec<NodeInfo>,
    },
}

/// Outcome of applying a command, conveyed back to the leader's caller
/// through Raft's response plumbing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum ApplyOutcome {
    #[default]
    Ok,
    Error {
        code: u16,
        message: String,
    },
}

impl ApplyOutcome {
    pub fn from_result(result: Result<()>) -> ApplyOutcome {
        match result {
            Ok(()) => ApplyOutcome::Ok,
            Err(e) => ApplyOutcome::Error {
                code: e.status_code(),
                message: e.to_string(),
            },
        }
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            ApplyOutcome::Ok => Ok(()),
            ApplyOutcome::Error { code, message } => Err(MetaError::from_status(code, message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_discriminator() {
        let cmd = MetaCommand::CreateUser {
            user: User::new("root", "pw"),
        };
        let v = serde_json::to_value(&cmd).unwrap();
        assert_eq!(v["op"], "create-user");
        assert_eq!(v["name"], "root");

        let cmd = MetaCommand::UpdateNodeList { nodes: vec![] };
        let v = serde_json::to_value(&cmd).unwrap();
        assert_eq!(v["op"], "update-node-list");
    }

    #[test]
    fn test_command_round_trip() {
        let cmds = vec![
            MetaCommand::CreateUser {
                user: User::new("alice", "pw"),
            },
            MetaCommand::DropUser {
                name: "alice".to_string(),
            },
            MetaCommand::SetPassword {
                name: "alice".to_string(),
                password: "new".to_string(),
            },
            MetaCommand::DropDatabase {
                name: "metrics".to_string(),
            },
            MetaCommand::UpdateNodeList {
                nodes: vec![NodeInfo::placeholder(3)],
            },
        ];
        for cmd in cmds {
            let data = serde_json::to_vec(&cmd).unwrap();
            let back: MetaCommand = serde_json::from_slice(&data).unwrap();
            assert_eq!(back, cmd);
        }
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        let err = serde_json::from_str::<MetaCommand>(r#"{"op":"truncate-universe"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_outcome_round_trip() {
        let outcome = ApplyOutcome::from_result(Err(MetaError::UserExists));
        match &outcome {
            ApplyOutcome::Error { code, .. } => assert_eq!(*code, 409),
            ApplyOutcome::Ok => panic!("expected error"),
        }
        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.status_code(), 409);

        assert_eq!(ApplyOutcome::from_result(Ok(())).into_result(), Ok(()));
    }
}
