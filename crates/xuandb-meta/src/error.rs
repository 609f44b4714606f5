//! Error types for the meta service.
//!
//! Every error carries an HTTP status code so handlers, the leader
//! forwarding client, and programmatic callers all speak the same
//! vocabulary: validation 400, auth 401/403, not-found 404, conflict 409,
//! leader problems 503, everything else 500.

use thiserror::Error;

/// Result type for meta service operations.
pub type Result<T> = std::result::Result<T, MetaError>;

/// Errors that can occur in the meta service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetaError {
    #[error("user already exists")]
    UserExists,

    #[error("user does not exist")]
    UserNotExists,

    #[error("cannot drop system user")]
    SystemUser,

    #[error("database already exists")]
    DatabaseExists,

    #[error("database does not exist")]
    DatabaseNotExists,

    #[error("authorization required")]
    AuthRequired,

    /// Wrong password or unknown user; the two are indistinguishable so
    /// user names cannot be probed.
    #[error("password mismatch or user not exists")]
    PasswordMismatch,

    #[error("insufficient privileges")]
    InsufficientPrivileges,

    #[error("wrong cluster name")]
    ClusterNameMismatch,

    /// Invalid request input.
    #[error("{0}")]
    InvalidArgument(String),

    /// The local node is not the leader.
    #[error("not leader")]
    NotLeader { leader: Option<u64> },

    /// No meta service leader is reachable.
    #[error("no meta service available")]
    NoMetaService,

    /// An error reported by a remote node, reconstructed from the response.
    #[error("{message}")]
    Remote { code: u16, message: String },

    #[error("raft error: {0}")]
    Raft(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MetaError {
    /// The HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            MetaError::InvalidArgument(_) => 400,
            MetaError::AuthRequired | MetaError::PasswordMismatch => 401,
            MetaError::SystemUser
            | MetaError::InsufficientPrivileges
            | MetaError::ClusterNameMismatch => 403,
            MetaError::UserNotExists | MetaError::DatabaseNotExists => 404,
            MetaError::UserExists | MetaError::DatabaseExists => 409,
            MetaError::NotLeader { .. } | MetaError::NoMetaService => 503,
            MetaError::Remote { code, .. } => *code,
            MetaError::Raft(_)
            | MetaError::Storage(_)
            | MetaError::Serialization(_)
            | MetaError::Network(_)
            | MetaError::Internal(_) => 500,
        }
    }

    /// Reconstruct a status-coded error from a remote response.
    pub fn from_status(code: u16, message: impl Into<String>) -> MetaError {
        MetaError::Remote {
            code,
            message: message.into(),
        }
    }

    /// The leader hint, if this is a not-leader error.
    pub fn leader_hint(&self) -> Option<u64> {
        match self {
            MetaError::NotLeader { leader } => *leader,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for MetaError {
    fn from(err: serde_json::Error) -> Self {
        MetaError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for MetaError {
    fn from(err: reqwest::Error) -> Self {
        MetaError::Network(err.to_string())
    }
}

impl From<std::io::Error> for MetaError {
    fn from(err: std::io::Error) -> Self {
        MetaError::Storage(err.to_string())
    }
}
