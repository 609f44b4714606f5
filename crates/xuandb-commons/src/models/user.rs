//! User accounts stored in the cluster catalog.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::privilege::Privilege;

pub(crate) fn default_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// A user of the cluster.
///
/// Names are unique case-insensitively; the catalog keys entries by the
/// lowercased name while this struct keeps the name as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    pub password: String,

    /// Assigned by the leader when the user is created.
    #[serde(default = "default_timestamp")]
    pub created_at: DateTime<Utc>,

    /// System users cannot be dropped and their privileges cannot be
    /// reduced. The first user ever created becomes a system user.
    #[serde(default)]
    pub system: bool,

    /// Global privileges. Checked before database privileges, so a global
    /// grant applies to every database.
    #[serde(default, rename = "privilege")]
    pub privilege: Privilege,

    /// Per-database privileges, keyed by database name.
    #[serde(default, rename = "dbPriv")]
    pub db_priv: HashMap<String, Privilege>,
}

impl User {
    /// A plain user with no privileges, as submitted by clients.
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        User {
            name: name.into(),
            password: password.into(),
            created_at: default_timestamp(),
            system: false,
            privilege: Privilege::NONE,
            db_priv: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let mut u = User::new("Alice", "secret");
        u.privilege = Privilege::READ;
        u.db_priv.insert("metrics".to_string(), Privilege::WRITE);

        let v = serde_json::to_value(&u).unwrap();
        assert_eq!(v["name"], "Alice");
        assert_eq!(v["privilege"], "READ");
        assert_eq!(v["dbPriv"]["metrics"], "WRITE");
        assert_eq!(v["system"], false);
    }

    #[test]
    fn test_decode_partial_request() {
        // Clients may send only name and password.
        let u: User = serde_json::from_str(r#"{"name":"bob","password":"x"}"#).unwrap();
        assert_eq!(u.name, "bob");
        assert_eq!(u.privilege, Privilege::NONE);
        assert!(!u.system);
        assert!(u.db_priv.is_empty());
    }
}
