//! Databases stored in the cluster catalog.

use serde::{Deserialize, Serialize};

use crate::duration::Duration;

/// A database known to the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    pub name: String,

    /// Retention period; zero means data is kept forever.
    #[serde(default)]
    pub duration: Duration,
}

impl Database {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Database {
            name: name.into(),
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_as_string() {
        let db: Database = serde_json::from_str(r#"{"name":"metrics","duration":"7d"}"#).unwrap();
        assert_eq!(db.duration, "7d".parse().unwrap());

        let v = serde_json::to_value(&db).unwrap();
        assert_eq!(v["duration"], "7d");
    }

    #[test]
    fn test_duration_defaults_to_unlimited() {
        let db: Database = serde_json::from_str(r#"{"name":"metrics"}"#).unwrap();
        assert!(db.duration.is_zero());
    }
}
