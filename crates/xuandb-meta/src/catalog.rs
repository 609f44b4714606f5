//! The in-memory cluster catalog.
//!
//! A single mutex guards both maps. Entries are immutable once inserted:
//! updates allocate a new value and swap the `Arc`, so a reader that has
//! cloned an entry out keeps observing a consistent snapshot without
//! holding the lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use xuandb_commons::{Database, Privilege, User};

use crate::error::{MetaError, Result};

#[derive(Default)]
struct CatalogInner {
    users: HashMap<String, Arc<User>>,
    databases: HashMap<String, Arc<Database>>,
}

/// Thread-safe catalog of users and databases, keyed case-insensitively.
#[derive(Default)]
pub struct Catalog {
    inner: Mutex<CatalogInner>,
}

/// Point-in-time serialized form of the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub users: BTreeMap<String, User>,
    pub databases: BTreeMap<String, Database>,
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog::default()
    }

    /// Insert a user, failing when the name is taken.
    ///
    /// The first user ever created becomes the cluster's administrator:
    /// `system` and `ADMIN` are forced regardless of the request.
    pub fn create_user(&self, mut user: User) -> Result<()> {
        let key = user.name.to_lowercase();
        let mut inner = self.inner.lock();

        if inner.users.contains_key(&key) {
            return Err(MetaError::UserExists);
        }

        if inner.users.is_empty() {
            user.system = true;
            user.privilege = Privilege::ADMIN;
            log::info!("system admin created: {}", user.name);
        }
        inner.users.insert(key, Arc::new(user));
        Ok(())
    }

    /// Remove a user; absence is success.
    pub fn drop_user(&self, name: &str) {
        let key = name.to_lowercase();
        self.inner.lock().users.remove(&key);
    }

    /// Replace a user's password, copy-on-write.
    pub fn set_password(&self, name: &str, password: &str) -> Result<()> {
        let key = name.to_lowercase();
        let mut inner = self.inner.lock();

        match inner.users.get(&key) {
            Some(user) => {
                let mut updated = User::clone(user);
                updated.password = password.to_string();
                inner.users.insert(key, Arc::new(updated));
                Ok(())
            }
            None => Err(MetaError::UserNotExists),
        }
    }

    pub fn user(&self, name: &str) -> Option<Arc<User>> {
        let key = name.to_lowercase();
        self.inner.lock().users.get(&key).cloned()
    }

    /// All users, sorted by name.
    pub fn users(&self) -> Vec<Arc<User>> {
        let mut result: Vec<_> = self.inner.lock().users.values().cloned().collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    /// Fetch a user for authentication, together with whether the catalog
    /// holds no users at all (the bootstrap affordance).
    pub fn lookup_for_auth(&self, name: &str) -> (Option<Arc<User>>, bool) {
        let key = name.to_lowercase();
        let inner = self.inner.lock();
        (inner.users.get(&key).cloned(), inner.users.is_empty())
    }

    /// Insert a database, failing when the name is taken.
    pub fn create_database(&self, database: Database) -> Result<()> {
        let key = database.name.to_lowercase();
        let mut inner = self.inner.lock();

        if inner.databases.contains_key(&key) {
            return Err(MetaError::DatabaseExists);
        }
        inner.databases.insert(key, Arc::new(database));
        Ok(())
    }

    /// Remove a database; absence is success.
    pub fn drop_database(&self, name: &str) {
        let key = name.to_lowercase();
        self.inner.lock().databases.remove(&key);
    }

    pub fn database(&self, name: &str) -> Option<Arc<Database>> {
        let key = name.to_lowercase();
        self.inner.lock().databases.get(&key).cloned()
    }

    /// All databases, sorted by name.
    pub fn databases(&self) -> Vec<Arc<Database>> {
        let mut result: Vec<_> = self.inner.lock().databases.values().cloned().collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    /// Clone the catalog under the lock. Values are copied; the maps are
    /// small, so this keeps the critical section trivial.
    pub fn snapshot(&self) -> CatalogSnapshot {
        let inner = self.inner.lock();
        CatalogSnapshot {
            users: inner
                .users
                .iter()
                .map(|(k, v)| (k.clone(), User::clone(v)))
                .collect(),
            databases: inner
                .databases
                .iter()
                .map(|(k, v)| (k.clone(), Database::clone(v)))
                .collect(),
        }
    }

    /// Replace the catalog with a decoded snapshot.
    pub fn restore(&self, snapshot: CatalogSnapshot) {
        let mut inner = self.inner.lock();
        inner.users = snapshot
            .users
            .into_iter()
            .map(|(k, v)| (k, Arc::new(v)))
            .collect();
        inner.databases = snapshot
            .databases
            .into_iter()
            .map(|(k, v)| (k, Arc::new(v)))
            .collect();
    }
}
