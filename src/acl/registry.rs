// The user registry: name -> user records, with the protected default user

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use super::user::User;
use super::AclError;

/// Owns every user record. Lookups hand out `Arc<User>` snapshots; writers
/// replace whole records, so readers on the command hot path never block on
/// a mutation in progress.
pub struct UserRegistry {
    users: RwLock<HashMap<String, Arc<User>>>,
}

impl UserRegistry {
    /// A fresh registry containing only the `default` user.
    pub fn new() -> Self {
        let mut users = HashMap::new();
        let default_user = User::default_user();
        users.insert(default_user.name().to_string(), Arc::new(default_user));
        Self {
            users: RwLock::new(users),
        }
    }

    /// Create a disabled, capability-less user. Fails if the name is taken.
    pub fn create(&self, name: &str) -> Result<Arc<User>, AclError> {
        let mut users = self.users.write().unwrap();
        if users.contains_key(name) {
            return Err(AclError::UserExists(name.to_string()));
        }
        let user = Arc::new(User::new(name));
        users.insert(name.to_string(), Arc::clone(&user));
        info!("acl user '{}' created", name);
        Ok(user)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<User>> {
        self.users.read().unwrap().get(name).map(Arc::clone)
    }

    /// Store `user` under its name, replacing any previous record. Sessions
    /// bound to the old record keep their snapshot.
    pub fn store(&self, user: User) -> Arc<User> {
        let user = Arc::new(user);
        self.users
            .write()
            .unwrap()
            .insert(user.name().to_string(), Arc::clone(&user));
        user
    }

    /// Remove a user. The `default` user is protected.
    pub fn delete(&self, name: &str) -> Result<(), AclError> {
        if name == "default" {
            return Err(AclError::ProtectedUser);
        }
        let mut users = self.users.write().unwrap();
        if users.remove(name).is_none() {
            return Err(AclError::UserNotFound(name.to_string()));
        }
        info!("acl user '{}' deleted", name);
        Ok(())
    }

    /// All usernames, sorted so listings are stable between mutations.
    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.users.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.users.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().unwrap().is_empty()
    }

    /// Swap in a freshly loaded user table. The caller guarantees it
    /// contains a `default` user.
    pub fn replace_all(&self, new_users: HashMap<String, Arc<User>>) {
        debug_assert!(new_users.contains_key("default"));
        let mut users = self.users.write().unwrap();
        debug!("acl registry replaced: {} users", new_users.len());
        *users = new_users;
    }
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
