// Per-connection session state consulted by the ACL checks

use std::sync::Arc;

use crate::acl::{Acl, User};

/// The user binding of one client connection. A new connection starts bound
/// to the `default` user; a successful AUTH replaces the binding. The
/// session holds a snapshot of the user record, so later mutations or even
/// deletion of the user leave the running session untouched.
pub struct Session {
    user: Option<Arc<User>>,
    username: String,
}

impl Session {
    pub fn new(acl: &Acl) -> Self {
        Self {
            user: acl.lookup_user("default"),
            username: "default".to_string(),
        }
    }

    /// A session exempt from ACL checks, for server-internal callers.
    pub fn unrestricted() -> Self {
        Self {
            user: None,
            username: "default".to_string(),
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_deref()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Rebind after a successful authentication.
    pub fn bind(&mut self, user: Arc<User>) {
        self.username = user.name().to_string();
        self.user = Some(user);
    }

    /// Drop back to the `default` user. Called before a user record the
    /// session still references is released for good.
    pub fn reset_to_default(&mut self, acl: &Acl) {
        self.user = acl.lookup_user("default");
        self.username = "default".to_string();
    }
}
