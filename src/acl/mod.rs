// Access Control List implementation
// Authenticates client sessions and authorizes every dispatched command
// against per-user capability sets.

pub mod command_id;
pub mod pattern;
pub mod registry;
pub mod rule;
pub mod user;

pub use command_id::{CommandIdRegistry, MAX_COMMAND_ID};
pub use pattern::{glob_match, glob_match_nocase};
pub use registry::UserRegistry;
pub use rule::{AclRule, Category, MAX_PATTERN_LEN};
pub use user::{CommandBitmap, User, UserFlags};

use anyhow::Context;
use bytes::Bytes;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::commands::table::{CommandSpec, CommandTable};

/// Longest credential the authenticator will look at.
pub const MAX_PASS_LEN: usize = 512;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AclError {
    #[error("user '{0}' already exists")]
    UserExists(String),

    #[error("user '{0}' not found")]
    UserNotFound(String),

    #[error("The 'default' user cannot be removed")]
    ProtectedUser,

    #[error("Syntax error in ACL SETUSER modifier '{0}'")]
    SyntaxError(String),

    #[error("WRONGPASS invalid username-password pair")]
    NoSuchUser,

    #[error("WRONGPASS invalid username-password pair")]
    BadCredentials,

    #[error("NOPERM this user has no permissions to run the '{0}' command")]
    DeniedCommand(String),

    #[error("NOPERM this user has no permissions to access one of the keys used as arguments")]
    DeniedKey,
}

/// Byte-string equality whose running time depends only on `MAX_PASS_LEN`
/// and the input lengths (through the initial copies), never on which bytes
/// differ. Inputs longer than `MAX_PASS_LEN` compare not-equal without
/// touching the buffers; in practice no real credential gets that long, so
/// the early return leaks nothing.
pub fn time_independent_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() > MAX_PASS_LEN || b.len() > MAX_PASS_LEN {
        return false;
    }

    let mut buf_a = [0u8; MAX_PASS_LEN];
    let mut buf_b = [0u8; MAX_PASS_LEN];
    buf_a[..a.len()].copy_from_slice(a);
    buf_b[..b.len()].copy_from_slice(b);

    // Every byte of both buffers is folded in, with no data-dependent branch.
    let mut diff: usize = 0;
    for j in 0..MAX_PASS_LEN {
        diff |= (buf_a[j] ^ buf_b[j]) as usize;
    }
    diff |= a.len() ^ b.len();
    diff == 0
}

/// The ACL context: the user registry, the command descriptor table, and the
/// optional ACL file the registry is persisted to. One value of this type is
/// carried in the server's top-level state and shared with every connection.
pub struct Acl {
    users: UserRegistry,
    commands: CommandTable,
    acl_file: Option<PathBuf>,
}

impl Acl {
    /// A fresh context: the standard command table and a registry holding
    /// only the `default` user.
    pub fn new() -> Self {
        Self::with_table(CommandTable::standard())
    }

    pub fn with_table(commands: CommandTable) -> Self {
        Self {
            users: UserRegistry::new(),
            commands,
            acl_file: None,
        }
    }

    /// A context whose registry is loaded from (and saved back to) the
    /// given ACL file.
    pub fn from_file(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let mut acl = Self::new();
        acl.acl_file = Some(path.into());
        acl.load()?;
        Ok(acl)
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn lookup_user(&self, name: &str) -> Option<Arc<User>> {
        self.users.lookup(name)
    }

    pub fn delete_user(&self, name: &str) -> Result<(), AclError> {
        self.users.delete(name)
    }

    pub fn usernames(&self) -> Vec<String> {
        self.users.usernames()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Apply SETUSER rules to `name`, creating the user when missing.
    ///
    /// Rules apply left to right and are not rolled back: when a rule fails
    /// to parse, the mutations of the earlier rules (and the creation of the
    /// user itself) are committed before the error is returned.
    pub fn set_user(&self, name: &str, ops: &[Bytes]) -> Result<(), AclError> {
        let mut user = match self.users.lookup(name) {
            Some(existing) => (*existing).clone(),
            None => (*self.users.create(name)?).clone(),
        };

        let mut result = Ok(());
        for op in ops {
            match AclRule::parse(op) {
                Ok(rule) => self.apply_rule(&mut user, &rule),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.users.store(user);
        result
    }

    /// Apply one parsed rule. Category rules expand through the command
    /// table; command rules allocate IDs on first sight.
    pub fn apply_rule(&self, user: &mut User, rule: &AclRule) {
        match rule {
            AclRule::Enable => user.enable(),
            AclRule::Disable => user.disable(),
            AclRule::AllKeys => user.grant_all_keys(),
            AclRule::ResetKeys => user.reset_keys(),
            AclRule::AddPattern(pattern) => user.add_pattern(pattern.clone()),
            AclRule::AllCommands => user.grant_all_commands(),
            AclRule::AddCommand(name) => user.allow_command(self.commands.ids().id_of(name)),
            AclRule::AddSubcommand(name, sub) => {
                user.allow_subcommand(self.commands.ids().id_of(name), sub)
            }
            AclRule::RemoveCommand(name) => user.deny_command(self.commands.ids().id_of(name)),
            AclRule::AddCategory(category) => {
                for spec in self.commands.in_category(*category) {
                    user.allow_command(spec.id);
                }
            }
            AclRule::RemoveCategory(Category::All) => user.deny_all_commands(),
            AclRule::RemoveCategory(category) => {
                for spec in self.commands.in_category(*category) {
                    user.deny_command(spec.id);
                }
            }
            AclRule::NoPass => user.set_nopass(),
            AclRule::AddPassword(password) => user.add_password(password.clone()),
            AclRule::RemovePassword(password) => user.remove_password(password),
            AclRule::ResetPass => user.reset_pass(),
            AclRule::Reset => user.reset(),
        }
    }

    /// Validate a username/password pair and return the user to bind the
    /// session to. Disabled users fail exactly like wrong passwords, so the
    /// caller cannot probe which accounts exist but are switched off.
    pub fn authenticate(&self, username: &str, password: &[u8]) -> Result<Arc<User>, AclError> {
        let Some(user) = self.users.lookup(username) else {
            debug!("authentication failed: unknown user '{}'", username);
            return Err(AclError::NoSuchUser);
        };

        if !user.is_enabled() {
            debug!("authentication failed: user '{}' is disabled", username);
            return Err(AclError::BadCredentials);
        }

        if user.flags.contains(UserFlags::NOPASS) {
            return Ok(user);
        }

        // Check every stored password even after a hit, so the matching
        // index does not show up in the timing.
        let mut matched = false;
        for stored in user.passwords() {
            matched |= time_independent_eq(password, stored);
        }

        if matched {
            Ok(user)
        } else {
            debug!("authentication failed: bad credentials for '{}'", username);
            Err(AclError::BadCredentials)
        }
    }

    /// Decide whether the session user may run `cmd` with the given
    /// argument vector (`argv[0]` is the command name). A session with no
    /// bound user runs unrestricted; that mode is only reachable from
    /// server-internal callers.
    pub fn authorize(
        &self,
        user: Option<&User>,
        cmd: &CommandSpec,
        argv: &[Bytes],
    ) -> Result<(), AclError> {
        let Some(user) = user else {
            return Ok(());
        };

        if cmd.id >= MAX_COMMAND_ID {
            warn!(
                "command '{}' id {} overflows the bitmap, denying",
                cmd.name, cmd.id
            );
            return Err(AclError::DeniedCommand(cmd.name.clone()));
        }

        if !cmd.is_auth && !user.can_run(cmd.id) {
            let subcommand_ok = argv.len() >= 2 && user.subcommand_allowed(cmd.id, &argv[1]);
            if !subcommand_ok {
                debug!("user '{}' denied command '{}'", user.name(), cmd.name);
                return Err(AclError::DeniedCommand(cmd.name.clone()));
            }
        }

        if !user.flags.contains(UserFlags::ALLKEYS) && cmd.touches_keys() {
            for index in cmd.key_indices(argv) {
                if !user.can_access_key(&argv[index]) {
                    debug!(
                        "user '{}' denied key access while running '{}'",
                        user.name(),
                        cmd.name
                    );
                    return Err(AclError::DeniedKey);
                }
            }
        }

        Ok(())
    }

    /// The serialised definition of a user: `user <name> <rule ...>`, every
    /// token a valid SETUSER rule, so definitions round-trip through the
    /// rule parser by construction.
    pub fn describe_user(&self, user: &User) -> String {
        let mut parts = vec![format!("user {}", user.name())];
        let enabled = if user.is_enabled() { "on" } else { "off" };
        parts.push(enabled.to_string());

        if user.flags.contains(UserFlags::NOPASS) {
            parts.push("nopass".to_string());
        }
        for password in user.passwords() {
            parts.push(AclRule::AddPassword(password.clone()).serialize());
        }

        if user.flags.contains(UserFlags::ALLKEYS) {
            parts.push("~*".to_string());
        } else {
            for pattern in user.patterns() {
                parts.push(AclRule::AddPattern(pattern.clone()).serialize());
            }
        }

        parts.extend(self.command_tokens(user));
        parts.join(" ")
    }

    /// The `+`/`-` tokens describing a user's allowed command set.
    pub fn command_tokens(&self, user: &User) -> Vec<String> {
        if user.flags.contains(UserFlags::ALLCOMMANDS) {
            return vec!["+@all".to_string()];
        }

        let mut tokens = vec!["-@all".to_string()];
        for id in user.allowed_commands().set_ids() {
            if let Some(name) = self.commands.ids().name_of(id) {
                tokens.push(format!("+{}", name));
            }
        }

        let mut subcommand_ids: Vec<u32> = user.allowed_subcommands().keys().copied().collect();
        subcommand_ids.sort_unstable();
        for id in subcommand_ids {
            let Some(name) = self.commands.ids().name_of(id) else {
                continue;
            };
            for sub in &user.allowed_subcommands()[&id] {
                tokens.push(format!("+{}|{}", name, sub));
            }
        }
        tokens
    }

    /// Reload the registry from the configured ACL file. Unlike SETUSER,
    /// loading is atomic: the live registry is only replaced when the whole
    /// file parses.
    pub fn load(&self) -> anyhow::Result<()> {
        let path = self
            .acl_file
            .as_deref()
            .context("This instance is not configured to use an ACL file")?;
        self.load_from_file(path)
    }

    /// Persist the registry to the configured ACL file.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = self
            .acl_file
            .as_deref()
            .context("This instance is not configured to use an ACL file")?;
        self.save_to_file(path)
    }

    pub fn load_from_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read ACL file {}", path.display()))?;

        let mut users: HashMap<String, Arc<User>> = HashMap::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut tokens = line.split_whitespace();
            if tokens.next() != Some("user") {
                anyhow::bail!("ACL file line {}: expected 'user <name> ...'", lineno + 1);
            }
            let name = tokens
                .next()
                .with_context(|| format!("ACL file line {}: missing username", lineno + 1))?;

            let mut user = User::new(name);
            for op in tokens {
                let rule = AclRule::parse(op.as_bytes())
                    .map_err(|err| anyhow::anyhow!("ACL file line {}: {}", lineno + 1, err))?;
                self.apply_rule(&mut user, &rule);
            }

            if users.insert(name.to_string(), Arc::new(user)).is_some() {
                anyhow::bail!("ACL file line {}: duplicate user '{}'", lineno + 1, name);
            }
        }

        users
            .entry("default".to_string())
            .or_insert_with(|| Arc::new(User::default_user()));

        let count = users.len();
        self.users.replace_all(users);
        info!("loaded {} users from ACL file {}", count, path.display());
        Ok(())
    }

    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let mut out = String::new();
        for name in self.users.usernames() {
            if let Some(user) = self.users.lookup(&name) {
                out.push_str(&self.describe_user(&user));
                out.push('\n');
            }
        }
        fs::write(path, out)
            .with_context(|| format!("failed to write ACL file {}", path.display()))?;
        info!("saved {} users to ACL file {}", self.users.len(), path.display());
        Ok(())
    }
}

impl Default for Acl {
    fn default() -> Self {
        Self::new()
    }
}
