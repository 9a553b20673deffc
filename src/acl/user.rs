// User records: flags, credentials, key patterns, command capabilities

use bytes::Bytes;
use std::collections::HashMap;

use super::command_id::MAX_COMMAND_ID;
use super::pattern::glob_match;

bitflags::bitflags! {
    /// Per-user state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UserFlags: u32 {
        /// User may authenticate
        const ENABLED = 1 << 0;
        /// User may touch any key; the pattern list is kept empty
        const ALLKEYS = 1 << 1;
        /// User may run any command; every bitmap bit is kept set
        const ALLCOMMANDS = 1 << 2;
        /// Any password, including the empty one, authenticates
        const NOPASS = 1 << 3;
    }
}

const BITMAP_WORDS: usize = MAX_COMMAND_ID as usize / 64;

/// Fixed-size bit vector indexed by command ID.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandBitmap {
    words: [u64; BITMAP_WORDS],
}

impl CommandBitmap {
    pub fn zeroed() -> Self {
        Self {
            words: [0; BITMAP_WORDS],
        }
    }

    pub fn get(&self, id: u32) -> bool {
        if id >= MAX_COMMAND_ID {
            return false;
        }
        self.words[id as usize / 64] & (1 << (id % 64)) != 0
    }

    pub fn set(&mut self, id: u32) {
        if id < MAX_COMMAND_ID {
            self.words[id as usize / 64] |= 1 << (id % 64);
        }
    }

    pub fn clear(&mut self, id: u32) {
        if id < MAX_COMMAND_ID {
            self.words[id as usize / 64] &= !(1 << (id % 64));
        }
    }

    pub fn set_all(&mut self) {
        self.words = [u64::MAX; BITMAP_WORDS];
    }

    pub fn clear_all(&mut self) {
        self.words = [0; BITMAP_WORDS];
    }

    pub fn is_all_set(&self) -> bool {
        self.words.iter().all(|w| *w == u64::MAX)
    }

    /// IDs of the set bits, in ascending order.
    pub fn set_ids(&self) -> Vec<u32> {
        (0..MAX_COMMAND_ID).filter(|id| self.get(*id)).collect()
    }
}

impl std::fmt::Debug for CommandBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBitmap")
            .field("set", &self.set_ids())
            .finish()
    }
}

/// A named principal with credentials and a capability set.
///
/// The registry hands out `Arc<User>` snapshots; a mutation builds a new
/// record and replaces the stored one, so sessions holding a snapshot keep
/// the capabilities they were bound with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    name: String,
    pub flags: UserFlags,
    /// Plain-text credentials, insertion-ordered, no duplicates
    passwords: Vec<Bytes>,
    /// Glob key patterns, insertion-ordered, no duplicates
    patterns: Vec<Bytes>,
    allowed_commands: CommandBitmap,
    /// Per-command subcommand allow-lists, consulted only when the
    /// command's bitmap bit is clear
    allowed_subcommands: HashMap<u32, Vec<String>>,
}

impl User {
    /// A just-created user: disabled, no credentials, no keys, no commands.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: UserFlags::empty(),
            passwords: Vec::new(),
            patterns: Vec::new(),
            allowed_commands: CommandBitmap::zeroed(),
            allowed_subcommands: HashMap::new(),
        }
    }

    /// The `default` user created at init: enabled, passwordless, full access.
    pub fn default_user() -> Self {
        let mut user = Self::new("default");
        user.flags =
            UserFlags::ENABLED | UserFlags::ALLKEYS | UserFlags::ALLCOMMANDS | UserFlags::NOPASS;
        user.allowed_commands.set_all();
        user
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.contains(UserFlags::ENABLED)
    }

    pub fn enable(&mut self) {
        self.flags |= UserFlags::ENABLED;
    }

    pub fn disable(&mut self) {
        self.flags.remove(UserFlags::ENABLED);
    }

    pub fn passwords(&self) -> &[Bytes] {
        &self.passwords
    }

    pub fn patterns(&self) -> &[Bytes] {
        &self.patterns
    }

    pub fn allowed_commands(&self) -> &CommandBitmap {
        &self.allowed_commands
    }

    pub fn allowed_subcommands(&self) -> &HashMap<u32, Vec<String>> {
        &self.allowed_subcommands
    }

    pub fn add_password(&mut self, password: Bytes) {
        self.flags.remove(UserFlags::NOPASS);
        if !self.passwords.contains(&password) {
            self.passwords.push(password);
        }
    }

    pub fn remove_password(&mut self, password: &[u8]) {
        self.passwords.retain(|p| p.as_ref() != password);
    }

    pub fn set_nopass(&mut self) {
        self.flags |= UserFlags::NOPASS;
        self.passwords.clear();
    }

    pub fn reset_pass(&mut self) {
        self.flags.remove(UserFlags::NOPASS);
        self.passwords.clear();
    }

    pub fn add_pattern(&mut self, pattern: Bytes) {
        self.flags.remove(UserFlags::ALLKEYS);
        if !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
    }

    pub fn grant_all_keys(&mut self) {
        self.flags |= UserFlags::ALLKEYS;
        self.patterns.clear();
    }

    pub fn reset_keys(&mut self) {
        self.flags.remove(UserFlags::ALLKEYS);
        self.patterns.clear();
    }

    pub fn grant_all_commands(&mut self) {
        self.flags |= UserFlags::ALLCOMMANDS;
        self.allowed_commands.set_all();
        self.allowed_subcommands.clear();
    }

    pub fn allow_command(&mut self, id: u32) {
        self.allowed_commands.set(id);
        // A set bit makes any subcommand list for the ID redundant.
        self.allowed_subcommands.remove(&id);
    }

    pub fn deny_command(&mut self, id: u32) {
        self.flags.remove(UserFlags::ALLCOMMANDS);
        self.allowed_commands.clear(id);
        self.allowed_subcommands.remove(&id);
    }

    pub fn deny_all_commands(&mut self) {
        self.flags.remove(UserFlags::ALLCOMMANDS);
        self.allowed_commands.clear_all();
        self.allowed_subcommands.clear();
    }

    /// Allow a single subcommand of an otherwise disallowed command.
    /// A no-op when the command's bit is already set.
    pub fn allow_subcommand(&mut self, id: u32, subcommand: &str) {
        if self.allowed_commands.get(id) {
            return;
        }
        let list = self.allowed_subcommands.entry(id).or_default();
        if !list.iter().any(|s| s.eq_ignore_ascii_case(subcommand)) {
            list.push(subcommand.to_string());
        }
    }

    /// resetpass, resetkeys, off, -@all: the state of a freshly created user.
    pub fn reset(&mut self) {
        self.reset_pass();
        self.reset_keys();
        self.disable();
        self.deny_all_commands();
    }

    pub fn can_run(&self, id: u32) -> bool {
        self.flags.contains(UserFlags::ALLCOMMANDS) || self.allowed_commands.get(id)
    }

    pub fn subcommand_allowed(&self, id: u32, arg: &[u8]) -> bool {
        self.allowed_subcommands
            .get(&id)
            .map(|subs| subs.iter().any(|s| s.as_bytes().eq_ignore_ascii_case(arg)))
            .unwrap_or(false)
    }

    /// True when at least one pattern matches `key` (or the user has ALLKEYS).
    pub fn can_access_key(&self, key: &[u8]) -> bool {
        if self.flags.contains(UserFlags::ALLKEYS) {
            return true;
        }
        self.patterns.iter().any(|p| glob_match(p, key))
    }
}
