// Stable command ID assignment

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::warn;

/// Number of command IDs a user bitmap can represent. IDs at or above this
/// value are still assigned (they stay stable for the process lifetime) but
/// the authorizer denies the commands that carry them.
pub const MAX_COMMAND_ID: u32 = 1024;

/// Maps command names to small dense integers, used to index the per-user
/// command bitmaps. An ID is allocated the first time a name is seen and is
/// never reused, so a saved user definition stays valid when modules are
/// unloaded and reloaded with the same command names.
pub struct CommandIdRegistry {
    ids: DashMap<String, u32>,
    names: DashMap<u32, String>,
    next_id: AtomicU32,
}

impl CommandIdRegistry {
    pub fn new() -> Self {
        Self {
            ids: DashMap::new(),
            names: DashMap::new(),
            next_id: AtomicU32::new(0),
        }
    }

    /// Return the ID for `name`, allocating the next one on first sight.
    /// Command names are identified by their lower-cased form.
    pub fn id_of(&self, name: &str) -> u32 {
        let name = name.to_ascii_lowercase();
        if let Some(id) = self.ids.get(&name) {
            return *id;
        }
        *self.ids.entry(name.clone()).or_insert_with(|| {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id >= MAX_COMMAND_ID {
                warn!("command id space exhausted: '{}' assigned id {}", name, id);
            }
            self.names.insert(id, name);
            id
        })
    }

    /// The name an ID was allocated for, if any.
    pub fn name_of(&self, id: u32) -> Option<String> {
        self.names.get(&id).map(|n| n.clone())
    }

    /// Number of distinct command names seen so far.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for CommandIdRegistry {
    fn default() -> Self {
        Self::new()
    }
}
