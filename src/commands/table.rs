// Command descriptors: identity, categories, key argument positions

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;

use crate::acl::command_id::CommandIdRegistry;
use crate::acl::rule::Category;

/// Static description of one command, as consumed by the authorizer and the
/// category rules. Key arguments are located with the usual
/// first/last/step triple: `last_key == -1` means "up to the final
/// argument", `first_key == 0` means the command touches no keys.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: String,
    pub id: u32,
    pub categories: Vec<Category>,
    pub first_key: usize,
    pub last_key: i64,
    pub key_step: usize,
    /// The authentication command must stay executable for everyone.
    pub is_auth: bool,
}

impl CommandSpec {
    pub fn touches_keys(&self) -> bool {
        self.first_key != 0
    }

    /// Positions in `argv` (command name at index 0) holding key names.
    pub fn key_indices(&self, argv: &[Bytes]) -> Vec<usize> {
        if self.first_key == 0 {
            return Vec::new();
        }
        let last = if self.last_key < 0 {
            match argv.len() as i64 + self.last_key {
                l if l >= 0 => l as usize,
                _ => return Vec::new(),
            }
        } else {
            self.last_key as usize
        };

        let mut indices = Vec::new();
        let mut i = self.first_key;
        while i <= last && i < argv.len() {
            indices.push(i);
            i += self.key_step.max(1);
        }
        indices
    }

    pub fn has_category(&self, category: Category) -> bool {
        category == Category::All || self.categories.contains(&category)
    }
}

/// The registered command set. IDs are handed out by the shared
/// [`CommandIdRegistry`], so a name keeps its ID across re-registration.
pub struct CommandTable {
    ids: CommandIdRegistry,
    by_name: DashMap<String, Arc<CommandSpec>>,
    by_id: DashMap<u32, Arc<CommandSpec>>,
}

use Category::{
    Admin, Bitmap, Fast, Hash, Hyperloglog, List, Pubsub, Readonly, Readwrite, Set, Slow,
    SortedSet, Stream,
};

/// (name, categories, first_key, last_key, key_step)
const STANDARD_COMMANDS: &[(&str, &[Category], usize, i64, usize)] = &[
    // strings
    ("get", &[Category::String, Readonly, Fast], 1, 1, 1),
    ("set", &[Category::String, Readwrite, Slow], 1, 1, 1),
    ("setnx", &[Category::String, Readwrite, Fast], 1, 1, 1),
    ("setex", &[Category::String, Readwrite, Slow], 1, 1, 1),
    ("getset", &[Category::String, Readwrite, Fast], 1, 1, 1),
    ("mget", &[Category::String, Readonly, Fast], 1, -1, 1),
    ("mset", &[Category::String, Readwrite, Slow], 1, -1, 2),
    ("append", &[Category::String, Readwrite, Fast], 1, 1, 1),
    ("strlen", &[Category::String, Readonly, Fast], 1, 1, 1),
    ("incr", &[Category::String, Readwrite, Fast], 1, 1, 1),
    ("decr", &[Category::String, Readwrite, Fast], 1, 1, 1),
    ("incrby", &[Category::String, Readwrite, Fast], 1, 1, 1),
    ("decrby", &[Category::String, Readwrite, Fast], 1, 1, 1),
    ("getrange", &[Category::String, Readonly, Slow], 1, 1, 1),
    ("setrange", &[Category::String, Readwrite, Slow], 1, 1, 1),
    // keyspace
    ("del", &[Readwrite, Slow], 1, -1, 1),
    ("exists", &[Readonly, Fast], 1, -1, 1),
    ("type", &[Readonly, Fast], 1, 1, 1),
    ("expire", &[Readwrite, Fast], 1, 1, 1),
    ("ttl", &[Readonly, Fast], 1, 1, 1),
    ("persist", &[Readwrite, Fast], 1, 1, 1),
    ("rename", &[Readwrite, Fast], 1, 2, 1),
    ("keys", &[Readonly, Slow], 0, 0, 0),
    ("scan", &[Readonly, Slow], 0, 0, 0),
    // lists
    ("lpush", &[List, Readwrite, Fast], 1, 1, 1),
    ("rpush", &[List, Readwrite, Fast], 1, 1, 1),
    ("lpop", &[List, Readwrite, Fast], 1, 1, 1),
    ("rpop", &[List, Readwrite, Fast], 1, 1, 1),
    ("lrange", &[List, Readonly, Slow], 1, 1, 1),
    ("llen", &[List, Readonly, Fast], 1, 1, 1),
    ("lindex", &[List, Readonly, Slow], 1, 1, 1),
    ("lset", &[List, Readwrite, Slow], 1, 1, 1),
    // sets
    ("sadd", &[Set, Readwrite, Fast], 1, 1, 1),
    ("srem", &[Set, Readwrite, Fast], 1, 1, 1),
    ("smembers", &[Set, Readonly, Slow], 1, 1, 1),
    ("sismember", &[Set, Readonly, Fast], 1, 1, 1),
    ("scard", &[Set, Readonly, Fast], 1, 1, 1),
    ("sinter", &[Set, Readonly, Slow], 1, -1, 1),
    ("sunion", &[Set, Readonly, Slow], 1, -1, 1),
    // sorted sets
    ("zadd", &[SortedSet, Readwrite, Fast], 1, 1, 1),
    ("zrem", &[SortedSet, Readwrite, Fast], 1, 1, 1),
    ("zrange", &[SortedSet, Readonly, Slow], 1, 1, 1),
    ("zcard", &[SortedSet, Readonly, Fast], 1, 1, 1),
    ("zscore", &[SortedSet, Readonly, Fast], 1, 1, 1),
    ("zincrby", &[SortedSet, Readwrite, Fast], 1, 1, 1),
    // hashes
    ("hset", &[Hash, Readwrite, Fast], 1, 1, 1),
    ("hdel", &[Hash, Readwrite, Fast], 1, 1, 1),
    ("hget", &[Hash, Readonly, Fast], 1, 1, 1),
    ("hmget", &[Hash, Readonly, Fast], 1, 1, 1),
    ("hgetall", &[Hash, Readonly, Slow], 1, 1, 1),
    ("hlen", &[Hash, Readonly, Fast], 1, 1, 1),
    // bitmaps
    ("setbit", &[Bitmap, Readwrite, Fast], 1, 1, 1),
    ("getbit", &[Bitmap, Readonly, Fast], 1, 1, 1),
    ("bitcount", &[Bitmap, Readonly, Slow], 1, 1, 1),
    ("bitop", &[Bitmap, Readwrite, Slow], 2, -1, 1),
    // hyperloglogs
    ("pfadd", &[Hyperloglog, Readwrite, Fast], 1, 1, 1),
    ("pfcount", &[Hyperloglog, Readonly, Slow], 1, -1, 1),
    ("pfmerge", &[Hyperloglog, Readwrite, Slow], 1, -1, 1),
    // streams
    ("xadd", &[Stream, Readwrite, Fast], 1, 1, 1),
    ("xlen", &[Stream, Readonly, Fast], 1, 1, 1),
    ("xrange", &[Stream, Readonly, Slow], 1, 1, 1),
    ("xdel", &[Stream, Readwrite, Fast], 1, 1, 1),
    // pub/sub
    ("subscribe", &[Pubsub, Slow], 0, 0, 0),
    ("unsubscribe", &[Pubsub, Slow], 0, 0, 0),
    ("psubscribe", &[Pubsub, Slow], 0, 0, 0),
    ("punsubscribe", &[Pubsub, Slow], 0, 0, 0),
    ("publish", &[Pubsub, Fast], 0, 0, 0),
    // server administration
    ("acl", &[Admin, Slow], 0, 0, 0),
    ("config", &[Admin, Slow], 0, 0, 0),
    ("debug", &[Admin, Slow], 0, 0, 0),
    ("shutdown", &[Admin, Slow], 0, 0, 0),
    ("client", &[Admin, Slow], 0, 0, 0),
    ("slowlog", &[Admin, Slow], 0, 0, 0),
    ("monitor", &[Admin, Slow], 0, 0, 0),
    ("flushall", &[Readwrite, Slow], 0, 0, 0),
    ("flushdb", &[Readwrite, Slow], 0, 0, 0),
    ("dbsize", &[Readonly, Fast], 0, 0, 0),
    ("info", &[Slow], 0, 0, 0),
    ("command", &[Slow], 0, 0, 0),
    // connection
    ("ping", &[Fast], 0, 0, 0),
    ("echo", &[Fast], 0, 0, 0),
    ("select", &[Fast], 0, 0, 0),
];

impl CommandTable {
    /// An empty table with a fresh ID registry.
    pub fn empty() -> Self {
        Self {
            ids: CommandIdRegistry::new(),
            by_name: DashMap::new(),
            by_id: DashMap::new(),
        }
    }

    /// The base server's command set, plus the `auth` descriptor.
    pub fn standard() -> Self {
        let table = Self::empty();
        for (name, categories, first_key, last_key, key_step) in STANDARD_COMMANDS {
            table.insert(name, categories, *first_key, *last_key, *key_step, false);
        }
        table.insert("auth", &[Fast], 0, 0, 0, true);
        table
    }

    /// Register a command at runtime, e.g. one supplied by a module. The
    /// name keeps its ID across unload/reload cycles.
    pub fn register(
        &self,
        name: &str,
        categories: &[Category],
        first_key: usize,
        last_key: i64,
        key_step: usize,
    ) -> Arc<CommandSpec> {
        self.insert(name, categories, first_key, last_key, key_step, false)
    }

    fn insert(
        &self,
        name: &str,
        categories: &[Category],
        first_key: usize,
        last_key: i64,
        key_step: usize,
        is_auth: bool,
    ) -> Arc<CommandSpec> {
        let name = name.to_ascii_lowercase();
        let spec = Arc::new(CommandSpec {
            id: self.ids.id_of(&name),
            name: name.clone(),
            categories: categories.to_vec(),
            first_key,
            last_key,
            key_step,
            is_auth,
        });
        self.by_name.insert(name, Arc::clone(&spec));
        self.by_id.insert(spec.id, Arc::clone(&spec));
        spec
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<CommandSpec>> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|s| Arc::clone(&s))
    }

    pub fn by_id(&self, id: u32) -> Option<Arc<CommandSpec>> {
        self.by_id.get(&id).map(|s| Arc::clone(&s))
    }

    pub fn ids(&self) -> &CommandIdRegistry {
        &self.ids
    }

    /// Descriptors carrying `category`, in ID order.
    pub fn in_category(&self, category: Category) -> Vec<Arc<CommandSpec>> {
        let mut specs: Vec<Arc<CommandSpec>> = self
            .by_id
            .iter()
            .filter(|entry| entry.value().has_category(category))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        specs.sort_by_key(|s| s.id);
        specs
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
