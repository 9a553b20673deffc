// MiniKV ACL subsystem
// Answers, for every client connection: who is this, and may it run this
// command against these keys.

pub mod acl;
pub mod commands;
pub mod protocol;
pub mod server;

// Re-export commonly used types
pub use acl::{Acl, AclError, AclRule, Category, User, UserFlags};
pub use commands::{CommandSpec, CommandTable};
pub use protocol::{RespSerializer, RespValue};
pub use server::Session;
