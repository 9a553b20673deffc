// ACL and AUTH command handlers

use crate::acl::{Acl, AclError, Category, UserFlags};
use crate::protocol::RespValue;
use crate::server::Session;
use bytes::Bytes;
use std::sync::Arc;

/// ACL <subcommand> [args...]
pub async fn acl(acl: &Arc<Acl>, session: &Session, args: Vec<Bytes>) -> RespValue {
    if args.is_empty() {
        return RespValue::Error("ERR wrong number of arguments for 'acl' command".to_string());
    }

    let subcommand = match std::str::from_utf8(&args[0]) {
        Ok(s) => s.to_uppercase(),
        Err(_) => return RespValue::Error("ERR invalid ACL subcommand".to_string()),
    };

    match subcommand.as_str() {
        "WHOAMI" => acl_whoami(session),
        "LIST" => acl_list(acl),
        "USERS" => acl_users(acl),
        "GETUSER" => acl_getuser(acl, &args[1..]),
        "SETUSER" => acl_setuser(acl, &args[1..]),
        "DELUSER" => acl_deluser(acl, &args[1..]),
        "CAT" => acl_cat(acl, &args[1..]),
        "LOAD" => acl_load(acl),
        "SAVE" => acl_save(acl),
        "HELP" => acl_help(),
        _ => RespValue::Error(format!("ERR unknown ACL subcommand '{}'", subcommand)),
    }
}

/// AUTH [username] password
///
/// With a single argument the `default` user is assumed. On success the
/// session is rebound to the authenticated user.
pub async fn auth(acl: &Arc<Acl>, session: &mut Session, args: Vec<Bytes>) -> RespValue {
    let (username, password) = match args.len() {
        1 => ("default".to_string(), &args[0]),
        2 => match std::str::from_utf8(&args[0]) {
            Ok(name) => (name.to_string(), &args[1]),
            // A name that is not valid UTF-8 names no known user; answer
            // like any other failed pair.
            Err(_) => {
                return RespValue::Error(AclError::NoSuchUser.to_string());
            }
        },
        _ => {
            return RespValue::Error(
                "ERR wrong number of arguments for 'auth' command".to_string(),
            )
        }
    };

    match acl.authenticate(&username, password) {
        Ok(user) => {
            session.bind(user);
            RespValue::SimpleString("OK".to_string())
        }
        // Unknown user and bad password answer identically.
        Err(err) => RespValue::Error(err.to_string()),
    }
}

/// ACL WHOAMI
fn acl_whoami(session: &Session) -> RespValue {
    RespValue::bulk(session.username().as_bytes())
}

/// ACL LIST
fn acl_list(acl: &Arc<Acl>) -> RespValue {
    let mut lines = Vec::new();
    for name in acl.usernames() {
        if let Some(user) = acl.lookup_user(&name) {
            lines.push(RespValue::bulk(acl.describe_user(&user).into_bytes()));
        }
    }
    RespValue::Array(Some(lines))
}

/// ACL USERS
fn acl_users(acl: &Arc<Acl>) -> RespValue {
    let names = acl
        .usernames()
        .into_iter()
        .map(|n| RespValue::bulk(n.into_bytes()))
        .collect();
    RespValue::Array(Some(names))
}

/// ACL GETUSER <username>
fn acl_getuser(acl: &Arc<Acl>, args: &[Bytes]) -> RespValue {
    let [name] = args else {
        return RespValue::Error(
            "ERR wrong number of arguments for 'acl getuser' command".to_string(),
        );
    };
    let Some(name) = as_utf8(name) else {
        return RespValue::Error("ERR invalid username".to_string());
    };
    let Some(user) = acl.lookup_user(name) else {
        return RespValue::Error(format!("ERR {}", AclError::UserNotFound(name.to_string())));
    };

    let enabled = if user.is_enabled() { "on" } else { "off" };
    let mut flags = vec![enabled.to_string()];
    if user.flags.contains(UserFlags::ALLKEYS) {
        flags.push("allkeys".to_string());
    }
    if user.flags.contains(UserFlags::ALLCOMMANDS) {
        flags.push("allcommands".to_string());
    }
    if user.flags.contains(UserFlags::NOPASS) {
        flags.push("nopass".to_string());
    }

    RespValue::Array(Some(vec![
        RespValue::bulk(b"flags".to_vec()),
        RespValue::Array(Some(
            flags
                .into_iter()
                .map(|f| RespValue::bulk(f.into_bytes()))
                .collect(),
        )),
        RespValue::bulk(b"passwords".to_vec()),
        RespValue::Array(Some(
            user.passwords()
                .iter()
                .map(|p| RespValue::bulk(p.to_vec()))
                .collect(),
        )),
        RespValue::bulk(b"patterns".to_vec()),
        RespValue::Array(Some(
            user.patterns()
                .iter()
                .map(|p| RespValue::bulk(p.to_vec()))
                .collect(),
        )),
        RespValue::bulk(b"commands".to_vec()),
        RespValue::Array(Some(
            acl.command_tokens(&user)
                .into_iter()
                .map(|t| RespValue::bulk(t.into_bytes()))
                .collect(),
        )),
    ]))
}

/// ACL SETUSER <username> [rule ...]
fn acl_setuser(acl: &Arc<Acl>, args: &[Bytes]) -> RespValue {
    let Some((name, rules)) = args.split_first() else {
        return RespValue::Error(
            "ERR wrong number of arguments for 'acl setuser' command".to_string(),
        );
    };
    let Some(name) = as_utf8(name) else {
        return RespValue::Error("ERR invalid username".to_string());
    };

    match acl.set_user(name, rules) {
        Ok(()) => RespValue::SimpleString("OK".to_string()),
        Err(err) => RespValue::Error(err.to_string()),
    }
}

/// ACL DELUSER <username> [username ...]
fn acl_deluser(acl: &Arc<Acl>, args: &[Bytes]) -> RespValue {
    if args.is_empty() {
        return RespValue::Error(
            "ERR wrong number of arguments for 'acl deluser' command".to_string(),
        );
    }

    // Refuse the whole call before touching anything.
    if args.iter().any(|a| a.as_ref() == b"default") {
        return RespValue::Error(format!("ERR {}", AclError::ProtectedUser));
    }

    let mut deleted = 0;
    for name in args {
        let Some(name) = as_utf8(name) else { continue };
        if acl.delete_user(name).is_ok() {
            deleted += 1;
        }
    }
    RespValue::Integer(deleted)
}

/// ACL CAT [category]
fn acl_cat(acl: &Arc<Acl>, args: &[Bytes]) -> RespValue {
    match args {
        [] => RespValue::Array(Some(
            Category::ALL_NAMES
                .iter()
                .map(|n| RespValue::bulk(n.as_bytes().to_vec()))
                .collect(),
        )),
        [name] => {
            let category = as_utf8(name).and_then(Category::from_name);
            let Some(category) = category else {
                return RespValue::Error(format!(
                    "ERR Unknown ACL category '{}'",
                    String::from_utf8_lossy(name)
                ));
            };
            RespValue::Array(Some(
                acl.commands()
                    .in_category(category)
                    .into_iter()
                    .map(|spec| RespValue::bulk(spec.name.clone().into_bytes()))
                    .collect(),
            ))
        }
        _ => RespValue::Error("ERR wrong number of arguments for 'acl cat' command".to_string()),
    }
}

/// ACL LOAD
fn acl_load(acl: &Arc<Acl>) -> RespValue {
    match acl.load() {
        Ok(()) => RespValue::SimpleString("OK".to_string()),
        Err(err) => RespValue::Error(format!("ERR {}", err)),
    }
}

/// ACL SAVE
fn acl_save(acl: &Arc<Acl>) -> RespValue {
    match acl.save() {
        Ok(()) => RespValue::SimpleString("OK".to_string()),
        Err(err) => RespValue::Error(format!("ERR {}", err)),
    }
}

/// ACL HELP
fn acl_help() -> RespValue {
    let help = [
        "ACL <subcommand> [<arg> ...]. Subcommands are:",
        "LIST",
        "    List all users and their rules.",
        "USERS",
        "    List all usernames.",
        "GETUSER <username>",
        "    Get the flags, passwords, patterns and commands of a user.",
        "SETUSER <username> [rules ...]",
        "    Create or modify a user with ACL rules.",
        "DELUSER <username> [username ...]",
        "    Delete one or more users.",
        "CAT [category]",
        "    List categories, or the commands inside a category.",
        "WHOAMI",
        "    Return the current username.",
        "LOAD",
        "    Reload users from the configured ACL file.",
        "SAVE",
        "    Save the current users to the configured ACL file.",
        "HELP",
        "    Print this help.",
    ];
    RespValue::Array(Some(
        help.iter()
            .map(|s| RespValue::bulk(s.as_bytes().to_vec()))
            .collect(),
    ))
}

fn as_utf8(arg: &Bytes) -> Option<&str> {
    std::str::from_utf8(arg).ok()
}
