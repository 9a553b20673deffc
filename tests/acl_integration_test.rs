// Integration tests for the ACL subsystem

use bytes::Bytes;
use minikv::commands::acl_cmds;
use minikv::{Acl, AclError, RespSerializer, RespValue, Session, UserFlags};
use std::sync::Arc;
use tempfile::TempDir;

fn args(words: &[&str]) -> Vec<Bytes> {
    words
        .iter()
        .map(|w| Bytes::copy_from_slice(w.as_bytes()))
        .collect()
}

/// Authorize `words` as a command line for the session's current user.
fn authorize(acl: &Acl, session: &Session, words: &[&str]) -> Result<(), AclError> {
    let spec = acl
        .commands()
        .lookup(words[0])
        .expect("command not in table");
    acl.authorize(session.user(), &spec, &args(words))
}

#[tokio::test]
async fn test_default_login_works_empty() {
    let acl = Arc::new(Acl::new());
    let mut session = Session::new(&acl);

    let reply = acl_cmds::auth(&acl, &mut session, args(&[""])).await;
    assert_eq!(reply, RespValue::SimpleString("OK".to_string()));

    let reply = acl_cmds::acl(&acl, &session, args(&["WHOAMI"])).await;
    assert_eq!(reply, RespValue::bulk(b"default".to_vec()));
}

#[tokio::test]
async fn test_new_user_starts_disabled() {
    let acl = Arc::new(Acl::new());
    let mut session = Session::new(&acl);

    let reply = acl_cmds::acl(&acl, &session, args(&["SETUSER", "alice", ">pw1"])).await;
    assert_eq!(reply, RespValue::SimpleString("OK".to_string()));

    let reply = acl_cmds::auth(&acl, &mut session, args(&["alice", "pw1"])).await;
    let msg = reply.as_error().expect("expected an error reply");
    assert!(msg.starts_with("WRONGPASS"));
}

#[tokio::test]
async fn test_enabling_allows_login() {
    let acl = Arc::new(Acl::new());
    let mut session = Session::new(&acl);

    acl_cmds::acl(&acl, &session, args(&["SETUSER", "alice", ">pw1"])).await;
    acl_cmds::acl(&acl, &session, args(&["SETUSER", "alice", "on", "+acl"])).await;

    let reply = acl_cmds::auth(&acl, &mut session, args(&["alice", "pw1"])).await;
    assert_eq!(reply, RespValue::SimpleString("OK".to_string()));

    let reply = acl_cmds::acl(&acl, &session, args(&["WHOAMI"])).await;
    assert_eq!(reply, RespValue::bulk(b"alice".to_vec()));
}

#[tokio::test]
async fn test_password_add_remove() {
    let acl = Arc::new(Acl::new());
    let mut session = Session::new(&acl);

    acl_cmds::acl(&acl, &session, args(&["SETUSER", "alice", "on", ">pw1", ">pw2"])).await;
    assert_eq!(
        acl_cmds::auth(&acl, &mut session, args(&["alice", "pw1"])).await,
        RespValue::SimpleString("OK".to_string())
    );
    assert_eq!(
        acl_cmds::auth(&acl, &mut session, args(&["alice", "pw2"])).await,
        RespValue::SimpleString("OK".to_string())
    );
    let reply = acl_cmds::auth(&acl, &mut session, args(&["alice", "pw3"])).await;
    assert!(reply.as_error().unwrap().starts_with("WRONGPASS"));

    acl_cmds::acl(&acl, &session, args(&["SETUSER", "alice", "<pw1"])).await;
    let reply = acl_cmds::auth(&acl, &mut session, args(&["alice", "pw1"])).await;
    assert!(reply.as_error().unwrap().starts_with("WRONGPASS"));
    assert_eq!(
        acl_cmds::auth(&acl, &mut session, args(&["alice", "pw2"])).await,
        RespValue::SimpleString("OK".to_string())
    );
}

#[tokio::test]
async fn test_no_command_by_default() {
    let acl = Arc::new(Acl::new());
    let mut session = Session::new(&acl);

    acl_cmds::acl(&acl, &session, args(&["SETUSER", "bob", "on", ">pw"])).await;
    acl_cmds::auth(&acl, &mut session, args(&["bob", "pw"])).await;

    let err = authorize(&acl, &session, &["set", "foo", "bar"]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "NOPERM this user has no permissions to run the 'set' command"
    );
}

#[tokio::test]
async fn test_key_scoping() {
    let acl = Arc::new(Acl::new());
    let mut session = Session::new(&acl);

    acl_cmds::acl(
        &acl,
        &session,
        args(&["SETUSER", "bob", "on", ">pw", "allcommands", "~foo:*", "~bar:*"]),
    )
    .await;
    acl_cmds::auth(&acl, &mut session, args(&["bob", "pw"])).await;

    authorize(&acl, &session, &["set", "foo:1", "a"]).unwrap();
    authorize(&acl, &session, &["set", "bar:2", "b"]).unwrap();
    let err = authorize(&acl, &session, &["set", "zap:3", "c"]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "NOPERM this user has no permissions to access one of the keys used as arguments"
    );
}

#[tokio::test]
async fn test_subcommand_allow() {
    let acl = Arc::new(Acl::new());
    let mut session = Session::new(&acl);

    acl_cmds::acl(
        &acl,
        &session,
        args(&["SETUSER", "bob", "on", ">pw", "+debug|sleep"]),
    )
    .await;
    acl_cmds::auth(&acl, &mut session, args(&["bob", "pw"])).await;

    authorize(&acl, &session, &["debug", "SLEEP", "0"]).unwrap();
    let err = authorize(&acl, &session, &["debug", "object", "x"]).unwrap_err();
    assert!(matches!(err, AclError::DeniedCommand(_)));
}

#[tokio::test]
async fn test_live_session_survives_disable_and_delete() {
    let acl = Arc::new(Acl::new());
    let mut session = Session::new(&acl);

    acl_cmds::acl(
        &acl,
        &session,
        args(&["SETUSER", "carol", "on", ">pw", "+get", "~*"]),
    )
    .await;
    acl_cmds::auth(&acl, &mut session, args(&["carol", "pw"])).await;
    authorize(&acl, &session, &["get", "k"]).unwrap();

    // Disabling only affects new authentications.
    acl_cmds::acl(&acl, &session, args(&["SETUSER", "carol", "off"])).await;
    authorize(&acl, &session, &["get", "k"]).unwrap();

    let mut fresh = Session::new(&acl);
    let reply = acl_cmds::auth(&acl, &mut fresh, args(&["carol", "pw"])).await;
    assert!(reply.as_error().unwrap().starts_with("WRONGPASS"));

    // Deleting the user does not break the bound session either.
    acl_cmds::acl(&acl, &session, args(&["DELUSER", "carol"])).await;
    authorize(&acl, &session, &["get", "k"]).unwrap();
}

#[test]
fn test_flag_invariants_after_rule_sequences() {
    let acl = Acl::new();
    let sequences: &[&[&str]] = &[
        &["on", ">pw", "nopass"],
        &["~a:*", "allkeys", "~b:*"],
        &["+get", "allcommands", "-set"],
        &["+debug|sleep", "+debug", "-debug", "+debug|object"],
        &["nopass", ">late"],
        &["allcommands", "reset", "+get"],
    ];

    for (i, rules) in sequences.iter().enumerate() {
        let name = format!("u{}", i);
        let ops: Vec<Bytes> = rules
            .iter()
            .map(|r| Bytes::copy_from_slice(r.as_bytes()))
            .collect();
        acl.set_user(&name, &ops).unwrap();
        let user = acl.lookup_user(&name).unwrap();

        if user.flags.contains(UserFlags::NOPASS) {
            assert!(user.passwords().is_empty(), "rules {:?}", rules);
        }
        if user.flags.contains(UserFlags::ALLKEYS) {
            assert!(user.patterns().is_empty(), "rules {:?}", rules);
        }
        if user.flags.contains(UserFlags::ALLCOMMANDS) {
            assert!(user.allowed_commands().is_all_set(), "rules {:?}", rules);
            assert!(user.allowed_subcommands().is_empty(), "rules {:?}", rules);
        }
        for id in user.allowed_subcommands().keys() {
            assert!(!user.allowed_commands().get(*id), "rules {:?}", rules);
        }
    }
}

#[test]
fn test_rule_idempotence() {
    let acl = Acl::new();
    let once = args(&["on", "+get", "~pat:*", ">pwd"]);
    let twice = args(&["on", "+get", "~pat:*", ">pwd", "+get", "~pat:*", ">pwd"]);

    acl.set_user("once", &once).unwrap();
    acl.set_user("twice", &twice).unwrap();

    let a = acl.lookup_user("once").unwrap();
    let b = acl.lookup_user("twice").unwrap();
    assert_eq!(a.flags, b.flags);
    assert_eq!(a.passwords(), b.passwords());
    assert_eq!(a.patterns(), b.patterns());
    assert_eq!(a.allowed_commands(), b.allowed_commands());
}

#[test]
fn test_wire_error_tokens() {
    let wrongpass = RespSerializer::error(&AclError::BadCredentials.to_string());
    assert_eq!(
        wrongpass,
        b"-WRONGPASS invalid username-password pair\r\n".to_vec()
    );

    let denied = RespSerializer::error(&AclError::DeniedCommand("set".to_string()).to_string());
    assert!(denied.starts_with(b"-NOPERM "));
}

#[tokio::test]
async fn test_acl_list_round_trips() {
    let acl = Arc::new(Acl::new());
    let session = Session::new(&acl);

    acl_cmds::acl(
        &acl,
        &session,
        args(&["SETUSER", "alice", "on", ">pw", "~foo:*", "+get", "+debug|sleep"]),
    )
    .await;

    let reply = acl_cmds::acl(&acl, &session, args(&["LIST"])).await;
    let lines = reply.as_array().unwrap();
    let alice_line = lines
        .iter()
        .filter_map(|l| l.as_bulk_string())
        .map(|l| String::from_utf8_lossy(l).into_owned())
        .find(|l| l.starts_with("user alice "))
        .expect("alice missing from ACL LIST");

    // Feeding the listed rules back through SETUSER rebuilds the same user.
    let tokens: Vec<&str> = alice_line.split_whitespace().skip(2).collect();
    let mut setuser = vec!["SETUSER", "alice2"];
    setuser.extend(&tokens);
    let reply = acl_cmds::acl(&acl, &session, args(&setuser)).await;
    assert_eq!(reply, RespValue::SimpleString("OK".to_string()));

    let alice = acl.lookup_user("alice").unwrap();
    let alice2 = acl.lookup_user("alice2").unwrap();
    assert_eq!(alice.flags, alice2.flags);
    assert_eq!(alice.passwords(), alice2.passwords());
    assert_eq!(alice.patterns(), alice2.patterns());
    assert_eq!(alice.allowed_commands(), alice2.allowed_commands());
    assert_eq!(alice.allowed_subcommands(), alice2.allowed_subcommands());
}

#[test]
fn test_acl_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.acl");

    let acl = Acl::new();
    acl.set_user(
        "alice",
        &args(&["on", ">pw", "~foo:*", "+get", "+debug|sleep"]),
    )
    .unwrap();
    acl.set_user("bob", &args(&["on", "nopass", "allkeys", "allcommands"]))
        .unwrap();
    acl.save_to_file(&path).unwrap();

    let loaded = Acl::from_file(&path).unwrap();
    assert_eq!(loaded.user_count(), 3);

    for name in ["default", "alice", "bob"] {
        let original = acl.lookup_user(name).unwrap();
        let reloaded = loaded.lookup_user(name).unwrap();
        assert_eq!(
            loaded.describe_user(&reloaded),
            acl.describe_user(&original),
            "user {} did not round-trip",
            name
        );
    }

    loaded.authenticate("alice", b"pw").unwrap();
    loaded.authenticate("bob", b"anything").unwrap();
}

#[test]
fn test_acl_load_is_atomic() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.acl");
    std::fs::write(&path, "user alice on >pw\nuser broken on bogus-rule\n").unwrap();

    let acl = Acl::new();
    acl.set_user("keepme", &args(&["on"])).unwrap();
    assert!(acl.load_from_file(&path).is_err());

    // The failed load left the registry untouched.
    assert!(acl.lookup_user("keepme").is_some());
    assert!(acl.lookup_user("alice").is_none());
}

#[tokio::test]
async fn test_acl_load_save_commands() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.acl");
    std::fs::write(&path, "user alice on nopass ~* +@all\n").unwrap();

    let acl = Arc::new(Acl::from_file(&path).unwrap());
    let session = Session::new(&acl);
    assert!(acl.lookup_user("alice").is_some());

    acl_cmds::acl(&acl, &session, args(&["SETUSER", "carl", "on"])).await;
    let reply = acl_cmds::acl(&acl, &session, args(&["SAVE"])).await;
    assert_eq!(reply, RespValue::SimpleString("OK".to_string()));

    acl_cmds::acl(&acl, &session, args(&["DELUSER", "carl"])).await;
    assert!(acl.lookup_user("carl").is_none());

    let reply = acl_cmds::acl(&acl, &session, args(&["LOAD"])).await;
    assert_eq!(reply, RespValue::SimpleString("OK".to_string()));
    assert!(acl.lookup_user("carl").is_some());
}

#[tokio::test]
async fn test_load_without_configured_file_fails() {
    let acl = Arc::new(Acl::new());
    let session = Session::new(&acl);
    let reply = acl_cmds::acl(&acl, &session, args(&["LOAD"])).await;
    assert!(reply.as_error().unwrap().starts_with("ERR "));
}
