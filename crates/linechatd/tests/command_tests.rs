//! Integration tests for the command interpreter.
//!
//! Every command is exercised over a real connection: replies go to the
//! requester only, malformed arguments get one usage line and keep the
//! connection open, and `/file` is relayed to every member.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

mod common;

use std::sync::Arc;

use common::{strip_timestamp, FaultyStore, TestServer, PASSWORD};
use linechatd::store::ChatStore;

// ============================================================================
// help / quit / unknown
// ============================================================================

#[tokio::test]
async fn test_help_lists_commands() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;

    alice.send("/help").await;

    assert_eq!(alice.recv().await, "Available commands:");
    let mut commands = Vec::new();
    for _ in 0..5 {
        commands.push(alice.recv().await);
    }
    for verb in ["/quit", "/help", "/register", "/history", "/file"] {
        assert!(
            commands.iter().any(|line| line.starts_with(verb)),
            "help is missing {verb}: {commands:?}"
        );
    }
    alice.expect_silence().await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_commands_are_case_insensitive() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;

    alice.send("/QUIT").await;
    assert_eq!(alice.recv().await, "Disconnecting...");
    alice.expect_closed().await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_command_keeps_connection() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;

    alice.send("/dance wildly").await;
    assert_eq!(
        alice.recv().await,
        "Unknown command. Type /help for the list of commands."
    );

    alice.send("after").await;
    assert_eq!(strip_timestamp(&alice.recv().await), "alice: after");

    server.shutdown().await;
}

#[tokio::test]
async fn test_command_replies_are_private() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;
    let mut bob = server.login("bob").await;
    alice.recv_roster().await;

    bob.send("/help").await;
    bob.recv_until(|line| line.starts_with("/file")).await;

    alice.expect_silence().await;

    server.shutdown().await;
}

// ============================================================================
// history
// ============================================================================

#[tokio::test]
async fn test_history_zero_yields_single_line() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;

    alice.send("/history 0").await;
    assert_eq!(alice.recv().await, "No messages in history.");
    alice.expect_silence().await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_history_non_integer_is_usage_error() {
    let store = Arc::new(FaultyStore::healthy());
    let server = TestServer::spawn_faulty(Arc::clone(&store)).await;
    let mut alice = server.login("alice").await;

    alice.send("/history abc").await;
    assert_eq!(alice.recv().await, "Invalid format. Usage: /history [n]");
    alice.expect_silence().await;

    alice.send("/history -1").await;
    assert_eq!(alice.recv().await, "Invalid format. Usage: /history [n]");

    // The store is never asked
    assert_eq!(store.fetches(), 0);

    alice.send("/history").await;
    alice.recv_until(|line| line.starts_with("Last ")).await;
    assert_eq!(store.fetches(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn test_history_zero_skips_store() {
    let store = Arc::new(FaultyStore::healthy());
    let server = TestServer::spawn_faulty(Arc::clone(&store)).await;
    let mut alice = server.login("alice").await;

    alice.send("/history 0").await;
    assert_eq!(alice.recv().await, "No messages in history.");
    assert_eq!(store.fetches(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_history_with_unreachable_store() {
    let store = Arc::new(FaultyStore::unavailable());
    let server = TestServer::spawn_faulty(Arc::clone(&store)).await;
    let mut alice = server.login("alice").await;

    alice.send("/history 5").await;
    assert_eq!(alice.recv().await, "No messages in history.");
    alice.expect_silence().await;
    assert_eq!(store.fetches(), 1);

    // Session is still usable
    alice.send("ping").await;
    assert_eq!(strip_timestamp(&alice.recv().await), "alice: ping");

    server.shutdown().await;
}

#[tokio::test]
async fn test_history_most_recent_first() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;

    for text in ["first", "second", "third"] {
        alice.send(text).await;
        alice.recv().await;
    }

    alice.send("/history 2").await;
    assert_eq!(alice.recv().await, "Last 2 messages:");
    assert_eq!(strip_timestamp(&alice.recv().await), "alice: third");
    assert_eq!(strip_timestamp(&alice.recv().await), "alice: second");
    alice.expect_silence().await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_history_default_includes_server_notices() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;

    alice.send("hi").await;
    alice.recv().await;

    alice.send("/history").await;
    assert_eq!(alice.recv().await, "Last 2 messages:");
    assert_eq!(strip_timestamp(&alice.recv().await), "alice: hi");
    assert_eq!(
        strip_timestamp(&alice.recv().await),
        "Server: alice joined the chat."
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_history_limit_is_clamped() {
    let server = TestServer::spawn_with(|config| config.server.history_max = 2).await;
    let mut alice = server.login("alice").await;

    for text in ["one", "two", "three"] {
        alice.send(text).await;
        alice.recv().await;
    }

    alice.send("/history 100").await;
    assert_eq!(alice.recv().await, "Last 2 messages:");

    server.shutdown().await;
}

// ============================================================================
// register
// ============================================================================

#[tokio::test]
async fn test_register_then_login() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;

    alice.send("/register").await;
    assert_eq!(alice.recv().await, "Enter a username to register:");
    alice.send("zoe").await;
    assert_eq!(alice.recv().await, "Enter a password:");
    alice.send("hunter2").await;
    assert_eq!(
        alice.recv().await,
        "Registration succeeded. You can now log in as zoe."
    );

    // The current session keeps its identity
    alice.send("still alice").await;
    assert_eq!(strip_timestamp(&alice.recv().await), "alice: still alice");

    let mut zoe = server.connect().await;
    zoe.login("zoe", "hunter2").await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_register_existing_username() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;

    alice.send("/register").await;
    alice.recv().await;
    alice.send("bob").await;
    alice.recv().await;
    alice.send("whatever").await;
    assert_eq!(
        alice.recv().await,
        "Registration failed: username bob is already taken."
    );

    // bob's password is unchanged
    assert!(server
        .store
        .validate_credentials("bob", PASSWORD)
        .await
        .unwrap());

    server.shutdown().await;
}

#[tokio::test]
async fn test_register_rejects_blank_values_locally() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;
    let accounts = server.store.account_count().await;

    alice.send("/register").await;
    alice.recv().await;
    alice.send("  ").await;
    assert_eq!(
        alice.recv().await,
        "Invalid username. Registration cancelled."
    );

    alice.send("/register").await;
    alice.recv().await;
    alice.send("yusuf").await;
    alice.recv().await;
    alice.send("").await;
    assert_eq!(
        alice.recv().await,
        "Invalid password. Registration cancelled."
    );

    alice.send("/register").await;
    alice.recv().await;
    alice.send("two words").await;
    assert_eq!(
        alice.recv().await,
        "Invalid username. Registration cancelled."
    );

    assert_eq!(server.store.account_count().await, accounts);

    server.shutdown().await;
}

// ============================================================================
// file
// ============================================================================

#[tokio::test]
async fn test_file_reaches_every_member_unchanged() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;
    let mut bob = server.login("bob").await;
    let mut carol = server.login("carol").await;
    alice.recv_until(|l| l.ends_with("carol joined the chat.")).await;
    alice.recv_roster().await;
    bob.recv_roster().await;

    let payload = "SGVsbG8sIHdvcmxkIQ==";
    alice.send(&format!("/file notes.txt {payload}")).await;

    let expected = format!("alice: /file notes.txt {payload}");
    assert_eq!(alice.recv().await, expected);
    assert_eq!(
        alice.recv().await,
        "File notes.txt received and broadcast."
    );
    assert_eq!(bob.recv().await, expected);
    assert_eq!(carol.recv().await, expected);

    server.shutdown().await;
}

#[tokio::test]
async fn test_file_invalid_base64() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;
    let mut bob = server.login("bob").await;
    alice.recv_roster().await;

    alice.send("/file notes.txt not*base64!").await;
    assert_eq!(alice.recv().await, "Invalid base64 content for notes.txt");

    // Nothing was relayed; the next line bob sees is ordinary chat
    alice.send("after").await;
    assert_eq!(strip_timestamp(&bob.recv().await), "alice: after");

    server.shutdown().await;
}

#[tokio::test]
async fn test_file_missing_arguments() {
    let server = TestServer::spawn().await;
    let mut alice = server.login("alice").await;

    for line in ["/file", "/file notes.txt", "/file notes.txt "] {
        alice.send(line).await;
        assert_eq!(
            alice.recv().await,
            "Invalid format. Usage: /file <filename> <base64>"
        );
    }

    server.shutdown().await;
}
