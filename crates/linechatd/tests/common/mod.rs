//! Shared harness for the linechatd integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()`; the panic-free behavior of
//! production code is checked through assertions.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use linechat_core::{HistoryRecord, RosterEntry, Username};
use linechat_protocol::parse_roster;
use linechatd::config::Config;
use linechatd::registry::{spawn_registry, RegistryHandle};
use linechatd::server::{ChatServer, ServerError};
use linechatd::store::{ChatStore, MemoryStore, StoreError};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for any single server line
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to listen when asserting that nothing arrives
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// Password of every seeded account
pub const PASSWORD: &str = "secret";

/// Accounts present in every test store
pub const SEEDED_USERS: &[&str] = &["alice", "bob", "carol", "dave", "erin", "frank"];

// ============================================================================
// Test Server
// ============================================================================

/// Test server context that manages server lifecycle.
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: RegistryHandle,
    pub store: Arc<MemoryStore>,
    cancel_token: CancellationToken,
    task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Spawns a server with default settings on an ephemeral port.
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawns a server after letting the caller adjust the config.
    pub async fn spawn_with(configure: impl FnOnce(&mut Config)) -> Self {
        let store = Arc::new(seeded_store());
        Self::spawn_inner(store.clone(), store, configure).await
    }

    /// Spawns a server backed by a store that misbehaves on purpose.
    pub async fn spawn_faulty(faulty: Arc<FaultyStore>) -> Self {
        let accounts = Arc::clone(&faulty.inner);
        Self::spawn_inner(faulty, accounts, |_| {}).await
    }

    async fn spawn_inner(
        store: Arc<dyn ChatStore>,
        accounts: Arc<MemoryStore>,
        configure: impl FnOnce(&mut Config),
    ) -> Self {
        let mut config = Config::default();
        config.server.listen = SocketAddr::from(([127, 0, 0, 1], 0));
        config.server.shutdown_grace_secs = 2;
        configure(&mut config);

        let registry = spawn_registry(config.server.max_sessions);
        let cancel_token = CancellationToken::new();

        let server = ChatServer::bind(&config, registry.clone(), store, cancel_token.clone())
            .await
            .expect("bind test server");
        let addr = server.local_addr().expect("local addr");

        let task = tokio::spawn(server.run());

        TestServer {
            addr,
            registry,
            store: accounts,
            cancel_token,
            task,
        }
    }

    /// Opens a raw connection.
    pub async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr)
            .await
            .expect("connect to server");
        TestClient::new(stream)
    }

    /// Connects and logs in; the client's own join notice and roster are
    /// consumed.
    pub async fn login(&self, username: &str) -> TestClient {
        let mut client = self.connect().await;
        client.login(username, PASSWORD).await;
        client
            .recv_until(|line| line.ends_with(&format!("{username} joined the chat.")))
            .await;
        client.recv_roster().await;
        client
    }

    /// Waits until the registry holds exactly `n` sessions.
    pub async fn wait_for_members(&self, n: usize) {
        let start = tokio::time::Instant::now();
        while start.elapsed() < RECV_TIMEOUT {
            if self.registry.len().await == n {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "registry never reached {n} members (has {})",
            self.registry.len().await
        );
    }

    /// Cancels the server and waits for `run` to return.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        let result = timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server stopped within timeout")
            .expect("server task did not panic");
        assert!(result.is_ok(), "server returned {result:?}");
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

// ============================================================================
// Test Client
// ============================================================================

/// Line-oriented client connection over plain TCP or TLS.
pub struct TestClient {
    reader: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

impl TestClient {
    pub fn new(stream: TcpStream) -> Self {
        Self::from_stream(stream)
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(Box::new(reader)),
            writer: Box::new(writer),
        }
    }

    /// Sends one line.
    pub async fn send(&mut self, line: &str) {
        self.send_raw(format!("{line}\n").as_bytes()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Receives one line, or `None` at end of stream.
    pub async fn try_recv(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for server line")
            .ok()?;
        if n == 0 {
            return None;
        }
        Some(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Receives one line; panics at end of stream.
    pub async fn recv(&mut self) -> String {
        self.try_recv().await.expect("unexpected end of stream")
    }

    /// Skips lines until one matches.
    pub async fn recv_until(&mut self, matches: impl Fn(&str) -> bool) -> String {
        loop {
            let line = self.recv().await;
            if matches(&line) {
                return line;
            }
        }
    }

    /// Skips lines until a roster line and returns its entries.
    pub async fn recv_roster(&mut self) -> Vec<RosterEntry> {
        let line = self.recv_until(|l| l.starts_with("CLIENT_LIST:")).await;
        parse_roster(&line).expect("well-formed roster")
    }

    /// Asserts the server closes the stream, ignoring any pending lines.
    pub async fn expect_closed(&mut self) {
        while self.try_recv().await.is_some() {}
    }

    /// Asserts nothing arrives for a short while.
    pub async fn expect_silence(&mut self) {
        let mut line = String::new();
        let result = timeout(QUIET_PERIOD, self.reader.read_line(&mut line)).await;
        assert!(result.is_err(), "expected silence, got {line:?}");
    }

    /// Runs the login exchange and checks the success line.
    pub async fn login(&mut self, username: &str, password: &str) {
        assert_eq!(self.recv().await, "Welcome! Please authenticate.");
        assert_eq!(self.recv().await, "Username:");
        self.send(username).await;
        assert_eq!(self.recv().await, "Password:");
        self.send(password).await;
        assert_eq!(
            self.recv().await,
            format!("Authentication succeeded. Welcome {username}!")
        );
    }
}

/// Usernames in a roster, in order.
pub fn roster_names(entries: &[RosterEntry]) -> Vec<String> {
    entries.iter().map(|e| e.username.to_string()).collect()
}

/// Strips the `[yyyy-MM-dd HH:mm] ` prefix from a notice or chat line.
pub fn strip_timestamp(line: &str) -> &str {
    line.split_once("] ").map(|(_, rest)| rest).unwrap_or(line)
}

/// Store holding every seeded account.
pub fn seeded_store() -> MemoryStore {
    MemoryStore::with_accounts(
        SEEDED_USERS
            .iter()
            .map(|name| (Username::parse(name).unwrap(), PASSWORD.to_string())),
    )
}

// ============================================================================
// Faulty Store
// ============================================================================

/// Store whose writes and reads can be made to fail, or to panic.
///
/// Credentials always come from the wrapped [`MemoryStore`].
pub struct FaultyStore {
    pub inner: Arc<MemoryStore>,
    /// `record_message` returns `Unavailable`
    pub fail_records: bool,
    /// `fetch_recent_messages` returns `Unavailable`
    pub fail_fetches: bool,
    /// `record_message` panics for messages by this user
    pub panic_on_record_from: Option<&'static str>,
    fetches: AtomicUsize,
}

impl FaultyStore {
    pub fn healthy() -> Self {
        Self {
            inner: Arc::new(seeded_store()),
            fail_records: false,
            fail_fetches: false,
            panic_on_record_from: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            fail_records: true,
            fail_fetches: true,
            ..Self::healthy()
        }
    }

    pub fn panicking_for(username: &'static str) -> Self {
        Self {
            panic_on_record_from: Some(username),
            ..Self::healthy()
        }
    }

    /// Number of `fetch_recent_messages` calls so far.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatStore for FaultyStore {
    async fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, StoreError> {
        self.inner.validate_credentials(username, password).await
    }

    async fn create_account(&self, username: &Username, password: &str) -> Result<(), StoreError> {
        self.inner.create_account(username, password).await
    }

    async fn record_message(&self, username: &str, text: &str) -> Result<(), StoreError> {
        if self.panic_on_record_from == Some(username) {
            panic!("store crashed recording a message from {username}");
        }
        if self.fail_records {
            return Err(StoreError::Unavailable("database offline".to_string()));
        }
        self.inner.record_message(username, text).await
    }

    async fn fetch_recent_messages(&self, limit: usize) -> Result<Vec<HistoryRecord>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetches {
            return Err(StoreError::Unavailable("database offline".to_string()));
        }
        self.inner.fetch_recent_messages(limit).await
    }
}
