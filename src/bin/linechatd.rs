//! linechat daemon - line-oriented chat server
//!
//! This binary accepts TCP (optionally TLS) connections, authenticates each
//! client and relays chat lines, roster updates and file attachments
//! between logged-in users.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! linechatd start
//!
//! # Start with a config file and a different listen address
//! linechatd start --config linechat.toml --listen 127.0.0.1:4000
//!
//! # Start the daemon (background/daemonized)
//! linechatd start -d
//!
//! # Stop the daemon
//! linechatd stop
//!
//! # Check daemon status
//! linechatd status
//! ```

use std::env;
use std::fs::{self, File};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use linechatd::config::Config;
use linechatd::registry::spawn_registry;
use linechatd::server::ChatServer;

/// Environment variable overriding the listen address
const LISTEN_ENV: &str = "LINECHAT_LISTEN";

/// How long `stop` waits for the daemon to exit
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// linechat daemon - authenticated line-oriented chat server
#[derive(Parser, Debug)]
#[command(name = "linechatd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Path to a TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to listen on (overrides config and LINECHAT_LISTEN)
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

/// Where the daemon keeps its PID and log files.
struct StateDir {
    root: PathBuf,
}

impl StateDir {
    fn resolve() -> Self {
        let root = dirs::state_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("linechat");
        Self { root }
    }

    fn pid_file(&self) -> PidFile {
        PidFile::new(self.root.join("linechatd.pid"))
    }

    fn log_path(&self) -> PathBuf {
        self.root.join("linechatd.log")
    }
}

/// PID file guarding against two daemons sharing one state directory.
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns the recorded PID; a missing or garbled file reads as `None`.
    fn read(&self) -> io::Result<Option<u32>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents.trim().parse().ok()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_current(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create state directory")?;
        }
        fs::write(&self.path, process::id().to_string())
            .with_context(|| format!("Failed to write PID file {}", self.path.display()))
    }

    /// Deletes the file. Already gone counts as success.
    fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// PID of a live daemon, clearing the file when it names a dead process.
    fn running_pid(&self) -> Option<u32> {
        let pid = match self.read() {
            Ok(Some(pid)) => pid,
            Ok(None) => return None,
            Err(e) => {
                eprintln!("Cannot read {}: {e}", self.path.display());
                return None;
            }
        };
        if process_alive(pid) {
            return Some(pid);
        }
        if let Err(e) = self.remove() {
            eprintln!("Cannot remove stale {}: {e}", self.path.display());
        }
        None
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    // Zero and negative values address process groups, not a process
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    false
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let pid = libc::pid_t::try_from(pid).context("PID out of range")?;
        if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
            bail!(
                "Failed to send SIGTERM to process {pid}: {}",
                io::Error::last_os_error()
            );
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        bail!("Cannot stop process {pid}: stop is only supported on Unix systems");
    }
}

/// Polls until the process is gone or `limit` elapses.
fn wait_for_exit(pid: u32, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if !process_alive(pid) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    !process_alive(pid)
}

/// Loads the config file (if any) and applies the overrides.
///
/// Precedence: `--listen`, then `LINECHAT_LISTEN`, then the file, then the
/// built-in default.
fn load_config(path: Option<PathBuf>, listen: Option<SocketAddr>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Ok(raw) = env::var(LISTEN_ENV) {
        config.server.listen = raw
            .parse()
            .with_context(|| format!("Invalid {LISTEN_ENV} address: {raw}"))?;
    }

    if let Some(addr) = listen {
        config.server.listen = addr;
    }

    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        config: None,
        listen: None,
    });

    let state = StateDir::resolve();
    let pid_file = state.pid_file();

    match command {
        Command::Start {
            daemon,
            config,
            listen,
        } => {
            if let Some(pid) = pid_file.running_pid() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'linechatd stop' to stop it first.");
                process::exit(1);
            }

            // Fail on a bad config before forking
            let config = load_config(config, listen)?;

            if daemon {
                daemonize(&state.log_path())?;
            }

            pid_file.write_current()?;
            let result = run_daemon(config);
            if let Err(e) = pid_file.remove() {
                warn!(path = %pid_file.path.display(), error = %e, "Failed to remove PID file");
            }
            result
        }
        Command::Stop => {
            let Some(pid) = pid_file.running_pid() else {
                println!("Daemon is not running.");
                return Ok(());
            };

            println!("Stopping daemon (PID {pid})...");
            stop_daemon(pid)?;
            if wait_for_exit(pid, STOP_TIMEOUT) {
                println!("Daemon stopped.");
                Ok(())
            } else {
                eprintln!(
                    "Daemon did not stop within {} seconds.",
                    STOP_TIMEOUT.as_secs()
                );
                process::exit(1);
            }
        }
        Command::Status => match pid_file.running_pid() {
            Some(pid) => {
                println!("Daemon is running (PID {pid})");
                println!("Log: {}", state.log_path().display());
                Ok(())
            }
            None => {
                println!("Daemon is not running.");
                process::exit(1);
            }
        },
    }
}

fn daemonize(log_path: &Path) -> Result<()> {
    use daemonize::Daemonize;

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("linechatd=info".parse()?)
                .add_directive("linechat_core=info".parse()?)
                .add_directive("linechat_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "linechat daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry(config.server.max_sessions);
    info!(max_sessions = config.server.max_sessions, "Session registry started");

    let store = Arc::new(config.seeded_store());
    info!(accounts = store.account_count().await, "Account store ready");

    let server = match ChatServer::bind(&config, registry, store, cancel_token).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to start server");
            return Err(e.into());
        }
    };

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("linechat daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
