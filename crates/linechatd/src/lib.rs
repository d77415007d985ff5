//! linechat daemon - authenticated line-oriented chat server
//!
//! This crate provides the server core for the linechat daemon:
//! - `server` - TCP/TLS listener, per-connection handler and command interpreter
//! - `registry` - Registry actor for the set of logged-in sessions, plus the
//!   broadcast engine
//! - `store` - Credential and message persistence interface
//! - `config` - TOML configuration
//! - `tls` - Certificate and key loading
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      linechatd daemon                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │   ChatServer    │     │       RegistryActor         │    │
//! │  │ (TCP listener)  │     │  (owns the session set)     │    │
//! │  └────────┬────────┘     └──────────────▲──────────────┘    │
//! │           │                             │                   │
//! │           │ connections                 │ add/remove/       │
//! │           ▼                             │ snapshot          │
//! │  ┌─────────────────┐     ┌──────────────┴──────────────┐    │
//! │  │ConnectionHandler│────▶│      RegistryHandle         │    │
//! │  │  (per client)   │     │   (broadcast to snapshot)   │    │
//! │  └────────┬────────┘     └─────────────────────────────┘    │
//! │           │                                                 │
//! │           ▼                                                 │
//! │  ┌─────────────────┐                                        │
//! │  │    ChatStore    │                                        │
//! │  └─────────────────┘                                        │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod registry;
pub mod server;
pub mod store;
pub mod tls;
