// ============================================
// File: crates/debugport-server/src/lib.rs
// ============================================
//! # Debugport Server Library
//!
//! ## Creation Reason
//! Provides the embeddable remote-debug server: a TCP (optionally
//! TLS) listener speaking newline-delimited JSON, with token auth, a
//! bounded connection pool, and a pluggable command dispatcher.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: Server configuration management
//! - [`server`]: Server facade (start/stop/broadcast/inspect)
//! - [`listener`]: Accept loop and per-connection session loop
//! - [`services`]: Business logic services
//!   - [`services::pool`]: Bounded connection pool with idle sweeping
//!   - [`services::dispatcher`]: Command registry and dispatch
//!   - [`services::builtin`]: Baseline command set
//! - [`tls`]: TLS acceptor construction
//! - [`events`]: Lifecycle and connection events
//! - [`error`]: Server-specific error types
//!
//! ## Architecture Overview
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Debugport Server                      │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌──────────┐      ┌──────────┐      ┌───────────────┐  │
//! │  │  Config  │─────►│  Server  │─────►│ Accept Loop   │  │
//! │  │  Loader  │      │  Facade  │      │ (TCP / TLS)   │  │
//! │  └──────────┘      └────┬─────┘      └──────┬────────┘  │
//! │                         │                   │           │
//! │        ┌────────────────┼─────────────┐     ▼           │
//! │        ▼                ▼             ▼  session tasks  │
//! │  ┌──────────┐     ┌──────────┐  ┌──────────┐            │
//! │  │ Conn     │     │ Command  │  │ Idle     │            │
//! │  │ Pool     │     │ Dispatch │  │ Sweeper  │            │
//! │  └──────────┘     └──────────┘  └──────────┘            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```no_run
//! use std::sync::Arc;
//! use debugport_server::{Server, ServerConfig};
//! use debugport_server::services::dispatcher::HandlerError;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let server = Server::new(ServerConfig::default());
//! server.registry().register(
//!     "version",
//!     "application version",
//!     Arc::new(|_: &[String]| -> Result<String, HandlerError> {
//!         Ok(env!("CARGO_PKG_VERSION").to_string())
//!     }),
//! );
//! server.start().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Configuration changes require restart (no hot-reload)
//! - The facade is `Arc`-friendly: all control methods take `&self`
//! - Per-connection faults never terminate the process; only
//!   `start()` failures are surfaced to the operator
//!
//! ## Last Modified
//! v0.1.0 - Initial server library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod events;
mod listener;
pub mod server;
pub mod services;
pub mod tls;

// Re-export primary types
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use events::{PerformanceStats, ServerEvent, ServerState};
pub use server::Server;
pub use services::connection::ClientInfo;
