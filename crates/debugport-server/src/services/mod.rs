// ============================================
// File: crates/debugport-server/src/services/mod.rs
// ============================================
//! # Server Services
//!
//! Business logic services composed by the server facade:
//! - [`connection`]: Per-client connection record
//! - [`pool`]: Bounded connection registry with idle sweeping
//! - [`dispatcher`]: Command registry, dispatch, caching, stats
//! - [`builtin`]: Built-in command handlers (`ping`, `status`, ...)

pub mod builtin;
pub mod connection;
pub mod dispatcher;
pub mod pool;

pub use connection::{ClientConnection, ClientInfo, ConnectionState};
pub use dispatcher::{CommandHandler, CommandRegistry, Dispatcher, DispatcherStats, HandlerError};
pub use pool::ConnectionPool;
