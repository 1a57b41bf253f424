// ============================================
// File: crates/debugport-server/src/events.rs
// ============================================
//! # Server Events
//!
//! Lifecycle and connection events published on a broadcast channel so
//! embedding applications can observe the server without polling.

use std::net::SocketAddr;

use serde::Serialize;

use debugport_common::ClientId;

/// Coarse server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// Not started, or fully stopped.
    Stopped,
    /// `start()` in progress.
    Starting,
    /// Accepting connections.
    Running,
    /// `stop()` in progress.
    Stopping,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Event published to facade subscribers.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Lifecycle state changed.
    StateChanged(ServerState),
    /// A client was admitted to the pool.
    ClientConnected {
        /// Assigned client id.
        id: ClientId,
        /// Remote peer address.
        addr: SocketAddr,
    },
    /// A client left the pool.
    ClientDisconnected {
        /// Departed client id.
        id: ClientId,
    },
}

/// Aggregate performance counters returned by the facade.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    /// Total frames that produced a response.
    pub messages_processed: u64,
    /// Malformed frames, rejected commands, and handler failures.
    pub errors: u64,
    /// Responses served from the TTL cache.
    pub cache_hits: u64,
    /// Mean processing time per message, in microseconds.
    pub avg_processing_us: u64,
    /// Currently pooled clients.
    pub active_clients: usize,
    /// Seconds since `start()` completed, zero when stopped.
    pub uptime_secs: u64,
}
