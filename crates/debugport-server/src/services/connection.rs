// ============================================
// File: crates/debugport-server/src/services/connection.rs
// ============================================
//! # Client Connection
//!
//! ## Creation Reason
//! Every accepted socket needs a shared record that the pool, the
//! dispatcher, and the facade can all reach while the session task
//! owns the socket itself. This module provides that record.
//!
//! ## Main Functionality
//! - Connection lifecycle state machine (Connecting -> Authenticated -> Disconnected)
//! - Activity tracking for idle eviction
//! - Traffic counters and a bounded response-time sample window
//! - Outbound message queue handle (the session task is the only writer)
//! - Idempotent close via a cancellation token
//!
//! ## State Machine
//!
//! ```text
//!   Connecting ──auth ok──> Authenticated ──close──> Disconnected
//!       │                        │
//!       └──auth disabled──> Connected ────────────> Disconnected
//!       └──protocol fault──────────────────────────> Error
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! `close()` only cancels the session token and flips the state; it
//! does NOT remove the record from the pool. The session task does
//! that on its way out, so removal happens exactly once regardless of
//! who initiated the close (sweeper, facade, or the peer).
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use debugport_common::time::AtomicInstant;
use debugport_common::ClientId;

/// Number of recent command durations kept per connection for the
/// average response time reported in [`ClientInfo`].
const RESPONSE_SAMPLE_WINDOW: usize = 64;

/// Lifecycle state of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Socket accepted, handshake not yet complete.
    Connecting,
    /// Connected with authentication disabled.
    Connected,
    /// Handshake completed successfully.
    Authenticated,
    /// Session ended normally.
    Disconnected,
    /// Session ended due to a protocol or I/O fault.
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Byte and command counters, updated by the session task and the
/// dispatcher, read by snapshots.
#[derive(Debug, Default)]
pub struct TrafficStats {
    bytes_rx: AtomicU64,
    bytes_tx: AtomicU64,
    commands_executed: AtomicU64,
}

impl TrafficStats {
    /// Adds received bytes.
    pub fn record_rx(&self, bytes: usize) {
        self.bytes_rx.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Adds sent bytes.
    pub fn record_tx(&self, bytes: usize) {
        self.bytes_tx.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Increments the dispatched-command counter.
    pub fn record_command(&self) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Total bytes received.
    #[must_use]
    pub fn bytes_rx(&self) -> u64 {
        self.bytes_rx.load(Ordering::Relaxed)
    }

    /// Total bytes sent.
    #[must_use]
    pub fn bytes_tx(&self) -> u64 {
        self.bytes_tx.load(Ordering::Relaxed)
    }

    /// Commands dispatched on this connection.
    #[must_use]
    pub fn commands_executed(&self) -> u64 {
        self.commands_executed.load(Ordering::Relaxed)
    }
}

/// Point-in-time snapshot of a connection, safe to serialize and hand
/// to operators without exposing the live record.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    /// Hex client identifier.
    pub id: ClientId,
    /// Remote peer address.
    pub peer_addr: String,
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Whether the handshake has completed.
    pub authenticated: bool,
    /// Seconds since the socket was accepted.
    pub connected_secs: u64,
    /// Seconds since the last inbound activity.
    pub idle_secs: u64,
    /// Total bytes received from the peer.
    pub bytes_rx: u64,
    /// Total bytes sent to the peer.
    pub bytes_tx: u64,
    /// Commands dispatched on this connection.
    pub commands_executed: u64,
    /// Mean command processing time over the recent sample window, in
    /// milliseconds. `None` until the first command completes.
    pub avg_response_ms: Option<f64>,
}

/// Shared record for one client session.
///
/// The session task owns the socket; everyone else interacts through
/// this record (outbound queue, counters, cancellation).
pub struct ClientConnection {
    /// Unique identifier assigned at accept time.
    pub id: ClientId,
    /// Remote peer address.
    pub peer_addr: SocketAddr,
    /// Traffic counters.
    pub stats: TrafficStats,
    /// Last inbound activity, used for idle eviction.
    pub last_activity: AtomicInstant,
    state: RwLock<ConnectionState>,
    authenticated: AtomicBool,
    created_at: Instant,
    response_times: Mutex<VecDeque<Duration>>,
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl ClientConnection {
    /// Creates a connection record in the given initial state.
    #[must_use]
    pub fn new(
        id: ClientId,
        peer_addr: SocketAddr,
        outbound: mpsc::Sender<String>,
        cancel: CancellationToken,
        initial_state: ConnectionState,
    ) -> Self {
        Self {
            id,
            peer_addr,
            stats: TrafficStats::default(),
            last_activity: AtomicInstant::now(),
            state: RwLock::new(initial_state),
            authenticated: AtomicBool::new(false),
            created_at: Instant::now(),
            response_times: Mutex::new(VecDeque::with_capacity(RESPONSE_SAMPLE_WINDOW)),
            outbound,
            cancel,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Forces a lifecycle state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    /// Whether the handshake has completed on this connection.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Relaxed)
    }

    /// Marks the handshake complete and advances the state machine.
    pub fn mark_authenticated(&self) {
        self.authenticated.store(true, Ordering::Relaxed);
        self.set_state(ConnectionState::Authenticated);
    }

    /// Records inbound activity for idle tracking.
    pub fn touch(&self) {
        self.last_activity.touch();
    }

    /// Time since the last inbound activity.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Whether the connection has been idle longer than `timeout`.
    #[must_use]
    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_activity.has_elapsed(timeout)
    }

    /// Records a command processing duration in the bounded sample
    /// window.
    pub fn record_response_time(&self, elapsed: Duration) {
        let mut samples = self.response_times.lock();
        if samples.len() == RESPONSE_SAMPLE_WINDOW {
            samples.pop_front();
        }
        samples.push_back(elapsed);
    }

    /// Mean command processing time over the sample window.
    #[must_use]
    pub fn avg_response_time(&self) -> Option<Duration> {
        let samples = self.response_times.lock();
        if samples.is_empty() {
            return None;
        }
        let total: Duration = samples.iter().sum();
        Some(total / samples.len() as u32)
    }

    /// Queues a line for delivery to the peer.
    ///
    /// Returns `false` when the queue is full or the session task has
    /// exited; broadcast delivery is best-effort and never blocks.
    pub fn send(&self, line: String) -> bool {
        match self.outbound.try_send(line) {
            Ok(()) => true,
            Err(e) => {
                debug!(client_id = %self.id, error = %e, "Outbound queue rejected message");
                false
            }
        }
    }

    /// Requests session shutdown. Safe to call more than once.
    pub fn close(&self) {
        self.cancel.cancel();
        let mut state = self.state.write();
        if *state != ConnectionState::Error {
            *state = ConnectionState::Disconnected;
        }
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token the session task selects on for shutdown.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Builds a point-in-time snapshot for operator queries.
    #[must_use]
    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id,
            peer_addr: self.peer_addr.to_string(),
            state: self.state(),
            authenticated: self.is_authenticated(),
            connected_secs: self.created_at.elapsed().as_secs(),
            idle_secs: self.idle_time().as_secs(),
            bytes_rx: self.stats.bytes_rx(),
            bytes_tx: self.stats.bytes_tx(),
            commands_executed: self.stats.commands_executed(),
            avg_response_ms: self
                .avg_response_time()
                .map(|d| d.as_secs_f64() * 1000.0),
        }
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}
