// ============================================
// File: crates/debugport-server/src/server.rs
// ============================================
//! # Server Facade
//!
//! ## Creation Reason
//! Embedding applications need one object that owns the listener, the
//! pool, the dispatcher, and the background tasks, with a small
//! control surface: start, stop, broadcast, disconnect, inspect.
//!
//! ## Main Functionality
//! - `start()`/`stop()`: lifecycle with bounded, idempotent teardown
//! - `broadcast()`: best-effort delivery to every pooled client
//! - `disconnect_client()`: administrative close by id
//! - `get_all_clients()`/`get_performance_stats()`: snapshots
//! - `subscribe()`: lifecycle and connection events
//!
//! ## Architecture
//!
//! ```text
//!              ┌───────────────┐
//!   start() ──>│    Server     │──> accept task ──> session tasks
//!              │   (facade)    │──> sweeper task
//!              └──────┬────────┘
//!                     │ shares
//!        ┌────────────┼──────────────┐
//!        ▼            ▼              ▼
//!  ConnectionPool  Dispatcher  CommandRegistry
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! `stop()` must stay safe to call twice and safe to call on a server
//! that never started. The `running` flag is the single guard; all
//! teardown happens behind its swap.
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use debugport_common::{AuthToken, ClientId};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::events::{PerformanceStats, ServerEvent, ServerState};
use crate::listener::{run_accept_loop, ListenerContext};
use crate::services::builtin::{register_builtins, BuiltinContext};
use crate::services::connection::ClientInfo;
use crate::services::dispatcher::{CommandRegistry, Dispatcher};
use crate::services::pool::ConnectionPool;
use crate::tls;

/// Capacity of the event broadcast channel; slow subscribers lag
/// rather than block the server.
const EVENT_CHANNEL_DEPTH: usize = 64;

/// Remote debug server facade.
///
/// Construct with [`Server::new`], register application commands on
/// [`Server::registry`], then [`Server::start`].
pub struct Server {
    config: Arc<ServerConfig>,
    pool: Arc<ConnectionPool>,
    registry: Arc<CommandRegistry>,
    dispatcher: Arc<Dispatcher>,
    token: AuthToken,
    token_generated: bool,
    state: Mutex<ServerState>,
    running: AtomicBool,
    shutdown: Mutex<CancellationToken>,
    events: broadcast::Sender<ServerEvent>,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    local_addr: Mutex<Option<SocketAddr>>,
    started_at: Mutex<Option<Instant>>,
}

impl Server {
    /// Builds a server from configuration. Does not bind anything
    /// until [`Server::start`].
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let config = Arc::new(config);
        let pool = Arc::new(ConnectionPool::new(config.limits.max_clients));
        let registry = Arc::new(CommandRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            config.dispatch.worker_pool_size,
            config.cache_ttl(),
            config.dispatch.cache_capacity,
            config.auth.required,
        ));

        let (token, token_generated) = match &config.auth.token {
            Some(fixed) => (AuthToken::new(fixed.clone()), false),
            None => (AuthToken::generate(), true),
        };

        register_builtins(
            &registry,
            BuiltinContext {
                pool: Arc::clone(&pool),
                stats: dispatcher.stats(),
                started_at: Instant::now(),
            },
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_DEPTH);

        Self {
            config,
            pool,
            registry,
            dispatcher,
            token,
            token_generated,
            state: Mutex::new(ServerState::Stopped),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(CancellationToken::new()),
            events,
            tasks: Mutex::new(Vec::new()),
            local_addr: Mutex::new(None),
            started_at: Mutex::new(None),
        }
    }

    /// Command registry for application handlers.
    #[must_use]
    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// The token clients must present. Generated per instance unless
    /// fixed in configuration; retrieve it here, never from logs.
    #[must_use]
    pub fn auth_token(&self) -> &AuthToken {
        &self.token
    }

    /// Whether the token was generated rather than configured.
    #[must_use]
    pub fn auth_token_generated(&self) -> bool {
        self.token_generated
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    /// Address actually bound, available once running. With port 0 in
    /// the configuration this is the ephemeral port the OS picked.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Subscribes to lifecycle and connection events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    fn set_state(&self, state: ServerState) {
        *self.state.lock() = state;
        let _ = self.events.send(ServerEvent::StateChanged(state));
    }

    /// Binds the listener and spawns the accept and sweeper tasks.
    ///
    /// # Errors
    /// Fails when already running, when the bind address is taken, or
    /// when TLS material cannot be loaded. All failures leave the
    /// server stopped and startable again.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }
        self.set_state(ServerState::Starting);

        let outcome = self.start_inner().await;
        if let Err(e) = &outcome {
            warn!(error = %e, "Server startup failed");
            self.running.store(false, Ordering::SeqCst);
            self.set_state(ServerState::Stopped);
        }
        outcome
    }

    async fn start_inner(&self) -> Result<()> {
        let tls_acceptor = tls::build_acceptor(&self.config.tls)?;

        let bind_addr = self.config.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            ServerError::startup_failed(format!("cannot bind {bind_addr}: {e}"))
        })?;
        let local_addr = listener.local_addr().map_err(|e| {
            ServerError::startup_failed(format!("cannot read bound address: {e}"))
        })?;
        *self.local_addr.lock() = Some(local_addr);

        let shutdown = CancellationToken::new();
        *self.shutdown.lock() = shutdown.clone();

        let ctx = Arc::new(ListenerContext {
            config: Arc::clone(&self.config),
            pool: Arc::clone(&self.pool),
            dispatcher: Arc::clone(&self.dispatcher),
            token: self.token.clone(),
            events: self.events.clone(),
            shutdown: shutdown.clone(),
        });

        let accept_task = tokio::spawn(run_accept_loop(listener, tls_acceptor, ctx));
        let sweeper_task = tokio::spawn(run_sweeper(
            Arc::clone(&self.pool),
            self.config.idle_timeout(),
            self.config.sweep_interval(),
            shutdown,
        ));

        {
            let mut tasks = self.tasks.lock();
            tasks.push(("accept", accept_task));
            tasks.push(("sweeper", sweeper_task));
        }

        *self.started_at.lock() = Some(Instant::now());
        self.set_state(ServerState::Running);
        info!(
            addr = %local_addr,
            tls = self.config.tls.enabled,
            auth = self.config.auth.required,
            max_clients = self.config.limits.max_clients,
            "Server started"
        );
        Ok(())
    }

    /// Stops the server: closes every client, cancels the background
    /// tasks, and waits a bounded grace period for them to finish.
    ///
    /// Idempotent; calling it on a stopped (or never started) server
    /// is a no-op.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.set_state(ServerState::Stopping);
        info!("Server stopping");

        self.shutdown.lock().cancel();
        self.pool.clear();

        let tasks: Vec<(&'static str, JoinHandle<()>)> =
            std::mem::take(&mut *self.tasks.lock());
        let grace = self.config.shutdown_grace();
        for (name, handle) in tasks {
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(task = name, error = %e, "Background task ended abnormally"),
                Err(_) => warn!(task = name, "Background task did not stop within grace period"),
            }
        }

        *self.local_addr.lock() = None;
        *self.started_at.lock() = None;
        self.set_state(ServerState::Stopped);
        info!("Server stopped");
    }

    /// Queues `message` to every pooled client. Best-effort: clients
    /// with a full outbound queue are skipped. Returns the number of
    /// clients the message was queued for.
    pub fn broadcast(&self, message: &str) -> usize {
        let mut delivered = 0;
        for conn in self.pool.all() {
            if conn.send(message.to_string()) {
                delivered += 1;
            }
        }
        info!(delivered, clients = self.pool.len(), "Broadcast queued");
        delivered
    }

    /// Administratively closes one client.
    ///
    /// # Errors
    /// Returns [`ServerError::ClientNotFound`] when the id is not in
    /// the pool.
    pub fn disconnect_client(&self, id: &ClientId) -> Result<()> {
        match self.pool.get(id) {
            Some(conn) => {
                info!(client_id = %id, "Disconnecting client by request");
                conn.close();
                Ok(())
            }
            None => Err(ServerError::ClientNotFound(*id)),
        }
    }

    /// Snapshots of every pooled client.
    #[must_use]
    pub fn get_all_clients(&self) -> Vec<ClientInfo> {
        self.pool.all().iter().map(|conn| conn.info()).collect()
    }

    /// Aggregate dispatch and connection counters.
    #[must_use]
    pub fn get_performance_stats(&self) -> PerformanceStats {
        let snapshot = self.dispatcher.stats().snapshot();
        PerformanceStats {
            messages_processed: snapshot.messages_processed,
            errors: snapshot.errors,
            cache_hits: snapshot.cache_hits,
            avg_processing_us: snapshot.avg_processing_us,
            active_clients: self.pool.len(),
            uptime_secs: self
                .started_at
                .lock()
                .map_or(0, |t| t.elapsed().as_secs()),
        }
    }
}

/// Periodically evicts idle connections until shutdown.
async fn run_sweeper(
    pool: Arc<ConnectionPool>,
    idle_timeout: std::time::Duration,
    sweep_interval: std::time::Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(sweep_interval);
    // The first tick fires immediately; skip it so a fresh server
    // does not sweep before anyone can connect.
    ticker.tick().await;
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                pool.sweep(idle_timeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.network.port = 0;
        config.auth.required = false;
        config
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let server = Server::new(test_config());
        assert_eq!(server.state(), ServerState::Stopped);

        server.start().await.unwrap();
        assert_eq!(server.state(), ServerState::Running);
        assert!(server.local_addr().is_some());

        server.stop().await;
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let server = Server::new(test_config());
        server.start().await.unwrap();
        assert!(matches!(
            server.start().await,
            Err(ServerError::AlreadyRunning)
        ));
        server.stop().await;
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let server = Server::new(test_config());
        server.stop().await;
        server.stop().await;
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let server = Server::new(test_config());
        server.start().await.unwrap();
        server.stop().await;
        server.start().await.unwrap();
        assert_eq!(server.state(), ServerState::Running);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_bind_conflict_reports_actionable_error() {
        let first = Server::new(test_config());
        first.start().await.unwrap();
        let addr = first.local_addr().unwrap();

        let mut config = test_config();
        config.network.port = addr.port();
        let second = Server::new(config);
        let err = second.start().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("cannot bind"));
        // A failed start leaves the server startable.
        assert_eq!(second.state(), ServerState::Stopped);

        first.stop().await;
    }

    #[tokio::test]
    async fn test_token_generated_when_unset() {
        let server = Server::new(test_config());
        assert!(server.auth_token_generated());
        assert!(!server.auth_token().expose().is_empty());

        let mut config = test_config();
        config.auth.token = Some("secret123".to_string());
        let fixed = Server::new(config);
        assert!(!fixed.auth_token_generated());
        assert_eq!(fixed.auth_token().expose(), "secret123");
    }

    #[tokio::test]
    async fn test_disconnect_unknown_client() {
        let server = Server::new(test_config());
        let err = server.disconnect_client(&ClientId::generate()).unwrap_err();
        assert!(matches!(err, ServerError::ClientNotFound(_)));
    }

    #[tokio::test]
    async fn test_stats_empty_server() {
        let server = Server::new(test_config());
        let stats = server.get_performance_stats();
        assert_eq!(stats.messages_processed, 0);
        assert_eq!(stats.active_clients, 0);
        assert_eq!(stats.uptime_secs, 0);
        assert!(server.get_all_clients().is_empty());
    }

    #[tokio::test]
    async fn test_state_change_events() {
        let server = Server::new(test_config());
        let mut events = server.subscribe();

        server.start().await.unwrap();
        server.stop().await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ServerEvent::StateChanged(state) = event {
                seen.push(state);
            }
        }
        assert_eq!(
            seen,
            vec![
                ServerState::Starting,
                ServerState::Running,
                ServerState::Stopping,
                ServerState::Stopped,
            ]
        );
    }
}
