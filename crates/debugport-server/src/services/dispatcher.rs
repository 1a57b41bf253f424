// ============================================
// File: crates/debugport-server/src/services/dispatcher.rs
// ============================================
//! # Command Dispatcher
//!
//! ## Creation Reason
//! Inbound frames need a single place that turns a command name into a
//! handler invocation while enforcing authentication, concurrency
//! limits, and caching. The session loop stays a dumb pipe.
//!
//! ## Main Functionality
//! - `CommandRegistry`: named handlers with one-line descriptions
//! - `Dispatcher`: decode, auth gate, cache lookup, priority routing,
//!   handler execution with panic isolation, stats accounting
//! - TTL response cache for read-only commands, capacity bounded
//! - Urgent commands bypass the worker-pool semaphore
//!
//! ## Main Logical Flow
//! 1. Decode the frame into a `CommandRequest`
//! 2. Reject unauthenticated clients unless the command is pre-auth
//! 3. Serve from the response cache when fresh
//! 4. Acquire a worker permit (normal priority only) and run the handler
//! 5. Record timing, update caches and counters, encode the response
//!
//! ## ⚠️ Important Note for Next Developer
//! A handler panic must never take down the session, let alone the
//! server. `run_handler` wraps the call in `catch_unwind`; keep it
//! that way when adding execution paths.
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use debugport_core::protocol::messages::{
    is_pre_auth_allowed, CommandRequest, CommandResponse, MessagePriority,
};

use super::connection::ClientConnection;

/// Commands whose responses may be served from the TTL cache.
///
/// Only read-only commands belong here; anything with side effects or
/// per-client output must always reach its handler.
pub const CACHEABLE_COMMANDS: &[&str] = &["ping", "status", "uptime"];

// ============================================
// Handler trait
// ============================================

/// Error returned by a command handler.
///
/// The message is sent to the client verbatim (prefixed with
/// `Error:`), so handlers should keep it short and actionable.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Creates an error with a client-facing message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A registered command handler.
///
/// Handlers run on the dispatch path and should complete quickly;
/// long-running work belongs in a task the handler spawns.
pub trait CommandHandler: Send + Sync {
    /// Executes the command with the client-supplied arguments.
    fn execute(&self, args: &[String]) -> Result<String, HandlerError>;
}

impl<F> CommandHandler for F
where
    F: Fn(&[String]) -> Result<String, HandlerError> + Send + Sync,
{
    fn execute(&self, args: &[String]) -> Result<String, HandlerError> {
        self(args)
    }
}

// ============================================
// Registry
// ============================================

struct CommandEntry {
    handler: Arc<dyn CommandHandler>,
    description: String,
}

/// Named command handlers with descriptions for `help`.
#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, CommandEntry>>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any existing one of the same name.
    pub fn register(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) {
        let name = name.into();
        debug!(command = %name, "Registered command handler");
        self.commands.write().insert(
            name,
            CommandEntry {
                handler,
                description: description.into(),
            },
        );
    }

    /// Removes a handler by name.
    pub fn unregister(&self, name: &str) -> bool {
        self.commands.write().remove(name).is_some()
    }

    /// Looks up a handler by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.commands.read().get(name).map(|e| Arc::clone(&e.handler))
    }

    /// Whether a handler is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.commands.read().contains_key(name)
    }

    /// Registered command names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Help text: either the description of one command or the full
    /// sorted listing.
    #[must_use]
    pub fn help_text(&self, command: Option<&str>) -> String {
        let commands = self.commands.read();
        match command {
            Some(name) => match commands.get(name) {
                Some(entry) => format!("{name}: {}", entry.description),
                None => format!("Unknown command: {name}"),
            },
            None => {
                let mut names: Vec<&String> = commands.keys().collect();
                names.sort();
                let mut out = String::from("Available commands:");
                for name in names {
                    if let Some(entry) = commands.get(name) {
                        out.push_str(&format!("\n  {name} - {}", entry.description));
                    }
                }
                out
            }
        }
    }
}

// ============================================
// Stats
// ============================================

/// Dispatcher counters, shared with the `status` handler.
#[derive(Debug, Default)]
pub struct DispatcherStats {
    messages_processed: AtomicU64,
    errors: AtomicU64,
    cache_hits: AtomicU64,
    total_processing_us: AtomicU64,
}

/// Serializable snapshot of [`DispatcherStats`].
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherSnapshot {
    /// Total frames that produced a response.
    pub messages_processed: u64,
    /// Malformed frames, rejected commands, and handler failures.
    pub errors: u64,
    /// Responses served from the TTL cache.
    pub cache_hits: u64,
    /// Mean processing time per message, in microseconds.
    pub avg_processing_us: u64,
}

impl DispatcherStats {
    /// Counts one answered frame and its processing time.
    pub fn record_processed(&self, elapsed: Duration) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        self.total_processing_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Counts one error (malformed, rejected, or failed).
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one cache-served response.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> DispatcherSnapshot {
        let processed = self.messages_processed.load(Ordering::Relaxed);
        let total_us = self.total_processing_us.load(Ordering::Relaxed);
        DispatcherSnapshot {
            messages_processed: processed,
            errors: self.errors.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            avg_processing_us: if processed == 0 { 0 } else { total_us / processed },
        }
    }
}

// ============================================
// Response cache
// ============================================

type CacheKey = (String, Vec<String>);

struct CacheSlot {
    payload: String,
    inserted_at: Instant,
}

struct ResponseCache {
    entries: HashMap<CacheKey, CacheSlot>,
    capacity: usize,
}

impl ResponseCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
        }
    }

    fn lookup(&mut self, key: &CacheKey, ttl: Duration) -> Option<String> {
        match self.entries.get(key) {
            Some(slot) if slot.inserted_at.elapsed() < ttl => Some(slot.payload.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert(&mut self, key: CacheKey, payload: String) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            // Evict the oldest entry to stay within capacity.
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, slot)| slot.inserted_at)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key,
            CacheSlot {
                payload,
                inserted_at: Instant::now(),
            },
        );
    }
}

// ============================================
// Dispatcher
// ============================================

/// Routes decoded commands to handlers with auth gating, caching, and
/// bounded concurrency.
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    workers: Arc<Semaphore>,
    cache: Mutex<ResponseCache>,
    cache_ttl: Duration,
    auth_required: bool,
    stats: Arc<DispatcherStats>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        registry: Arc<CommandRegistry>,
        worker_pool_size: usize,
        cache_ttl: Duration,
        cache_capacity: usize,
        auth_required: bool,
    ) -> Self {
        Self {
            registry,
            workers: Arc::new(Semaphore::new(worker_pool_size.max(1))),
            cache: Mutex::new(ResponseCache::new(cache_capacity)),
            cache_ttl,
            auth_required,
            stats: Arc::new(DispatcherStats::default()),
        }
    }

    /// Shared counters, also held by the `status` handler.
    #[must_use]
    pub fn stats(&self) -> Arc<DispatcherStats> {
        Arc::clone(&self.stats)
    }

    /// Processes one decoded frame and returns the encoded response
    /// line to send back.
    ///
    /// Never fails: every malformed or rejected input maps to an
    /// error payload for the client.
    pub async fn dispatch(&self, conn: &ClientConnection, frame: &str) -> String {
        let started = Instant::now();

        let request = match CommandRequest::decode(frame) {
            Ok(request) => request,
            Err(e) => {
                warn!(client_id = %conn.id, error = %e, "Discarding malformed command frame");
                self.stats.record_error();
                return CommandResponse::new("Error: invalid command format").encode();
            }
        };

        if self.auth_required
            && !conn.is_authenticated()
            && !is_pre_auth_allowed(&request.command)
        {
            warn!(
                client_id = %conn.id,
                command = %request.command,
                "Rejected command from unauthenticated client"
            );
            self.stats.record_error();
            return CommandResponse::new("Error: authentication required").encode();
        }

        let cacheable = CACHEABLE_COMMANDS.contains(&request.command.as_str());
        let cache_key: CacheKey = (request.command.clone(), request.args.clone());
        if cacheable {
            if let Some(payload) = self.cache.lock().lookup(&cache_key, self.cache_ttl) {
                self.stats.record_cache_hit();
                self.stats.record_processed(started.elapsed());
                conn.stats.record_command();
                conn.record_response_time(started.elapsed());
                return CommandResponse::new(payload).encode();
            }
        }

        let payload = match request.priority() {
            MessagePriority::Urgent => self.run_handler(&request),
            MessagePriority::Normal => {
                // The semaphore is never closed, so acquire cannot fail
                // in practice; degrade to unbounded execution if it does.
                let _permit = self.workers.acquire().await.ok();
                self.run_handler(&request)
            }
        };

        if let Ok(result) = &payload {
            if cacheable {
                self.cache.lock().insert(cache_key, result.clone());
            }
        }

        let elapsed = started.elapsed();
        self.stats.record_processed(elapsed);
        conn.stats.record_command();
        conn.record_response_time(elapsed);
        conn.touch();

        match payload {
            Ok(result) => CommandResponse::new(result).encode(),
            Err(message) => CommandResponse::new(message).encode(),
        }
    }

    /// Runs the handler for one request, isolating panics.
    ///
    /// `Ok` carries a successful handler result (cache-eligible);
    /// `Err` carries an error payload that must not be cached.
    fn run_handler(&self, request: &CommandRequest) -> Result<String, String> {
        let Some(handler) = self.registry.get(&request.command) else {
            debug!(command = %request.command, "No handler registered");
            return Err(format!("Unknown command: {}", request.command));
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| handler.execute(&request.args)));
        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                warn!(command = %request.command, error = %e, "Command handler failed");
                self.stats.record_error();
                Err(format!("Error: {e}"))
            }
            Err(_) => {
                error!(command = %request.command, "Command handler panicked");
                self.stats.record_error();
                Err("Error: internal handler failure".to_string())
            }
        }
    }
}
