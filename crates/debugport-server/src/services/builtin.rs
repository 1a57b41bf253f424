// ============================================
// File: crates/debugport-server/src/services/builtin.rs
// ============================================
//! # Built-in Commands
//!
//! ## Creation Reason
//! Every deployment gets the same baseline of introspection commands
//! regardless of what the embedding application registers. They live
//! here instead of in the facade so they go through the same registry
//! and dispatch path as application commands.
//!
//! ## Main Functionality
//! - `ping`: liveness probe, replies `pong`
//! - `uptime`: seconds since the server started
//! - `status`: JSON blob with client count, uptime, and dispatch stats
//! - `help`: command listing, or one command's description
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::sync::{Arc, Weak};
use std::time::Instant;

use serde_json::json;

use super::dispatcher::{CommandRegistry, DispatcherStats, HandlerError};
use super::pool::ConnectionPool;

/// Shared state the built-in handlers report on.
pub struct BuiltinContext {
    /// Live connection registry, for client counts.
    pub pool: Arc<ConnectionPool>,
    /// Dispatcher counters, for throughput numbers.
    pub stats: Arc<DispatcherStats>,
    /// Server start time, for uptime.
    pub started_at: Instant,
}

/// Registers the baseline command set on `registry`.
///
/// The `help` handler holds a weak reference back to the registry so
/// registration does not create a reference cycle.
pub fn register_builtins(registry: &Arc<CommandRegistry>, ctx: BuiltinContext) {
    registry.register(
        "ping",
        "liveness probe",
        Arc::new(|_: &[String]| -> Result<String, HandlerError> { Ok("pong".to_string()) }),
    );

    let started_at = ctx.started_at;
    registry.register(
        "uptime",
        "seconds since server start",
        Arc::new(move |_: &[String]| -> Result<String, HandlerError> {
            Ok(started_at.elapsed().as_secs().to_string())
        }),
    );

    let pool = Arc::clone(&ctx.pool);
    let stats = Arc::clone(&ctx.stats);
    registry.register(
        "status",
        "server status summary",
        Arc::new(move |_: &[String]| -> Result<String, HandlerError> {
            let snapshot = stats.snapshot();
            let status = json!({
                "clients": pool.len(),
                "max_clients": pool.capacity(),
                "uptime_secs": started_at.elapsed().as_secs(),
                "messages_processed": snapshot.messages_processed,
                "errors": snapshot.errors,
                "cache_hits": snapshot.cache_hits,
                "avg_processing_us": snapshot.avg_processing_us,
            });
            Ok(status.to_string())
        }),
    );

    let weak: Weak<CommandRegistry> = Arc::downgrade(registry);
    registry.register(
        "help",
        "list commands, or describe one",
        Arc::new(move |args: &[String]| -> Result<String, HandlerError> {
            let Some(registry) = weak.upgrade() else {
                return Err(HandlerError::new("registry unavailable"));
            };
            Ok(registry.help_text(args.first().map(String::as_str)))
        }),
    );
}
