// ============================================
// File: crates/debugport-server/src/services/pool.rs
// ============================================
//! # Connection Pool
//!
//! ## Creation Reason
//! The server enforces a hard cap on concurrent clients and evicts
//! idle ones. Both decisions need a single authoritative registry of
//! live connections.
//!
//! ## Main Functionality
//! - Atomic capacity-checked insertion (`try_add`)
//! - Lookup, removal, and bulk snapshot by client id
//! - Idle sweep: collect expired connections under the lock, close
//!   them after releasing it
//!
//! ## ⚠️ Important Note for Next Developer
//! `try_add` must stay a single locked check-and-insert. Splitting it
//! into `len()` followed by `insert()` lets two racing accepts both
//! pass the capacity check and overfill the pool.
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use debugport_common::ClientId;

use super::connection::ClientConnection;

/// Bounded registry of live client connections.
pub struct ConnectionPool {
    connections: Mutex<HashMap<ClientId, Arc<ClientConnection>>>,
    capacity: usize,
}

impl ConnectionPool {
    /// Creates a pool that admits at most `capacity` connections.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Inserts a connection if the pool has room.
    ///
    /// Returns `false` when the pool is at capacity; the caller is
    /// expected to close the socket without further protocol traffic.
    pub fn try_add(&self, conn: Arc<ClientConnection>) -> bool {
        let mut connections = self.connections.lock();
        if connections.len() >= self.capacity {
            return false;
        }
        connections.insert(conn.id, conn);
        true
    }

    /// Removes and returns a connection by id.
    pub fn remove(&self, id: &ClientId) -> Option<Arc<ClientConnection>> {
        self.connections.lock().remove(id)
    }

    /// Looks up a live connection by id.
    #[must_use]
    pub fn get(&self, id: &ClientId) -> Option<Arc<ClientConnection>> {
        self.connections.lock().get(id).cloned()
    }

    /// Snapshot of all live connections.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.lock().values().cloned().collect()
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Whether the pool has no live connections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Maximum number of concurrent connections.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Removes and closes every connection idle longer than `timeout`.
    ///
    /// Expired entries are collected and removed under the lock, then
    /// closed after it is released so session teardown never runs
    /// inside the pool lock. Returns the number of evicted clients.
    pub fn sweep(&self, timeout: Duration) -> usize {
        let expired: Vec<Arc<ClientConnection>> = {
            let mut connections = self.connections.lock();
            let ids: Vec<ClientId> = connections
                .iter()
                .filter(|(_, conn)| conn.is_idle(timeout))
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| connections.remove(id)).collect()
        };

        for conn in &expired {
            info!(
                client_id = %conn.id,
                idle_secs = conn.idle_time().as_secs(),
                "Evicting idle client"
            );
            conn.close();
        }

        if !expired.is_empty() {
            debug!(evicted = expired.len(), remaining = self.len(), "Idle sweep complete");
        }
        expired.len()
    }

    /// Closes and removes every connection. Used during shutdown.
    pub fn clear(&self) {
        let drained: Vec<Arc<ClientConnection>> = {
            let mut connections = self.connections.lock();
            connections.drain().map(|(_, conn)| conn).collect()
        };
        for conn in drained {
            conn.close();
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::connection::ConnectionState;
    use std::time::Instant;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn test_conn() -> Arc<ClientConnection> {
        let (tx, _rx) = mpsc::channel(4);
        // Receiver is dropped; fine for pool bookkeeping tests.
        Arc::new(ClientConnection::new(
            ClientId::generate(),
            "127.0.0.1:9000".parse().unwrap(),
            tx,
            CancellationToken::new(),
            ConnectionState::Connected,
        ))
    }

    #[test]
    fn test_try_add_respects_capacity() {
        let pool = ConnectionPool::new(2);
        assert!(pool.try_add(test_conn()));
        assert!(pool.try_add(test_conn()));
        assert!(!pool.try_add(test_conn()));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_remove_frees_capacity() {
        let pool = ConnectionPool::new(1);
        let conn = test_conn();
        let id = conn.id;
        assert!(pool.try_add(conn));
        assert!(!pool.try_add(test_conn()));
        assert!(pool.remove(&id).is_some());
        assert!(pool.try_add(test_conn()));
    }

    #[test]
    fn test_get_and_all() {
        let pool = ConnectionPool::new(4);
        let conn = test_conn();
        let id = conn.id;
        pool.try_add(conn);
        assert!(pool.get(&id).is_some());
        assert!(pool.get(&ClientId::generate()).is_none());
        assert_eq!(pool.all().len(), 1);
    }

    #[test]
    fn test_sweep_evicts_only_idle() {
        let pool = ConnectionPool::new(4);
        let idle = test_conn();
        let active = test_conn();
        let active_id = active.id;

        // Backdate the idle connection's last activity.
        idle.last_activity
            .store(Instant::now() - Duration::from_secs(600));
        pool.try_add(idle.clone());
        pool.try_add(active.clone());

        let evicted = pool.sweep(Duration::from_secs(300));
        assert_eq!(evicted, 1);
        assert_eq!(pool.len(), 1);
        assert!(pool.get(&active_id).is_some());
        assert!(idle.is_closed());
        assert!(!active.is_closed());
    }

    #[test]
    fn test_sweep_empty_pool() {
        let pool = ConnectionPool::new(4);
        assert_eq!(pool.sweep(Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_concurrent_add_remove_respects_capacity() {
        let pool = Arc::new(ConnectionPool::new(8));
        let mut workers = Vec::new();
        for _ in 0..16 {
            let pool = Arc::clone(&pool);
            workers.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let conn = test_conn();
                    let id = conn.id;
                    if pool.try_add(conn) {
                        assert!(pool.len() <= pool.capacity());
                        pool.remove(&id);
                    }
                    assert!(pool.len() <= pool.capacity());
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
        // Every admitted connection was removed by its own thread.
        assert!(pool.is_empty());
    }

    #[test]
    fn test_clear_closes_everything() {
        let pool = ConnectionPool::new(4);
        let a = test_conn();
        let b = test_conn();
        pool.try_add(a.clone());
        pool.try_add(b.clone());
        pool.clear();
        assert!(pool.is_empty());
        assert!(a.is_closed());
        assert!(b.is_closed());
    }
}
