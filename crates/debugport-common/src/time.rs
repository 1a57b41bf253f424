// ============================================
// File: crates/debugport-common/src/time.rs
// ============================================
//! # Time Utilities
//!
//! ## Creation Reason
//! Connection records are touched by their own handler task on every
//! read and inspected by the idle sweeper; both need a timestamp they
//! can share without a lock.
//!
//! ## Main Functionality
//! - `AtomicInstant`: Thread-safe wrapper around `Instant`
//!
//! ## Main Logical Flow
//! 1. Connections store `AtomicInstant` for last-activity tracking
//! 2. The sweeper reads these atomically for idle-eviction decisions
//! 3. Handler tasks update atomically without locks
//!
//! ## ⚠️ Important Note for Next Developer
//! - `AtomicInstant` uses `AtomicU64` internally (nanoseconds since start)
//! - Be aware of potential overflow after ~584 years of uptime
//!
//! ## Last Modified
//! v0.1.0 - Initial time utilities

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// ============================================
// AtomicInstant
// ============================================

/// Thread-safe wrapper around [`Instant`] for concurrent access.
///
/// # Purpose
/// Allows the sweeper and a connection's handler task to read/write the
/// last-activity timestamp without taking a lock.
///
/// # Implementation
/// Stores nanoseconds elapsed since a reference instant (program start).
/// Uses `AtomicU64` with relaxed ordering; a slightly stale read only
/// delays idle eviction by one sweep cycle.
///
/// # Example
/// ```
/// use debugport_common::time::AtomicInstant;
///
/// let last_activity = AtomicInstant::now();
/// last_activity.touch();
/// assert!(!last_activity.has_elapsed(std::time::Duration::from_secs(60)));
/// ```
#[derive(Debug)]
pub struct AtomicInstant {
    /// Nanoseconds since the reference instant
    nanos: AtomicU64,
}

impl AtomicInstant {
    /// Reference instant (lazily initialized at program start).
    ///
    /// Anchored in the past so instants slightly before first use
    /// remain representable instead of clamping to the reference.
    fn reference() -> Instant {
        use std::sync::OnceLock;
        static REFERENCE: OnceLock<Instant> = OnceLock::new();
        *REFERENCE.get_or_init(|| {
            let now = Instant::now();
            now.checked_sub(Duration::from_secs(86_400))
                .or_else(|| now.checked_sub(Duration::from_secs(3600)))
                .unwrap_or(now)
        })
    }

    /// Creates a new `AtomicInstant` set to the current time.
    #[must_use]
    pub fn now() -> Self {
        Self::from_instant(Instant::now())
    }

    /// Creates a new `AtomicInstant` from an `Instant`.
    #[must_use]
    pub fn from_instant(instant: Instant) -> Self {
        let nanos = instant
            .checked_duration_since(Self::reference())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            nanos: AtomicU64::new(nanos),
        }
    }

    /// Loads the stored instant.
    #[must_use]
    pub fn load(&self) -> Instant {
        let nanos = self.nanos.load(Ordering::Relaxed);
        Self::reference() + Duration::from_nanos(nanos)
    }

    /// Stores a new instant.
    pub fn store(&self, instant: Instant) {
        let nanos = instant
            .checked_duration_since(Self::reference())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        self.nanos.store(nanos, Ordering::Relaxed);
    }

    /// Updates the stored instant to the current time.
    pub fn touch(&self) {
        self.store(Instant::now());
    }

    /// Returns the elapsed time since the stored instant.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.load().elapsed()
    }

    /// Checks if more than `duration` has elapsed since the stored instant.
    #[must_use]
    pub fn has_elapsed(&self, duration: Duration) -> bool {
        self.elapsed() > duration
    }
}

impl Default for AtomicInstant {
    fn default() -> Self {
        Self::now()
    }
}

impl Clone for AtomicInstant {
    fn clone(&self) -> Self {
        Self {
            nanos: AtomicU64::new(self.nanos.load(Ordering::Relaxed)),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_resets_elapsed() {
        let instant = AtomicInstant::from_instant(Instant::now() - Duration::from_secs(10));
        assert!(instant.has_elapsed(Duration::from_secs(5)));

        instant.touch();
        assert!(!instant.has_elapsed(Duration::from_secs(5)));
    }

    #[test]
    fn test_store_and_load_round_trip() {
        let now = Instant::now();
        let instant = AtomicInstant::now();
        instant.store(now);
        // Nanosecond truncation only; the values must agree to within 1us.
        let diff = if instant.load() > now {
            instant.load() - now
        } else {
            now - instant.load()
        };
        assert!(diff < Duration::from_micros(1));
    }
}
