// ============================================
// File: crates/debugport-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines error types specific to protocol framing and handshake
//! processing in the debugport core crate.
//!
//! ## Error Categories
//! 1. **Framing Errors**: Oversized accumulation buffer
//! 2. **Message Errors**: JSON parsing, schema violations
//!
//! Handshake rejection is not an error here: it is reported through
//! `HandshakeOutcome` so the session can answer the client and keep
//! the retry budget.
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include the submitted token in error messages
//! - All errors must be loggable without leaking secrets
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use debugport_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for framing and handshake operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Accumulation buffer grew past the hard cap without a delimiter.
    ///
    /// The connection is treated as abusive and must be closed.
    #[error("Frame exceeds {limit} bytes without a delimiter")]
    FrameTooLarge {
        /// The configured hard cap in bytes
        limit: usize,
    },

    /// A frame could not be parsed as the expected JSON message.
    #[error("Invalid message: {reason}")]
    InvalidMessage {
        /// Description of the schema violation
        reason: String,
    },

    /// JSON serialization/deserialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from the common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    /// Creates an `InvalidMessage` error.
    pub fn invalid_message(reason: impl Into<String>) -> Self {
        Self::InvalidMessage {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error must terminate the connection.
    ///
    /// Framing violations are unrecoverable because the stream position
    /// is no longer trustworthy; message-level errors are answered with
    /// an error payload instead.
    #[must_use]
    pub const fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::FrameTooLarge { .. })
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::FrameTooLarge { limit: 1_048_576 };
        assert!(err.to_string().contains("1048576"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(CoreError::FrameTooLarge { limit: 1 }.is_connection_fatal());
        assert!(!CoreError::invalid_message("bad").is_connection_fatal());
    }
}
