// ============================================
// File: crates/debugport-server/src/error.rs
// ============================================
//! # Server Error Types
//!
//! ## Creation Reason
//! Defines the error taxonomy of the server crate. The split matters
//! operationally: fatal errors abort `start()`, everything else is
//! recovered per-connection without terminating the process.
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use debugport_common::error::CommonError;
use debugport_common::types::ClientId;
use debugport_core::error::CoreError;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server error types.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration file could not be read or parsed
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        /// Path of the configuration file
        path: String,
        /// Why loading failed
        reason: String,
    },

    /// A configuration value failed validation
    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        /// Name of the offending field
        field: String,
        /// Why the value is invalid
        reason: String,
    },

    /// Server could not bind or initialize its listener
    #[error("Server failed to start: {reason}")]
    StartupFailed {
        /// Why startup failed
        reason: String,
    },

    /// `start()` was called while the server is already running
    #[error("Server is already running")]
    AlreadyRunning,

    /// Operation referenced a client that is not in the pool
    #[error("Client not found: {0}")]
    ClientNotFound(ClientId),

    /// TLS certificate or key material could not be loaded
    #[error("TLS error: {reason}")]
    Tls {
        /// Why TLS setup failed
        reason: String,
    },

    /// Protocol-level error from the core crate
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error from the common crate
    #[error(transparent)]
    Common(#[from] CommonError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Creates a configuration load error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a configuration validation error.
    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a startup failure error.
    pub fn startup_failed(reason: impl Into<String>) -> Self {
        Self::StartupFailed {
            reason: reason.into(),
        }
    }

    /// Creates a TLS setup error.
    pub fn tls(reason: impl Into<String>) -> Self {
        Self::Tls {
            reason: reason.into(),
        }
    }

    /// Returns `true` for configuration load or validation errors.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. } | Self::ConfigInvalid { .. }
        )
    }

    /// Fatal errors surface to the caller of `start()`; the server does
    /// not enter the running state.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. }
                | Self::ConfigInvalid { .. }
                | Self::StartupFailed { .. }
                | Self::Tls { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServerError::config_load("/etc/debugport.toml", "file not found");
        assert!(err.to_string().contains("/etc/debugport.toml"));
    }

    #[test]
    fn test_error_classification() {
        let config_err = ServerError::config_invalid("port", "must be > 0");
        assert!(config_err.is_config_error());
        assert!(config_err.is_fatal());

        let not_found = ServerError::ClientNotFound(ClientId::generate());
        assert!(!not_found.is_fatal());
    }
}
