// ============================================
// File: crates/debugport-server/src/config.rs
// ============================================
//! # Server Configuration
//!
//! ## Creation Reason
//! Provides configuration management for the debugport server,
//! supporting TOML files and sensible embedded defaults. The core
//! never reads files at runtime: the config loader runs once and the
//! resulting `ServerConfig` is immutable for the server's lifetime.
//!
//! ## Configuration Sections
//! - `network`: TCP bind host/port
//! - `auth`: token requirement, optional fixed token, retry bound
//! - `tls`: certificate material or self-signed generation
//! - `limits`: pool capacity, idle timeout, sweep interval, shutdown grace
//! - `dispatch`: worker pool size, response cache TTL/capacity
//! - `logging`: log level
//!
//! ## Example Configuration
//! ```toml
//! [network]
//! host = "127.0.0.1"
//! port = 7878
//!
//! [auth]
//! required = true
//! max_retries = 3
//!
//! [tls]
//! enabled = true
//! cert_file = "/etc/debugport/cert.pem"
//! key_file = "/etc/debugport/key.pem"
//!
//! [limits]
//! max_clients = 50
//! idle_timeout_secs = 300
//!
//! [dispatch]
//! worker_pool_size = 4
//! cache_ttl_secs = 5
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - All config changes require a server restart
//! - `auth.token` left unset means a fresh token is generated at start
//!   (retrieve it via the facade, never from logs)
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ServerError};

// ============================================
// ServerConfig
// ============================================

/// Main server configuration. Immutable once the server is running.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// TLS configuration.
    #[serde(default)]
    pub tls: TlsConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Command dispatch configuration.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, or if the
    /// parsed configuration fails validation.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a string (useful for testing).
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ServerError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.auth.validate()?;
        self.tls.validate()?;
        self.limits.validate()?;
        self.dispatch.validate()?;
        Ok(())
    }

    /// Returns the `host:port` string to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.network.host, self.network.port)
    }

    /// Per-connection idle timeout.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.idle_timeout_secs)
    }

    /// Idle-sweep interval.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.limits.sweep_interval_secs)
    }

    /// Per-connection read timeout (a lapse means "keep waiting").
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.read_timeout_secs)
    }

    /// Bounded wait for task teardown during `stop()`.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.limits.shutdown_grace_secs)
    }

    /// TTL for cacheable command responses.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.dispatch.cache_ttl_secs)
    }
}

// ============================================
// NetworkConfig
// ============================================

/// Network configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port. Port 0 requests an ephemeral port (useful in tests).
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7878
}

impl NetworkConfig {
    fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(ServerError::config_invalid(
                "network.host",
                "cannot be empty",
            ));
        }
        Ok(())
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ============================================
// AuthConfig
// ============================================

/// Authentication configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Whether clients must authenticate before issuing commands.
    #[serde(default = "default_auth_required")]
    pub required: bool,

    /// Fixed token value. Unset means a fresh high-entropy token is
    /// generated per server instance.
    #[serde(default)]
    pub token: Option<String>,

    /// Non-auth frames tolerated during the handshake before the
    /// connection is closed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_auth_required() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

impl AuthConfig {
    fn validate(&self) -> Result<()> {
        if let Some(token) = &self.token {
            if self.required && token.is_empty() {
                return Err(ServerError::config_invalid(
                    "auth.token",
                    "cannot be empty when auth is required",
                ));
            }
        }
        Ok(())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            required: default_auth_required(),
            token: None,
            max_retries: default_max_retries(),
        }
    }
}

// ============================================
// TlsConfig
// ============================================

/// TLS configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TlsConfig {
    /// Whether accepted sockets are TLS-wrapped.
    #[serde(default)]
    pub enabled: bool,

    /// Path to a PEM certificate chain.
    #[serde(default)]
    pub cert_file: Option<String>,

    /// Path to a PEM private key.
    #[serde(default)]
    pub key_file: Option<String>,

    /// Generate a self-signed certificate at startup instead of
    /// loading files.
    #[serde(default)]
    pub self_signed: bool,
}

impl TlsConfig {
    fn validate(&self) -> Result<()> {
        if self.enabled && !self.self_signed {
            if self.cert_file.is_none() {
                return Err(ServerError::config_invalid(
                    "tls.cert_file",
                    "required when TLS is enabled without self_signed",
                ));
            }
            if self.key_file.is_none() {
                return Err(ServerError::config_invalid(
                    "tls.key_file",
                    "required when TLS is enabled without self_signed",
                ));
            }
        }
        Ok(())
    }
}

// ============================================
// LimitsConfig
// ============================================

/// Resource limits configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent clients (connection pool capacity).
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Idle timeout in seconds; the sweeper evicts quieter connections.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Interval between idle sweeps, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Per-connection read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Bounded wait for worker teardown during stop, in seconds.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_max_clients() -> usize {
    50
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_read_timeout() -> u64 {
    30
}

fn default_shutdown_grace() -> u64 {
    5
}

impl LimitsConfig {
    fn validate(&self) -> Result<()> {
        if self.max_clients == 0 {
            return Err(ServerError::config_invalid(
                "limits.max_clients",
                "must be greater than 0",
            ));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ServerError::config_invalid(
                "limits.idle_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ServerError::config_invalid(
                "limits.sweep_interval_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_clients: default_max_clients(),
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            read_timeout_secs: default_read_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

// ============================================
// DispatchConfig
// ============================================

/// Command dispatch configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Concurrent non-urgent dispatches allowed across all connections.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// TTL for cacheable command responses, in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Bounded response-cache capacity.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_cache_ttl() -> u64 {
    5
}

fn default_cache_capacity() -> usize {
    100
}

impl DispatchConfig {
    fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(ServerError::config_invalid(
                "dispatch.worker_pool_size",
                "must be greater than 0",
            ));
        }
        if self.cache_capacity == 0 {
            return Err(ServerError::config_invalid(
                "dispatch.cache_capacity",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
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
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr(), "127.0.0.1:7878");
        assert!(config.auth.required);
        assert!(!config.tls.enabled);
    }

    #[test]
    fn test_full_config_format() {
        let toml = r#"
            [network]
            host = "0.0.0.0"
            port = 9000

            [auth]
            required = true
            token = "secret123"
            max_retries = 5

            [tls]
            enabled = true
            cert_file = "/etc/debugport/cert.pem"
            key_file = "/etc/debugport/key.pem"

            [limits]
            max_clients = 100
            idle_timeout_secs = 120

            [dispatch]
            worker_pool_size = 8
            cache_ttl_secs = 10

            [logging]
            level = "debug"
        "#;

        let config = ServerConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:9000");
        assert_eq!(config.auth.token.as_deref(), Some("secret123"));
        assert_eq!(config.auth.max_retries, 5);
        assert_eq!(config.limits.max_clients, 100);
        assert_eq!(config.dispatch.worker_pool_size, 8);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = ServerConfig::from_toml_str("[network]\nport = 0\n").unwrap();
        assert_eq!(config.network.port, 0);
        assert_eq!(config.limits.max_clients, 50);
        assert_eq!(config.dispatch.cache_capacity, 100);
    }

    #[test]
    fn test_tls_requires_cert_material() {
        let result = ServerConfig::from_toml_str("[tls]\nenabled = true\n");
        assert!(matches!(result, Err(ServerError::ConfigInvalid { .. })));

        // self_signed lifts the requirement
        let config =
            ServerConfig::from_toml_str("[tls]\nenabled = true\nself_signed = true\n").unwrap();
        assert!(config.tls.enabled);
    }

    #[test]
    fn test_zero_limits_rejected() {
        let result = ServerConfig::from_toml_str("[limits]\nmax_clients = 0\n");
        assert!(matches!(result, Err(ServerError::ConfigInvalid { .. })));

        let result = ServerConfig::from_toml_str("[dispatch]\nworker_pool_size = 0\n");
        assert!(matches!(result, Err(ServerError::ConfigInvalid { .. })));
    }
}
