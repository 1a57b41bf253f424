// ============================================
// File: crates/debugport-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Centralizes the identifier and credential types used throughout the
//! debugport server, ensuring type safety and consistent representations.
//!
//! ## Main Functionality
//! - `ClientId`: Unique identifier for accepted connections (8 bytes)
//! - `AuthToken`: Shared-secret credential with constant-time comparison
//!
//! ## Main Logical Flow
//! 1. A `ClientId` is generated when a connection is accepted
//! 2. Used as the key in the connection pool and in log fields
//! 3. `AuthToken` is generated once per server instance (or loaded from
//!    configuration) and compared against client-submitted tokens
//!
//! ## ⚠️ Important Note for Next Developer
//! - `AuthToken` comparison MUST stay constant-time (`subtle::ct_eq`);
//!   an early-exit byte compare leaks the match length to the client
//! - `AuthToken` is zeroized on drop and its Debug output is redacted
//! - Never log the token value; log only whether auth succeeded
//!
//! ## Last Modified
//! v0.1.0 - Initial type definitions

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::CommonError;

// ============================================
// Constants
// ============================================

/// Size of a `ClientId` in bytes.
pub const CLIENT_ID_SIZE: usize = 8;

/// Entropy of a generated `AuthToken` in bytes (before base64 encoding).
pub const AUTH_TOKEN_ENTROPY: usize = 32;

// ============================================
// ClientId
// ============================================

/// Unique identifier for an accepted client connection.
///
/// # Properties
/// - Generated from the thread-local CSPRNG at accept time
/// - Fixed 8-byte size, displayed as 16 lowercase hex characters
/// - `Copy`: ids are not secret, only unique
///
/// # Example
/// ```
/// use debugport_common::types::ClientId;
///
/// let id = ClientId::generate();
/// let restored: ClientId = id.to_string().parse().unwrap();
/// assert_eq!(id, restored);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId([u8; CLIENT_ID_SIZE]);

impl ClientId {
    /// Generates a new random client id.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; CLIENT_ID_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Creates a `ClientId` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; CLIENT_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the id.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; CLIENT_ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for ClientId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != CLIENT_ID_SIZE * 2 {
            return Err(CommonError::invalid_length(CLIENT_ID_SIZE * 2, s.len()));
        }
        let mut bytes = [0u8; CLIENT_ID_SIZE];
        for (i, chunk) in s.as_bytes().chunks_exact(2).enumerate() {
            let pair = std::str::from_utf8(chunk)
                .map_err(|_| CommonError::invalid_input("client_id", "not valid hex"))?;
            bytes[i] = u8::from_str_radix(pair, 16)
                .map_err(|_| CommonError::invalid_input("client_id", "not valid hex"))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for ClientId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ClientId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================
// AuthToken
// ============================================

/// Shared-secret credential gating command execution.
///
/// # Security Properties
/// - Generated from 32 bytes of CSPRNG output, base64-encoded
/// - Compared with `subtle::ConstantTimeEq` (no early exit)
/// - Zeroized on drop; `Debug` output is redacted
/// - Does NOT implement `PartialEq` - use [`AuthToken::matches`]
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    /// Generates a new high-entropy token.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; AUTH_TOKEN_ENTROPY];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = Self(BASE64.encode(bytes));
        bytes.zeroize();
        token
    }

    /// Wraps an existing token value (e.g. loaded from configuration).
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Compares a client-submitted value against this token in
    /// constant time.
    ///
    /// Length is checked by `ct_eq` itself: mismatched lengths return
    /// false without comparing content, which reveals only the length -
    /// not any prefix of the secret.
    #[must_use]
    pub fn matches(&self, submitted: &str) -> bool {
        self.0.as_bytes().ct_eq(submitted.as_bytes()).into()
    }

    /// Returns the token value for operator-facing output
    /// (e.g. the `gen-token` CLI command).
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the token is empty (unset).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Drop for AuthToken {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken(***)")
    }
}

// ============================================
// Tests
// ============================================
