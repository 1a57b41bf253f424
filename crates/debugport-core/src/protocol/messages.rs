// ============================================
// File: crates/debugport-core/src/protocol/messages.rs
// ============================================
//! # Protocol Message Definitions
//!
//! ## Creation Reason
//! Defines the structure of all wire messages exchanged between
//! debugport clients and the server.
//!
//! ## Main Functionality
//! - `HandshakeMessage`: Pre-auth JSON messages tagged by `"type"`
//! - `CommandRequest` / `CommandResponse`: Post-auth command frames
//! - `MessagePriority`: Urgent-vs-normal dispatch classification
//! - Pre-auth command allow list
//!
//! ## Wire Format
//! One JSON object per newline-delimited frame:
//!
//! | Direction | Frame |
//! |-----------|-------|
//! | S→C | `{"type":"auth_challenge","message":"..."}` |
//! | C→S | `{"type":"auth_response","token":"..."}` |
//! | S→C | `{"type":"auth_result","success":bool,"message":"..."}` |
//! | S→C | `{"type":"error","message":"..."}` |
//! | C→S | `{"command":"<name>","args":[...]}` |
//! | S→C | `{"result":"<string>"}` |
//!
//! ## ⚠️ Important Note for Next Developer
//! - The `"type"` tag values are wire-visible - renaming a variant is a
//!   protocol break
//! - Handler output is embedded as a string in `"result"`, even when it
//!   is itself JSON-encoded text
//!
//! ## Last Modified
//! v0.1.0 - Initial message definitions

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

// ============================================
// Command Classification
// ============================================

/// Commands dispatched synchronously, bypassing the worker pool.
///
/// Control commands must stay responsive even when the pool is saturated
/// with slow handlers.
pub const URGENT_COMMANDS: &[&str] = &["stop", "kill", "disconnect"];

/// Commands permitted before authentication completes.
pub const PRE_AUTH_COMMANDS: &[&str] = &["ping", "help", "auth"];

/// Dispatch priority of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePriority {
    /// Dispatched inline on the connection's task.
    Urgent,
    /// Dispatched through the bounded worker pool.
    Normal,
}

impl MessagePriority {
    /// Classifies a command name.
    #[must_use]
    pub fn classify(command: &str) -> Self {
        if URGENT_COMMANDS.contains(&command) {
            Self::Urgent
        } else {
            Self::Normal
        }
    }
}

/// Returns `true` if `command` may run before authentication.
#[must_use]
pub fn is_pre_auth_allowed(command: &str) -> bool {
    PRE_AUTH_COMMANDS.contains(&command)
}

// ============================================
// HandshakeMessage
// ============================================

/// Pre-auth protocol messages, tagged by the `"type"` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandshakeMessage {
    /// Server→Client: sent immediately after accept when auth is required.
    AuthChallenge {
        /// Human-readable prompt.
        message: String,
    },
    /// Client→Server: the client's proof of possession.
    AuthResponse {
        /// The submitted shared-secret token.
        token: String,
    },
    /// Server→Client: outcome of the handshake.
    AuthResult {
        /// Whether authentication succeeded.
        success: bool,
        /// Human-readable outcome description.
        message: String,
    },
    /// Server→Client: protocol-level error reply.
    Error {
        /// Description of the error.
        message: String,
    },
}

impl HandshakeMessage {
    /// Builds the standard challenge message.
    #[must_use]
    pub fn challenge() -> Self {
        Self::AuthChallenge {
            message: "Authentication required. Send auth_response with your token.".to_string(),
        }
    }

    /// Builds an auth result message.
    pub fn auth_result(success: bool, message: impl Into<String>) -> Self {
        Self::AuthResult {
            success,
            message: message.into(),
        }
    }

    /// Builds an error reply.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serializes the message to a single-line JSON string (no trailing
    /// newline - the writer appends the frame delimiter).
    #[must_use]
    pub fn encode(&self) -> String {
        // All variants are string/bool fields; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parses a frame as a handshake message.
    ///
    /// # Errors
    /// Returns `CoreError::Json` if the frame is not a valid tagged
    /// handshake object.
    pub fn decode(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }
}

// ============================================
// CommandRequest / CommandResponse
// ============================================

/// Post-auth command frame: `{"command":"<name>","args":[...]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandRequest {
    /// Command name, matched against the registry.
    pub command: String,
    /// Ordered argument list.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandRequest {
    /// Creates a request.
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    /// Parses a frame as a command request.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidMessage` when the frame is not a JSON
    /// object with a string `command` field.
    pub fn decode(frame: &str) -> Result<Self> {
        serde_json::from_str(frame)
            .map_err(|e| CoreError::invalid_message(format!("not a command frame: {e}")))
    }

    /// Serializes the request to a single-line JSON string.
    #[must_use]
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Returns the dispatch priority of this request.
    #[must_use]
    pub fn priority(&self) -> MessagePriority {
        MessagePriority::classify(&self.command)
    }
}

/// Server reply to a command frame: `{"result":"<string>"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResponse {
    /// Handler output, embedded as a string.
    pub result: String,
}

impl CommandResponse {
    /// Creates a response.
    pub fn new(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
        }
    }

    /// Serializes the response to a single-line JSON string.
    #[must_use]
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_wire_format() {
        let encoded = HandshakeMessage::challenge().encode();
        assert!(encoded.starts_with("{\"type\":\"auth_challenge\""));
        assert!(!encoded.contains('\n'));
    }

    #[test]
    fn test_auth_response_decode() {
        let msg = HandshakeMessage::decode(r#"{"type":"auth_response","token":"secret123"}"#)
            .unwrap();
        assert_eq!(
            msg,
            HandshakeMessage::AuthResponse {
                token: "secret123".to_string()
            }
        );
    }

    #[test]
    fn test_auth_result_wire_format() {
        let encoded = HandshakeMessage::auth_result(false, "bad token").encode();
        assert!(encoded.contains("\"type\":\"auth_result\""));
        assert!(encoded.contains("\"success\":false"));
    }

    #[test]
    fn test_command_request_round_trip() {
        let req = CommandRequest::decode(r#"{"command":"ping","args":[]}"#).unwrap();
        assert_eq!(req.command, "ping");
        assert!(req.args.is_empty());

        let req = CommandRequest::decode(r#"{"command":"help","args":["status"]}"#).unwrap();
        assert_eq!(req.args, vec!["status".to_string()]);
    }

    #[test]
    fn test_command_request_args_default() {
        // args may be omitted entirely
        let req = CommandRequest::decode(r#"{"command":"ping"}"#).unwrap();
        assert!(req.args.is_empty());
    }

    #[test]
    fn test_command_request_rejects_garbage() {
        assert!(CommandRequest::decode("not json").is_err());
        assert!(CommandRequest::decode(r#"{"args":[]}"#).is_err());
    }

    #[test]
    fn test_priority_classification() {
        assert_eq!(MessagePriority::classify("stop"), MessagePriority::Urgent);
        assert_eq!(MessagePriority::classify("kill"), MessagePriority::Urgent);
        assert_eq!(
            MessagePriority::classify("disconnect"),
            MessagePriority::Urgent
        );
        assert_eq!(MessagePriority::classify("status"), MessagePriority::Normal);
        assert_eq!(MessagePriority::classify("ping"), MessagePriority::Normal);
    }

    #[test]
    fn test_pre_auth_allow_list() {
        assert!(is_pre_auth_allowed("ping"));
        assert!(is_pre_auth_allowed("help"));
        assert!(is_pre_auth_allowed("auth"));
        assert!(!is_pre_auth_allowed("status"));
        assert!(!is_pre_auth_allowed("stop"));
    }

    #[test]
    fn test_response_embeds_result_as_string() {
        let response = CommandResponse::new(r#"{"uptime": 42}"#);
        let encoded = response.encode();
        // Inner JSON stays escaped inside the result string.
        assert!(encoded.starts_with("{\"result\":\"{"));
    }
}
