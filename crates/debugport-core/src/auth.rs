// ============================================
// File: crates/debugport-core/src/auth.rs
// ============================================
//! # Auth Handshake
//!
//! ## Creation Reason
//! Gates command execution behind a challenge/response exchange proving
//! possession of the server's shared-secret token.
//!
//! ## Main Functionality
//! - `Handshake`: per-connection state machine
//! - `HandshakeState`: `AwaitingResponse -> Authenticated | Rejected`
//! - `HandshakeOutcome`: the decision plus the reply line to send
//!
//! ## Handshake Flow
//! ```text
//! ┌──────────────────┐  valid auth_response  ┌───────────────┐
//! │ AwaitingResponse │ ────────────────────► │ Authenticated │
//! └────────┬─────────┘                       └───────────────┘
//!          │
//!          │ bad token / malformed JSON
//!          ▼
//!    ┌──────────┐      non-auth-shaped frame: error reply,
//!    │ Rejected │      state unchanged (caller bounds retries)
//!    └──────────┘
//! ```
//!
//! ## Error Handling
//! - Malformed JSON: treated as an auth failure, never a crash
//! - Valid JSON that is not an auth_response: "please authenticate
//!   first" reply, another chance (bounded by the caller)
//!
//! ## ⚠️ Important Note for Next Developer
//! - Token comparison goes through `AuthToken::matches` (constant-time);
//!   never compare with `==`
//! - The submitted token value must never appear in logs or replies
//! - `Authenticated` is terminal; the machine never transitions out
//!
//! ## Last Modified
//! v0.1.0 - Initial handshake implementation

use tracing::{debug, warn};

use debugport_common::types::AuthToken;

use crate::protocol::messages::HandshakeMessage;

// ============================================
// HandshakeState
// ============================================

/// Handshake state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Challenge sent, waiting for the client's response.
    AwaitingResponse,
    /// Client proved possession of the token. Terminal.
    Authenticated,
    /// Client failed the handshake; the caller closes the connection.
    Rejected,
}

impl std::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingResponse => write!(f, "AwaitingResponse"),
            Self::Authenticated => write!(f, "Authenticated"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

// ============================================
// HandshakeOutcome
// ============================================

/// Result of processing one frame during the handshake.
///
/// Every outcome carries the serialized reply line the caller writes
/// back before acting on the decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Client authenticated; subsequent frames go to the dispatcher.
    Authenticated {
        /// `auth_result` success reply to send.
        reply: String,
    },
    /// Client rejected; the caller sends the reply and closes.
    Rejected {
        /// `auth_result` failure reply to send.
        reply: String,
    },
    /// Frame was not auth-shaped; the caller sends the error reply and
    /// keeps waiting, up to its retry bound.
    Retry {
        /// `error` reply to send.
        reply: String,
    },
}

// ============================================
// Handshake
// ============================================

/// Per-connection challenge/response state machine.
///
/// Constructed only when auth is required; connections on an open
/// server skip it entirely and start pre-authenticated.
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
    token: AuthToken,
}

impl Handshake {
    /// Creates a handshake expecting `token`.
    #[must_use]
    pub fn new(token: AuthToken) -> Self {
        Self {
            state: HandshakeState::AwaitingResponse,
            token,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Returns `true` once the client has authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state == HandshakeState::Authenticated
    }

    /// Serialized challenge line, sent proactively after accept.
    #[must_use]
    pub fn challenge_line() -> String {
        HandshakeMessage::challenge().encode()
    }

    /// Processes one frame received while unauthenticated.
    ///
    /// State transitions:
    /// - valid `auth_response` with matching token → `Authenticated`
    /// - valid `auth_response` with wrong token → `Rejected`
    /// - malformed JSON → `Rejected`
    /// - any other frame → `Retry`, state unchanged
    pub fn process(&mut self, frame: &str) -> HandshakeOutcome {
        if self.state != HandshakeState::AwaitingResponse {
            // Terminal states never transition; a stray call gets an
            // error reply without disturbing the machine.
            let message = match self.state {
                HandshakeState::Rejected => "authentication failed",
                _ => "handshake already complete",
            };
            return HandshakeOutcome::Retry {
                reply: HandshakeMessage::error(message).encode(),
            };
        }

        // Malformed JSON is an auth failure, not a protocol crash.
        if serde_json::from_str::<serde_json::Value>(frame).is_err() {
            warn!("Handshake frame is not valid JSON, rejecting");
            return self.reject("malformed handshake message");
        }

        match HandshakeMessage::decode(frame) {
            Ok(HandshakeMessage::AuthResponse { token }) => {
                if self.token.matches(&token) {
                    debug!("Handshake token accepted");
                    self.state = HandshakeState::Authenticated;
                    HandshakeOutcome::Authenticated {
                        reply: HandshakeMessage::auth_result(true, "authenticated").encode(),
                    }
                } else {
                    warn!("Handshake token mismatch, rejecting");
                    self.reject("invalid token")
                }
            }
            // Valid JSON that is not an auth_response: give the client
            // another chance, bounded by the caller's retry count.
            Ok(_) | Err(_) => HandshakeOutcome::Retry {
                reply: HandshakeMessage::error("please authenticate first").encode(),
            },
        }
    }

    fn reject(&mut self, message: &str) -> HandshakeOutcome {
        self.state = HandshakeState::Rejected;
        HandshakeOutcome::Rejected {
            reply: HandshakeMessage::auth_result(false, message).encode(),
        }
    }
}

// ============================================
// Tests
// ============================================
