// ============================================
// File: crates/debugport-core/src/lib.rs
// ============================================
//! # Debugport Core - Protocol Library
//!
//! ## Creation Reason
//! Implements the debugport wire protocol: newline-delimited JSON frames
//! over TCP (optionally TLS-wrapped), plus the challenge/response
//! authentication handshake that gates command execution.
//!
//! ## Main Functionality
//! - [`protocol::codec`]: Incremental frame extraction from a byte stream
//! - [`protocol::messages`]: Wire message definitions
//! - [`auth`]: Challenge/response handshake state machine
//! - [`error`]: Core error types
//!
//! ## Wire Protocol
//! ```text
//! Client                                   Server
//!   │                                        │
//!   │  ◄── {"type":"auth_challenge",...}\n   │  (auth required only)
//!   │  {"type":"auth_response","token":..}\n │
//!   │  ◄── {"type":"auth_result",...}\n      │
//!   │                                        │
//!   │  {"command":"ping","args":[]}\n        │
//!   │  ◄── {"result":"pong"}\n               │
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Frames are delimited by a single `\n`; a trailing `\r` is stripped
//! - Invalid UTF-8 is decoded lossily, never fails the connection
//! - The handshake treats malformed JSON as an auth failure, not a crash
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod error;
pub mod protocol;

// Re-export primary types
pub use auth::{Handshake, HandshakeOutcome, HandshakeState};
pub use error::{CoreError, Result};
pub use protocol::codec::FrameCodec;
pub use protocol::messages::{CommandRequest, CommandResponse, HandshakeMessage, MessagePriority};
