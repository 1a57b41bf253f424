// ============================================
// File: crates/debugport-core/src/protocol/mod.rs
// ============================================
//! # Wire Protocol
//!
//! Newline-delimited JSON frames: [`codec`] turns a raw byte stream into
//! discrete UTF-8 frames, [`messages`] defines what those frames mean.

pub mod codec;
pub mod messages;

pub use codec::FrameCodec;
pub use messages::{CommandRequest, CommandResponse, HandshakeMessage, MessagePriority};

/// Hard cap on the per-connection accumulation buffer (1 MiB).
///
/// A client that streams bytes without ever sending `\n` is cut off at
/// this limit to bound memory growth.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;
