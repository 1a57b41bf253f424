// ============================================
// File: crates/debugport-core/src/protocol/codec.rs
// ============================================
//! # Frame Codec
//!
//! ## Creation Reason
//! Turns a raw TCP byte stream into discrete newline-delimited UTF-8
//! frames, tolerating arbitrary read boundaries and malformed input.
//!
//! ## Main Functionality
//! - `FrameCodec`: per-connection accumulation buffer + frame extraction
//! - Lossy UTF-8 decoding (invalid sequences become U+FFFD)
//! - Hard cap on buffered bytes without a delimiter
//!
//! ## Parsing Strategy
//! 1. Append incoming bytes to the accumulation buffer
//! 2. Split off every complete `\n`-terminated frame
//! 3. Strip a trailing `\r`, skip empty frames
//! 4. Leave the partial tail buffered for the next feed
//!
//! ## Invariant
//! Feeding a byte sequence in arbitrary increments yields exactly the
//! same frames as feeding it all at once (split-invariance).
//!
//! ## ⚠️ Important Note for Next Developer
//! - A `FrameTooLarge` error means the stream position is untrustworthy;
//!   the caller must close the connection, not retry
//! - Decode errors never fail the connection - log and continue
//!
//! ## Last Modified
//! v0.1.0 - Initial codec implementation

use bytes::{Buf, BytesMut};
use tracing::warn;

use crate::error::{CoreError, Result};
use crate::protocol::MAX_FRAME_SIZE;

// ============================================
// FrameCodec
// ============================================

/// Incremental newline-delimited frame extractor.
///
/// One instance per connection; the internal buffer holds any trailing
/// partial frame between reads.
#[derive(Debug)]
pub struct FrameCodec {
    /// Accumulation buffer for partial frame bytes.
    buf: BytesMut,
    /// Hard cap on buffered bytes without a delimiter.
    max_frame: usize,
}

impl FrameCodec {
    /// Creates a codec with the default 1 MiB frame cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(MAX_FRAME_SIZE)
    }

    /// Creates a codec with a custom frame cap (useful in tests).
    #[must_use]
    pub fn with_limit(max_frame: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame,
        }
    }

    /// Appends bytes and extracts every complete frame.
    ///
    /// Empty frames (consecutive delimiters) are skipped. Invalid UTF-8
    /// is replaced with U+FFFD and logged once per occurrence.
    ///
    /// # Errors
    /// Returns `CoreError::FrameTooLarge` when the buffered tail exceeds
    /// the cap without a delimiter; the connection must then be closed.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<String>> {
        self.buf.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line = self.buf.split_to(pos);
            self.buf.advance(1); // consume the delimiter
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            if line.is_empty() {
                continue;
            }
            frames.push(Self::decode_lossy(&line));
        }

        if self.buf.len() > self.max_frame {
            return Err(CoreError::FrameTooLarge {
                limit: self.max_frame,
            });
        }

        Ok(frames)
    }

    /// Returns the buffered partial-frame bytes.
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.buf
    }

    /// Returns the number of buffered bytes.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Decodes a frame, replacing invalid UTF-8 sequences.
    fn decode_lossy(line: &[u8]) -> String {
        match std::str::from_utf8(line) {
            Ok(text) => text.to_string(),
            Err(_) => {
                warn!(len = line.len(), "Frame contains invalid UTF-8, decoding lossily");
                String::from_utf8_lossy(line).into_owned()
            }
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_complete_frame() {
        let mut codec = FrameCodec::new();
        let frames = codec.feed(b"hello\n").unwrap();
        assert_eq!(frames, vec!["hello".to_string()]);
        assert!(codec.remaining().is_empty());
    }

    #[test]
    fn test_partial_frame_stays_buffered() {
        let mut codec = FrameCodec::new();
        assert!(codec.feed(b"hel").unwrap().is_empty());
        assert_eq!(codec.remaining(), b"hel");

        let frames = codec.feed(b"lo\nwor").unwrap();
        assert_eq!(frames, vec!["hello".to_string()]);
        assert_eq!(codec.remaining(), b"wor");

        let frames = codec.feed(b"ld\n").unwrap();
        assert_eq!(frames, vec!["world".to_string()]);
        assert!(codec.remaining().is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_feed() {
        let mut codec = FrameCodec::new();
        let frames = codec.feed(b"a\nb\nc\n").unwrap();
        assert_eq!(frames, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_frames_skipped() {
        let mut codec = FrameCodec::new();
        let frames = codec.feed(b"a\n\n\nb\n\r\n").unwrap();
        assert_eq!(frames, vec!["a", "b"]);
    }

    #[test]
    fn test_carriage_return_stripped() {
        let mut codec = FrameCodec::new();
        let frames = codec.feed(b"ping\r\n").unwrap();
        assert_eq!(frames, vec!["ping"]);
    }

    #[test]
    fn test_invalid_utf8_decoded_lossily() {
        let mut codec = FrameCodec::new();
        let frames = codec.feed(b"ab\xff\xfecd\n").unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("ab"));
        assert!(frames[0].contains('\u{FFFD}'));
        assert!(frames[0].ends_with("cd"));
    }

    #[test]
    fn test_oversized_buffer_rejected() {
        let mut codec = FrameCodec::with_limit(16);
        assert!(codec.feed(b"0123456789").is_ok());
        let err = codec.feed(b"0123456789").unwrap_err();
        assert!(matches!(err, CoreError::FrameTooLarge { limit: 16 }));
    }

    #[test]
    fn test_cap_applies_to_tail_not_total_throughput() {
        // Many small frames may pass far more than the cap in total, as
        // long as no single unterminated frame exceeds it.
        let mut codec = FrameCodec::with_limit(16);
        for _ in 0..100 {
            let frames = codec.feed(b"0123456789\n").unwrap();
            assert_eq!(frames.len(), 1);
        }
    }

    #[test]
    fn test_split_invariance() {
        let input = b"first frame\nsecond\r\n\nthird with \xf0\x9f\xa6\x80 emoji\ntail";

        let mut whole = FrameCodec::new();
        let expected = whole.feed(input).unwrap();

        // Re-feed the same bytes one at a time.
        for chunk_size in [1, 2, 3, 7] {
            let mut codec = FrameCodec::new();
            let mut collected = Vec::new();
            for chunk in input.chunks(chunk_size) {
                collected.extend(codec.feed(chunk).unwrap());
            }
            assert_eq!(collected, expected, "chunk_size={chunk_size}");
            assert_eq!(codec.remaining(), whole.remaining());
        }
    }
}
