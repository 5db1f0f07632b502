//! Incremental line decoder.
//!
//! IRC is line oriented but TCP is not: one read may carry half a line,
//! several lines, or a CRLF split between two reads. [`LineBuffer`]
//! accumulates raw bytes and hands out complete lines only.
//!
//! # Invariants
//!
//! - Chunk-boundary invariance: the decoded sequence depends only on the
//!   concatenation of the fed bytes, never on how they were split into reads.
//! - Lossless close: [`LineBuffer::finish`] yields undelimited trailing bytes
//!   exactly once.
//! - Infallible: invalid UTF-8 is replaced with `U+FFFD`, the surrounding
//!   lines are unaffected.

use bytes::BytesMut;

/// Byte that terminates a line.
pub const LINE_FEED: u8 = b'\n';

/// Optional byte preceding [`LINE_FEED`], stripped from decoded lines.
pub const CARRIAGE_RETURN: u8 = b'\r';

/// Default initial capacity, enough for a handful of 512-byte IRC lines.
const DEFAULT_CAPACITY: usize = 4096;

/// Accumulates raw bytes and yields decoded, terminator-stripped lines.
#[derive(Debug)]
pub struct LineBuffer {
    buf: BytesMut,
    /// Prefix of `buf` already searched for a terminator.
    scanned: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty buffer with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: BytesMut::with_capacity(capacity), scanned: 0 }
    }

    /// Append a chunk read from the wire.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete line, if one is buffered.
    ///
    /// The `\n` terminator and a single `\r` directly before it are removed.
    pub fn next_line(&mut self) -> Option<String> {
        let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == LINE_FEED) else {
            self.scanned = self.buf.len();
            return None;
        };

        let raw = self.buf.split_to(self.scanned + offset + 1);
        self.scanned = 0;

        Some(decode(&raw[..raw.len() - 1]))
    }

    /// Lazily drain every complete line currently buffered.
    pub fn drain(&mut self) -> Drain<'_> {
        Drain { buffer: self }
    }

    /// Flush the undelimited tail once the peer has closed the stream.
    ///
    /// Returns `None` when nothing but an optional `\r` is left. A second call
    /// always returns `None`.
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.buf.is_empty() {
            return None;
        }

        let raw = self.buf.split();
        let line = decode(&raw);
        if line.is_empty() { None } else { Some(line) }
    }

    /// Number of buffered bytes not yet returned as a line.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// True if no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Iterator returned by [`LineBuffer::drain`].
#[derive(Debug)]
pub struct Drain<'a> {
    buffer: &'a mut LineBuffer,
}

impl Iterator for Drain<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.next_line()
    }
}

fn decode(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(&[CARRIAGE_RETURN]).unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Decode a complete byte stream in one pass, including the closing flush.
///
/// Reference decoder for tests and for callers that already hold the whole
/// stream.
pub fn decode_all(bytes: &[u8]) -> Vec<String> {
    let mut buffer = LineBuffer::new();
    buffer.extend(bytes);
    let mut lines: Vec<String> = buffer.drain().collect();
    lines.extend(buffer.finish());
    lines
}
