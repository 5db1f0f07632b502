//! Fuzz target for [`LineBuffer`] framing
//!
//! # Strategy
//!
//! - Arbitrary bytes, including invalid UTF-8, bare CR, and NUL
//! - Arbitrary chunk boundaries, so terminators land split across reads
//!
//! # Invariants
//!
//! - Chunking never changes the decoded lines
//! - No decoded line contains LF
//! - `finish` after draining yields at most the unterminated tail, once
//! - NEVER panic on any input

#![no_main]

use arbitrary::Arbitrary;
use ircprobe_proto::{LineBuffer, decode_all};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    bytes: Vec<u8>,
    cuts: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let expected = decode_all(&input.bytes);

    let mut buffer = LineBuffer::new();
    let mut lines = Vec::new();
    let mut rest = input.bytes.as_slice();
    for cut in input.cuts {
        if rest.is_empty() {
            break;
        }
        let at = usize::from(cut) % (rest.len() + 1);
        let (chunk, tail) = rest.split_at(at);
        buffer.extend(chunk);
        lines.extend(buffer.drain());
        rest = tail;
    }
    buffer.extend(rest);
    lines.extend(buffer.drain());
    lines.extend(buffer.finish());

    assert_eq!(lines, expected, "chunking changed the decoded lines");
    assert!(lines.iter().all(|line| !line.contains('\n')));
    assert_eq!(buffer.finish(), None);
    assert!(buffer.is_empty());
});
