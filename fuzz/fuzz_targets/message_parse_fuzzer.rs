//! Fuzz target for [`Message::parse`] and [`Pattern`] matching
//!
//! Server replies are untrusted input; the classifier runs every pattern
//! over every received line.
//!
//! # Invariants
//!
//! - NEVER panic on any line
//! - A parsed command is non-empty and uppercase
//! - `numeric` is only set for exactly three ASCII digits
//! - `Pattern::Numeric` agrees with `Message::numeric`

#![no_main]

use ircprobe_proto::{Message, Pattern};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|line: &str| {
    let Ok(message) = Message::parse(line) else {
        assert!(!Pattern::Numeric(1).matches(line));
        return;
    };

    assert!(!message.command.is_empty());
    assert_eq!(message.command, message.command.to_ascii_uppercase());

    if let Some(code) = message.numeric() {
        assert_eq!(message.command.len(), 3);
        assert!(message.command.bytes().all(|b| b.is_ascii_digit()));
        assert!(Pattern::Numeric(code).matches(line));
    }

    let _ = message.source_nick();
    let _ = Pattern::contains(line).matches(line);
    let _ = Pattern::names("#c", "nick").matches(line);
});
