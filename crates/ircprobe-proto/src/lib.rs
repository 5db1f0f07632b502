//! Wire layer for the ircprobe conformance harness.
//!
//! - [`codec`]: incremental CRLF line decoding over a byte stream
//! - [`message`]: forgiving IRC line parser and outbound command formatting
//! - [`numeric`]: numeric reply codes matched by verdict predicates
//! - [`pattern`]: per-line predicates shared by scripts and the classifier

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod message;
pub mod numeric;
pub mod pattern;

pub use codec::{Drain, LineBuffer, decode_all};
pub use message::{Command, Message, ParseError};
pub use pattern::Pattern;
