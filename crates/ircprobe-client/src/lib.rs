//! Simulated IRC client for the ircprobe harness.
//!
//! One [`SimClient`] is one protocol participant: it owns a single TCP
//! connection, runs a [`ClientScript`] in order, and returns an immutable
//! [`Transcript`] of everything it sent and observed.
//!
//! ## Architecture
//!
//! ```text
//! ircprobe-client
//!   ├─ SimClient      (connection + script runner)
//!   ├─ ClientScript   (ordered actions)
//!   ├─ SignalBoard    (cross-client readiness flags)
//!   └─ Transcript     (append-only while running, immutable after)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod endpoint;
mod error;
mod script;
mod signal;
mod transcript;

pub use client::{ClientConfig, SimClient, simulate};
pub use endpoint::{Endpoint, EndpointError};
pub use error::ClientError;
pub use script::{Action, ClientScript};
pub use signal::SignalBoard;
pub use transcript::{
    ClientId, ClientOutcome, Direction, Entry, Transcript, TranscriptRecorder,
};
