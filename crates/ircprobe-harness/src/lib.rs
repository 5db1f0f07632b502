//! Concurrent conformance harness for IRC servers.
//!
//! Runs several simulated clients against one or more servers at once,
//! with controlled start offsets so their traffic interleaves at the server,
//! then judges the captured transcripts against a scenario's truth table.
//!
//! ## Architecture
//!
//! ```text
//! ircprobe-harness
//!   ├─ Scenario       (plan + truth table, built-in builders)
//!   ├─ Orchestrator   (connect phase, one task per client, deadlines)
//!   ├─ Classifier     (predicates over transcripts -> verdict)
//!   ├─ Report         (transcripts + verdict, human readable)
//!   ├─ Args           (CLI and environment)
//!   └─ MockServer     (in-process IRC server for tests)
//! ```
//!
//! Only an unrunnable plan is an error ([`PlanError`]). Connection failures,
//! timeouts, and closed streams end up in transcripts and usually produce an
//! inconclusive verdict.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classifier;
pub mod config;
mod error;
pub mod mock_server;
pub mod orchestrator;
pub mod report;
pub mod scenario;

pub use classifier::{
    Classification, ClientObservation, Cmp, Condition, ExitCodes, Predicate, Rule, TruthTable,
    Verdict, VerdictKind, classify,
};
pub use config::{Args, EXIT_CONFIG_ERROR};
pub use error::PlanError;
pub use mock_server::{Behavior, MockConfig, MockServer};
pub use orchestrator::{ClientSpec, Orchestrator, ScenarioPlan, ScenarioRun, StartGate, Timing};
pub use report::Report;
pub use scenario::{NickCollision, Routing, Scenario};
