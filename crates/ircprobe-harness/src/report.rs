//! Human readable scenario report.
//!
//! Rendering is kept out of the classifier so the same [`Classification`]
//! can be printed, logged, or asserted on in tests. Received numeric replies
//! are tagged with their symbolic name, and each client header counts the
//! error replies (4xx and 5xx) it got.

use std::fmt;

use ircprobe_client::{Direction, Entry, Transcript};
use ircprobe_proto::{Message, numeric};

use crate::{
    classifier::{Classification, ClientObservation, Verdict},
    orchestrator::ScenarioRun,
};

/// Transcripts of a run and the verdict derived from them.
#[derive(Debug, Clone)]
pub struct Report {
    /// Captured transcripts.
    pub run: ScenarioRun,
    /// Verdict and per-client observations.
    pub classification: Classification,
}

impl Report {
    /// Final verdict.
    pub fn verdict(&self) -> &Verdict {
        &self.classification.verdict
    }

    /// Process exit code for this report.
    pub fn exit_code(&self) -> u8 {
        self.classification.verdict.exit_code
    }

    /// Transcript of `client`, if it was part of the run.
    pub fn transcript(&self, client: &str) -> Option<&Transcript> {
        self.run.transcripts.iter().find(|t| t.client() == client)
    }

    fn observation(&self, client: &str) -> Option<&ClientObservation> {
        self.classification.observations.iter().find(|o| o.client == client)
    }
}

/// Numeric code of a received line.
fn received_numeric(entry: &Entry) -> Option<u16> {
    if entry.direction != Direction::Received {
        return None;
    }
    Message::parse(&entry.line).ok()?.numeric()
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== scenario {} ({:.2?}) ===", self.run.name, self.run.elapsed)?;

        for transcript in &self.run.transcripts {
            let errors = transcript
                .entries()
                .iter()
                .filter_map(received_numeric)
                .filter(|code| numeric::is_error(*code))
                .count();

            writeln!(f)?;
            write!(
                f,
                "--- {} @ {}: {} ({} lines",
                transcript.client(),
                transcript.endpoint(),
                transcript.outcome(),
                transcript.entries().len()
            )?;
            if errors > 0 {
                write!(f, ", {errors} error replies")?;
            }
            writeln!(f, ") ---")?;

            for entry in transcript.entries() {
                let arrow = match entry.direction {
                    Direction::Sent => ">>",
                    Direction::Received => "<<",
                };
                write!(f, "  [{:>6}ms] {arrow} {}", entry.elapsed.as_millis(), entry.line)?;
                if let Some(name) = received_numeric(entry).and_then(numeric::name) {
                    write!(f, "  ({name})")?;
                }
                writeln!(f)?;
            }
            if let Some(observation) = self.observation(transcript.client()) {
                let results: Vec<String> = observation
                    .results
                    .iter()
                    .map(|(name, holds)| format!("{name}={holds}"))
                    .collect();
                if !results.is_empty() {
                    writeln!(f, "  observed: {}", results.join(" "))?;
                }
            }
        }

        writeln!(f)?;
        writeln!(f, "{}", self.classification.verdict)
    }
}
