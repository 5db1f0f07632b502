//! Captured transcripts.
//!
//! A [`TranscriptRecorder`] is owned by exactly one client while it runs and
//! only ever appends. [`TranscriptRecorder::finish`] consumes it into an
//! immutable [`Transcript`], which is what the orchestrator and classifier
//! see. Entry order is wire arrival order and is never changed downstream.

use std::{fmt, time::Duration};

use tokio::time::Instant;

use crate::endpoint::Endpoint;

/// Client identifier, unique within a scenario.
pub type ClientId = String;

/// Which way a line travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Written by the client.
    Sent,
    /// Decoded from the server's byte stream.
    Received,
}

/// One recorded line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Position in the transcript, starting at 0.
    pub seq: usize,
    /// Time since the connection was established.
    pub elapsed: Duration,
    /// Direction of travel.
    pub direction: Direction,
    /// Line without its terminator.
    pub line: String,
}

/// Terminal state of a simulated client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientOutcome {
    /// Script finished and the listen window elapsed.
    Completed,
    /// The server closed the stream; captured lines are complete.
    PeerClosed,
    /// TCP connect was refused or did not finish in time.
    ConnectFailed(String),
    /// Read or write failed after the connection was established.
    IoFailed(String),
    /// The client hit its scenario deadline and was cancelled.
    TimedOut,
    /// The script could not continue (e.g. a readiness signal never came).
    Aborted(String),
}

impl ClientOutcome {
    /// True if the client ran its script to the end.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed | Self::PeerClosed)
    }

    /// Short stable label, used by verdict conditions and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::PeerClosed => "peer-closed",
            Self::ConnectFailed(_) => "connect-failed",
            Self::IoFailed(_) => "io-failed",
            Self::TimedOut => "timed-out",
            Self::Aborted(_) => "aborted",
        }
    }
}

impl fmt::Display for ClientOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed(reason) | Self::IoFailed(reason) | Self::Aborted(reason) => {
                write!(f, "{}: {reason}", self.label())
            },
            _ => f.write_str(self.label()),
        }
    }
}

/// Append-only recorder owned by a running client.
#[derive(Debug)]
pub struct TranscriptRecorder {
    client: ClientId,
    endpoint: Endpoint,
    started: Instant,
    entries: Vec<Entry>,
}

impl TranscriptRecorder {
    /// Start recording; elapsed times are measured from now.
    pub fn new(client: ClientId, endpoint: Endpoint) -> Self {
        Self { client, endpoint, started: Instant::now(), entries: Vec::new() }
    }

    /// Append a line.
    pub fn record(&mut self, direction: Direction, line: String) {
        let seq = self.entries.len();
        self.entries.push(Entry { seq, elapsed: self.started.elapsed(), direction, line });
    }

    /// Number of lines recorded so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Seal the transcript with its terminal state.
    pub fn finish(self, outcome: ClientOutcome) -> Transcript {
        Transcript { client: self.client, endpoint: self.endpoint, entries: self.entries, outcome }
    }
}

/// Immutable record of everything one client observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    client: ClientId,
    endpoint: Endpoint,
    entries: Vec<Entry>,
    outcome: ClientOutcome,
}

impl Transcript {
    /// Transcript of a client that never got a connection, or whose task was
    /// cancelled before it could hand back its own recording.
    pub fn empty(client: ClientId, endpoint: Endpoint, outcome: ClientOutcome) -> Self {
        Self { client, endpoint, entries: Vec::new(), outcome }
    }

    /// Build a transcript from received lines, for fixtures and replay.
    pub fn from_received<I, S>(
        client: impl Into<ClientId>,
        lines: I,
        outcome: ClientOutcome,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = lines
            .into_iter()
            .enumerate()
            .map(|(seq, line)| Entry {
                seq,
                elapsed: Duration::ZERO,
                direction: Direction::Received,
                line: line.into(),
            })
            .collect();
        Self {
            client: client.into(),
            endpoint: Endpoint::new("fixture", 6667),
            entries,
            outcome,
        }
    }

    /// Client identifier.
    pub fn client(&self) -> &str {
        &self.client
    }

    /// Server this client talked to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// All entries in wire order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Lines received from the server, in arrival order.
    pub fn received(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .iter()
            .filter(|e| e.direction == Direction::Received)
            .map(|e| e.line.as_str())
    }

    /// Terminal state.
    pub fn outcome(&self) -> &ClientOutcome {
        &self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recorder_assigns_sequence_in_order() {
        let mut recorder = TranscriptRecorder::new("c1".into(), Endpoint::new("localhost", 6667));
        recorder.record(Direction::Sent, "NICK alice".into());
        recorder.record(Direction::Received, ":s 001 alice :Welcome".into());
        recorder.record(Direction::Received, ":s 002 alice :Host".into());
        assert_eq!(recorder.len(), 3);

        let transcript = recorder.finish(ClientOutcome::Completed);
        let seqs: Vec<usize> = transcript.entries().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(transcript.received().collect::<Vec<_>>(), vec![
            ":s 001 alice :Welcome",
            ":s 002 alice :Host"
        ]);
        assert!(transcript.entries().windows(2).all(|w| w[0].elapsed <= w[1].elapsed));
    }

    #[test]
    fn fixture_keeps_duplicates_and_order() {
        let transcript =
            Transcript::from_received("c1", ["b", "a", "b"], ClientOutcome::Completed);
        assert_eq!(transcript.received().collect::<Vec<_>>(), vec!["b", "a", "b"]);
    }

    #[test]
    fn outcome_labels() {
        assert!(ClientOutcome::PeerClosed.is_completed());
        assert!(!ClientOutcome::TimedOut.is_completed());
        assert_eq!(
            ClientOutcome::ConnectFailed("refused".into()).to_string(),
            "connect-failed: refused"
        );
        assert_eq!(ClientOutcome::TimedOut.to_string(), "timed-out");
    }
}
