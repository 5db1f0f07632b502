//! Client error types.

use std::time::Duration;

use ircprobe_proto::ParseError;
use thiserror::Error;

use crate::{endpoint::Endpoint, transcript::ClientOutcome};

/// Errors from simulated client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The peer refused or the address did not resolve.
    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        /// Server the client tried to reach.
        endpoint: Endpoint,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The TCP handshake did not complete in time.
    #[error("connect to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Server the client tried to reach.
        endpoint: Endpoint,
        /// Configured connect timeout.
        timeout: Duration,
    },

    /// Read or write failed on an established connection.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The server closed the stream.
    #[error("connection closed by peer")]
    Closed,

    /// A scripted command could not be put on the wire.
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] ParseError),

    /// The script refers to a signal the scenario never declared.
    #[error("unknown signal {name:?}")]
    UnknownSignal {
        /// Signal name.
        name: String,
    },

    /// A readiness signal was not raised in time.
    #[error("signal {name:?} not raised within {timeout:?}")]
    SignalTimeout {
        /// Signal name.
        name: String,
        /// Configured wait.
        timeout: Duration,
    },
}

impl ClientError {
    /// Returns true if the client never got a connection.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::ConnectTimeout { .. })
    }

    /// Terminal state this error leaves the client in.
    pub fn outcome(&self) -> ClientOutcome {
        match self {
            Self::Connect { .. } | Self::ConnectTimeout { .. } => {
                ClientOutcome::ConnectFailed(self.to_string())
            },
            Self::Io(err) => ClientOutcome::IoFailed(err.to_string()),
            Self::Closed => ClientOutcome::PeerClosed,
            Self::InvalidCommand(_) | Self::UnknownSignal { .. } | Self::SignalTimeout { .. } => {
                ClientOutcome::Aborted(self.to_string())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_errors_map_to_connect_failed() {
        let err = ClientError::ConnectTimeout {
            endpoint: Endpoint::new("10.255.255.1", 6667),
            timeout: Duration::from_millis(200),
        };
        assert!(err.is_connect_failure());
        assert!(matches!(err.outcome(), ClientOutcome::ConnectFailed(_)));
    }

    #[test]
    fn io_error_is_not_a_connect_failure() {
        let err = ClientError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(!err.is_connect_failure());
        assert!(matches!(err.outcome(), ClientOutcome::IoFailed(_)));
    }

    #[test]
    fn closed_is_clean() {
        assert_eq!(ClientError::Closed.outcome(), ClientOutcome::PeerClosed);
    }

    #[test]
    fn signal_timeout_aborts() {
        let err = ClientError::SignalTimeout {
            name: "hub-joined".into(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(err.to_string(), "signal \"hub-joined\" not raised within 1s");
        assert!(matches!(err.outcome(), ClientOutcome::Aborted(_)));
    }
}
