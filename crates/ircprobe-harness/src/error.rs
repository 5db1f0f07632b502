//! Harness error types.
//!
//! Only a plan that cannot be run is an error. Everything that goes wrong
//! while clients run is captured in their transcripts instead.

use ircprobe_client::ClientId;
use ircprobe_proto::ParseError;
use thiserror::Error;

/// A scenario that cannot be constructed or run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// The plan has no clients.
    #[error("scenario has no clients")]
    NoClients,

    /// Two clients share an id.
    #[error("duplicate client id {0:?}")]
    DuplicateClient(ClientId),

    /// A client waits on a signal no client raises.
    #[error("client {client:?} waits on signal {name:?} that no client raises")]
    UnknownSignal {
        /// Waiting client.
        client: ClientId,
        /// Signal name.
        name: String,
    },

    /// A scripted command cannot be sent.
    #[error("client {client:?} has an invalid command: {source}")]
    InvalidCommand {
        /// Offending client.
        client: ClientId,
        /// Formatting error.
        #[source]
        source: ParseError,
    },

    /// The ceiling timeout is zero.
    #[error("ceiling timeout must be greater than zero")]
    ZeroCeiling,

    /// A verdict rule names a client that is not in the plan.
    #[error("verdict rule refers to unknown client {0:?}")]
    UnknownClient(ClientId),

    /// A verdict rule names an undefined predicate.
    #[error("verdict rule refers to unknown predicate {0:?}")]
    UnknownPredicate(String),

    /// A scenario parameter is unusable.
    #[error("invalid {field}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PlanError::UnknownSignal { client: "leaf".into(), name: "hub-joined".into() };
        assert_eq!(
            err.to_string(),
            "client \"leaf\" waits on signal \"hub-joined\" that no client raises"
        );
        let err = PlanError::InvalidParameter { field: "nick", reason: "empty".into() };
        assert_eq!(err.to_string(), "invalid nick: empty");
    }
}
