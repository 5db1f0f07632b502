//! Cross-client readiness signals.
//!
//! One `watch` channel per declared name. Raising is idempotent and never
//! blocks. Waiting is bounded. The board is built before any client starts,
//! so the set of names is fixed for the whole scenario.

use std::{collections::HashMap, time::Duration};

use tokio::sync::watch;

use crate::error::ClientError;

/// Named one-shot flags shared by the clients of a scenario.
#[derive(Debug, Default)]
pub struct SignalBoard {
    signals: HashMap<String, watch::Sender<bool>>,
}

impl SignalBoard {
    /// Declare the given signal names, all initially lowered.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let signals =
            names.into_iter().map(|name| (name.into(), watch::Sender::new(false))).collect();
        Self { signals }
    }

    /// True if `name` was declared.
    pub fn contains(&self, name: &str) -> bool {
        self.signals.contains_key(name)
    }

    /// True if `name` has been raised.
    pub fn is_raised(&self, name: &str) -> bool {
        self.signals.get(name).is_some_and(|tx| *tx.borrow())
    }

    /// Raise `name`, waking every waiter.
    pub fn raise(&self, name: &str) -> Result<(), ClientError> {
        let tx = self.sender(name)?;
        tx.send_replace(true);
        Ok(())
    }

    /// Wait until `name` is raised, for at most `timeout`.
    pub async fn wait(&self, name: &str, timeout: Duration) -> Result<(), ClientError> {
        let mut rx = self.sender(name)?.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|raised| *raised)).await {
            Ok(Ok(_)) => Ok(()),
            // Senders live as long as the board, so a closed channel is
            // treated like a signal that never came.
            Ok(Err(_)) | Err(_) => {
                Err(ClientError::SignalTimeout { name: name.to_string(), timeout })
            },
        }
    }

    fn sender(&self, name: &str) -> Result<&watch::Sender<bool>, ClientError> {
        self.signals.get(name).ok_or_else(|| ClientError::UnknownSignal { name: name.to_string() })
    }
}
