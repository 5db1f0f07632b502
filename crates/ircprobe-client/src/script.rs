//! Client scripts.
//!
//! A [`ClientScript`] is an ordered list of [`Action`]s, built once by the
//! scenario and shared read-only with the client that runs it.

use std::time::Duration;

use ircprobe_proto::{Command, Pattern};

/// One step of a client script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write a command and move on without waiting for a reply.
    Send(Command),

    /// Record whatever arrives for up to this long. Ends early once the
    /// server has been quiet for a full read timeout.
    Listen(Duration),

    /// Record until a line matching any pattern arrives, or `timeout`
    /// elapses. Missing the pattern is not an error.
    Expect {
        /// Patterns that end the wait.
        any_of: Vec<Pattern>,
        /// Upper bound on the wait.
        timeout: Duration,
    },

    /// Pause without reading. Only for deliberate offsets.
    Sleep(Duration),

    /// Raise a readiness signal other clients may wait on.
    Signal(String),

    /// Block until another client raises `name`. The script is aborted if it
    /// is not raised within `timeout`.
    AwaitSignal {
        /// Signal name.
        name: String,
        /// Upper bound on the wait.
        timeout: Duration,
    },
}

/// Ordered, immutable sequence of actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientScript {
    actions: Vec<Action>,
}

impl ClientScript {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an arbitrary action.
    #[must_use]
    pub fn then(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// `NICK <nick>`
    #[must_use]
    pub fn nick(self, nick: impl Into<String>) -> Self {
        self.then(Action::Send(Command::Nick(nick.into())))
    }

    /// `USER <username> 0 * :<realname>`
    #[must_use]
    pub fn user(self, username: impl Into<String>, realname: impl Into<String>) -> Self {
        self.then(Action::Send(Command::User {
            username: username.into(),
            realname: realname.into(),
        }))
    }

    /// `JOIN <channel>`
    #[must_use]
    pub fn join(self, channel: impl Into<String>) -> Self {
        self.then(Action::Send(Command::Join(channel.into())))
    }

    /// `PRIVMSG <target> :<text>`
    #[must_use]
    pub fn privmsg(self, target: impl Into<String>, text: impl Into<String>) -> Self {
        self.then(Action::Send(Command::Privmsg { target: target.into(), text: text.into() }))
    }

    /// Preformatted line.
    #[must_use]
    pub fn raw(self, line: impl Into<String>) -> Self {
        self.then(Action::Send(Command::Raw(line.into())))
    }

    /// Bounded listen.
    #[must_use]
    pub fn listen(self, duration: Duration) -> Self {
        self.then(Action::Listen(duration))
    }

    /// Wait for any of `patterns`.
    #[must_use]
    pub fn expect(self, any_of: Vec<Pattern>, timeout: Duration) -> Self {
        self.then(Action::Expect { any_of, timeout })
    }

    /// Pause without reading.
    #[must_use]
    pub fn sleep(self, duration: Duration) -> Self {
        self.then(Action::Sleep(duration))
    }

    /// Raise a readiness signal.
    #[must_use]
    pub fn signal(self, name: impl Into<String>) -> Self {
        self.then(Action::Signal(name.into()))
    }

    /// Wait for a readiness signal.
    #[must_use]
    pub fn await_signal(self, name: impl Into<String>, timeout: Duration) -> Self {
        self.then(Action::AwaitSignal { name: name.into(), timeout })
    }

    /// Actions in execution order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// True if the script has no actions.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Names of signals this script raises.
    pub fn raised_signals(&self) -> impl Iterator<Item = &str> + '_ {
        self.actions.iter().filter_map(|a| match a {
            Action::Signal(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Names of signals this script waits on.
    pub fn awaited_signals(&self) -> impl Iterator<Item = &str> + '_ {
        self.actions.iter().filter_map(|a| match a {
            Action::AwaitSignal { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Commands this script sends, in order.
    pub fn commands(&self) -> impl Iterator<Item = &Command> + '_ {
        self.actions.iter().filter_map(|a| match a {
            Action::Send(command) => Some(command),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_preserves_order() {
        let script = ClientScript::new()
            .nick("alice")
            .user("alice", "Test User")
            .expect(vec![Pattern::Numeric(1)], Duration::from_secs(2))
            .join("#test")
            .signal("alice-joined");

        assert_eq!(script.len(), 5);
        assert_eq!(script.actions()[0], Action::Send(Command::Nick("alice".into())));
        assert!(matches!(script.actions()[2], Action::Expect { .. }));
        assert_eq!(script.raised_signals().collect::<Vec<_>>(), vec!["alice-joined"]);
        assert_eq!(script.awaited_signals().count(), 0);
        assert_eq!(script.commands().count(), 3);
    }

    #[test]
    fn awaited_signals_listed() {
        let script =
            ClientScript::new().await_signal("hub-joined", Duration::from_secs(1)).nick("b");
        assert_eq!(script.awaited_signals().collect::<Vec<_>>(), vec!["hub-joined"]);
    }
}
