//! Line patterns.
//!
//! A pattern is tested against one decoded line at a time. Structured
//! patterns parse the line first so that unrelated traffic (for example a
//! PRIVMSG whose text happens to contain " 433 ") does not match. Use
//! [`Pattern::Contains`] for servers whose replies do not parse.

use std::fmt;

use crate::{message::Message, numeric::RPL_NAMREPLY};

/// Membership prefixes a names reply may put in front of a nick.
const MEMBER_PREFIXES: &[char] = &['~', '&', '@', '%', '+'];

/// A predicate over a single received line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Raw substring match.
    Contains(String),
    /// Numeric reply with this code.
    Numeric(u16),
    /// Command name, case insensitive (`JOIN`, `PRIVMSG`, ...).
    Command(String),
    /// Command sent by the given nick, e.g. a relayed `PRIVMSG`.
    CommandFrom {
        /// Command name, case insensitive.
        command: String,
        /// Source nick from the prefix.
        nick: String,
    },
    /// Names reply (353) for `channel` that lists `nick`, ignoring case and
    /// membership prefixes such as `@`.
    Names {
        /// Channel the reply is for.
        channel: String,
        /// Nick that must be listed.
        nick: String,
    },
}

impl Pattern {
    /// Substring pattern.
    pub fn contains(needle: impl Into<String>) -> Self {
        Self::Contains(needle.into())
    }

    /// Test a single line.
    pub fn matches(&self, line: &str) -> bool {
        match self {
            Self::Contains(needle) => line.contains(needle.as_str()),
            Self::Numeric(code) => {
                Message::parse(line).is_ok_and(|msg| msg.numeric() == Some(*code))
            },
            Self::Command(command) => {
                Message::parse(line).is_ok_and(|msg| msg.command.eq_ignore_ascii_case(command))
            },
            Self::CommandFrom { command, nick } => Message::parse(line).is_ok_and(|msg| {
                msg.command.eq_ignore_ascii_case(command)
                    && msg.source_nick().is_some_and(|source| source.eq_ignore_ascii_case(nick))
            }),
            Self::Names { channel, nick } => Message::parse(line).is_ok_and(|msg| {
                msg.numeric() == Some(RPL_NAMREPLY)
                    && msg.params.iter().any(|p| p.eq_ignore_ascii_case(channel))
                    && msg.trailing().is_some_and(|names| {
                        names
                            .split_whitespace()
                            .map(|n| n.trim_start_matches(MEMBER_PREFIXES))
                            .any(|n| n.eq_ignore_ascii_case(nick))
                    })
            }),
        }
    }

    /// Names-reply pattern.
    pub fn names(channel: impl Into<String>, nick: impl Into<String>) -> Self {
        Self::Names { channel: channel.into(), nick: nick.into() }
    }

    /// True if any pattern matches the line.
    pub fn any_matches(patterns: &[Self], line: &str) -> bool {
        patterns.iter().any(|p| p.matches(line))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contains(needle) => write!(f, "contains {needle:?}"),
            Self::Numeric(code) => write!(f, "numeric {code:03}"),
            Self::Command(command) => write!(f, "command {command}"),
            Self::CommandFrom { command, nick } => write!(f, "{command} from {nick}"),
            Self::Names { channel, nick } => write!(f, "{nick} in names of {channel}"),
        }
    }
}
