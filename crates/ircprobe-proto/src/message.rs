//! IRC message model.
//!
//! Parsing is deliberately forgiving: the harness observes servers under
//! development, so a line that does not follow RFC 1459 grammar is still
//! recorded verbatim and matched by substring. [`Message::parse`] only fails
//! when there is no command at all.

use std::fmt;

use thiserror::Error;

/// Errors from parsing or formatting IRC lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line was empty or whitespace only.
    #[error("empty line")]
    Empty,

    /// A prefix was present but no command followed it.
    #[error("missing command after prefix")]
    MissingCommand,

    /// An outbound argument contained CR, LF or NUL.
    #[error("argument contains a line terminator: {0:?}")]
    EmbeddedNewline(String),
}

/// A parsed IRC line: `[:prefix] COMMAND [params] [:trailing]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sender, without the leading `:`.
    pub prefix: Option<String>,
    /// Command name, uppercased. Numeric replies keep their three digits.
    pub command: String,
    /// Middle parameters followed by the trailing parameter, if any.
    pub params: Vec<String>,
}

impl Message {
    /// Parse a single decoded line (terminator already stripped).
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut rest = line.trim_start_matches(' ');
        if rest.trim_end().is_empty() {
            return Err(ParseError::Empty);
        }

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, tail) = stripped.split_once(' ').ok_or(ParseError::MissingCommand)?;
            rest = tail.trim_start_matches(' ');
            Some(prefix.to_string())
        } else {
            None
        };

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, tail)) => (command, tail),
            None => (rest, ""),
        };
        if command.is_empty() {
            return Err(ParseError::MissingCommand);
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, tail)) => {
                    params.push(param.to_string());
                    rest = tail;
                },
                None => {
                    params.push(rest.to_string());
                    break;
                },
            }
        }

        Ok(Self { prefix, command: command.to_ascii_uppercase(), params })
    }

    /// Numeric reply code, if the command is exactly three ASCII digits.
    pub fn numeric(&self) -> Option<u16> {
        let bytes = self.command.as_bytes();
        if bytes.len() == 3 && bytes.iter().all(u8::is_ascii_digit) {
            self.command.parse().ok()
        } else {
            None
        }
    }

    /// Parameter at `index`, if present.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Last parameter, which is the human readable text of most replies.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Nickname part of the prefix (`nick!user@host` -> `nick`).
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix.as_deref().map(|p| p.split(['!', '@']).next().unwrap_or(p))
    }
}

/// Commands the harness sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `NICK <nickname>`
    Nick(String),
    /// `USER <username> 0 * :<realname>`
    User {
        /// Username.
        username: String,
        /// Real name, sent as the trailing parameter.
        realname: String,
    },
    /// `JOIN <channel>`
    Join(String),
    /// `PRIVMSG <target> :<text>`
    Privmsg {
        /// Channel or nickname.
        target: String,
        /// Message text.
        text: String,
    },
    /// `PONG :<token>`
    Pong(String),
    /// `QUIT :<reason>`
    Quit(String),
    /// Preformatted line, sent as is.
    Raw(String),
}

impl Command {
    /// Format as a CRLF terminated wire line.
    pub fn to_line(&self) -> Result<String, ParseError> {
        let body = self.to_string();
        if body.bytes().any(|b| matches!(b, b'\r' | b'\n' | 0)) {
            return Err(ParseError::EmbeddedNewline(body));
        }
        Ok(format!("{body}\r\n"))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nick(nick) => write!(f, "NICK {nick}"),
            Self::User { username, realname } => write!(f, "USER {username} 0 * :{realname}"),
            Self::Join(channel) => write!(f, "JOIN {channel}"),
            Self::Privmsg { target, text } => write!(f, "PRIVMSG {target} :{text}"),
            Self::Pong(token) => write!(f, "PONG :{token}"),
            Self::Quit(reason) => write!(f, "QUIT :{reason}"),
            Self::Raw(line) => f.write_str(line),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_numeric_reply() {
        let msg = Message::parse(":irc.test 001 alice :Welcome to the network alice").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("irc.test"));
        assert_eq!(msg.command, "001");
        assert_eq!(msg.numeric(), Some(1));
        assert_eq!(msg.param(0), Some("alice"));
        assert_eq!(msg.trailing(), Some("Welcome to the network alice"));
    }

    #[test]
    fn parses_nick_in_use() {
        let msg = Message::parse(":irc.test 433 * alice :Nickname is already in use").unwrap();
        assert_eq!(msg.numeric(), Some(433));
        assert_eq!(msg.params, vec!["*", "alice", "Nickname is already in use"]);
    }

    #[test]
    fn parses_relayed_privmsg() {
        let msg =
            Message::parse(":leafuser!leafuser@leaf PRIVMSG #test :Hello from LEAF!").unwrap();
        assert_eq!(msg.source_nick(), Some("leafuser"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.numeric(), None);
        assert_eq!(msg.params, vec!["#test", "Hello from LEAF!"]);
    }

    #[test]
    fn command_is_uppercased_and_spaces_collapsed() {
        let msg = Message::parse("ping   :abc").unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["abc"]);
    }

    #[test]
    fn command_without_params() {
        let msg = Message::parse("QUIT").unwrap();
        assert!(msg.params.is_empty());
        assert!(msg.prefix.is_none());
    }

    #[test]
    fn rejects_empty_and_prefix_only() {
        assert_eq!(Message::parse(""), Err(ParseError::Empty));
        assert_eq!(Message::parse("   "), Err(ParseError::Empty));
        assert_eq!(Message::parse(":irc.test"), Err(ParseError::MissingCommand));
        assert_eq!(Message::parse(":irc.test   "), Err(ParseError::MissingCommand));
    }

    #[test]
    fn four_digit_command_is_not_numeric() {
        let msg = Message::parse(":s 0010 x").unwrap();
        assert_eq!(msg.numeric(), None);
    }

    #[test]
    fn formats_registration_commands() {
        assert_eq!(Command::Nick("alice".into()).to_line().unwrap(), "NICK alice\r\n");
        let user = Command::User { username: "alice".into(), realname: "Test User".into() };
        assert_eq!(user.to_line().unwrap(), "USER alice 0 * :Test User\r\n");
        let msg = Command::Privmsg { target: "#test".into(), text: "Hello from HUB!".into() };
        assert_eq!(msg.to_line().unwrap(), "PRIVMSG #test :Hello from HUB!\r\n");
    }

    #[test]
    fn rejects_embedded_newline() {
        let result = Command::Privmsg { target: "#c".into(), text: "a\r\nQUIT".into() }.to_line();
        assert!(matches!(result, Err(ParseError::EmbeddedNewline(_))));
    }

    proptest! {
        #[test]
        fn prop_parse_never_panics(line in "\\PC{0,128}") {
            let _ = Message::parse(&line);
        }

        #[test]
        fn prop_numeric_roundtrip(code in 0u16..1000, nick in "[a-z]{1,9}") {
            let line = format!(":srv {code:03} {nick} :text");
            let msg = Message::parse(&line).unwrap();
            prop_assert_eq!(msg.numeric(), Some(code));
            prop_assert_eq!(msg.param(0), Some(nick.as_str()));
        }
    }
}
