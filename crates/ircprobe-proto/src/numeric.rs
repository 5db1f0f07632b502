//! Numeric reply codes (RFC 1459 / RFC 2812) the harness matches on.

/// Registration accepted.
pub const RPL_WELCOME: u16 = 1;
/// Host information, second line of the welcome burst.
pub const RPL_YOURHOST: u16 = 2;
/// Server creation date.
pub const RPL_CREATED: u16 = 3;
/// Server name, version and modes.
pub const RPL_MYINFO: u16 = 4;
/// Feature advertisement.
pub const RPL_ISUPPORT: u16 = 5;
/// Channel topic on join.
pub const RPL_TOPIC: u16 = 332;
/// Channel member list chunk.
pub const RPL_NAMREPLY: u16 = 353;
/// End of channel member list, last line of a successful join.
pub const RPL_ENDOFNAMES: u16 = 366;
/// End of message of the day.
pub const RPL_ENDOFMOTD: u16 = 376;
/// Target nick or channel does not exist.
pub const ERR_NOSUCHNICK: u16 = 401;
/// No such channel.
pub const ERR_NOSUCHCHANNEL: u16 = 403;
/// Not allowed to send to the channel.
pub const ERR_CANNOTSENDTOCHAN: u16 = 404;
/// Unknown command.
pub const ERR_UNKNOWNCOMMAND: u16 = 421;
/// NICK without argument.
pub const ERR_NONICKNAMEGIVEN: u16 = 431;
/// Nick contains invalid characters.
pub const ERR_ERRONEUSNICKNAME: u16 = 432;
/// Nick already claimed by another client.
pub const ERR_NICKNAMEINUSE: u16 = 433;
/// Nick collision across linked servers.
pub const ERR_NICKCOLLISION: u16 = 436;
/// Command requires registration.
pub const ERR_NOTREGISTERED: u16 = 451;
/// Missing parameters.
pub const ERR_NEEDMOREPARAMS: u16 = 461;
/// Second USER after registration.
pub const ERR_ALREADYREGISTERED: u16 = 462;

/// True for 4xx and 5xx codes.
pub fn is_error(code: u16) -> bool {
    (400..600).contains(&code)
}

/// Symbolic name for a known code, used in transcript summaries.
pub fn name(code: u16) -> Option<&'static str> {
    Some(match code {
        RPL_WELCOME => "RPL_WELCOME",
        RPL_YOURHOST => "RPL_YOURHOST",
        RPL_CREATED => "RPL_CREATED",
        RPL_MYINFO => "RPL_MYINFO",
        RPL_ISUPPORT => "RPL_ISUPPORT",
        RPL_TOPIC => "RPL_TOPIC",
        RPL_NAMREPLY => "RPL_NAMREPLY",
        RPL_ENDOFNAMES => "RPL_ENDOFNAMES",
        RPL_ENDOFMOTD => "RPL_ENDOFMOTD",
        ERR_NOSUCHNICK => "ERR_NOSUCHNICK",
        ERR_NOSUCHCHANNEL => "ERR_NOSUCHCHANNEL",
        ERR_CANNOTSENDTOCHAN => "ERR_CANNOTSENDTOCHAN",
        ERR_UNKNOWNCOMMAND => "ERR_UNKNOWNCOMMAND",
        ERR_NONICKNAMEGIVEN => "ERR_NONICKNAMEGIVEN",
        ERR_ERRONEUSNICKNAME => "ERR_ERRONEUSNICKNAME",
        ERR_NICKNAMEINUSE => "ERR_NICKNAMEINUSE",
        ERR_NICKCOLLISION => "ERR_NICKCOLLISION",
        ERR_NOTREGISTERED => "ERR_NOTREGISTERED",
        ERR_NEEDMOREPARAMS => "ERR_NEEDMOREPARAMS",
        ERR_ALREADYREGISTERED => "ERR_ALREADYREGISTERED",
        _ => return None,
    })
}
