//! Command types and parsing.

use std::fmt;
use std::time::Duration;

use crate::config::Policy;
use crate::transport::starts_with_command_name;

pub const SET_INTERVAL_USAGE: &str = "Usage: /setinterval <minutes>";
pub const SET_AUTO_REPLY_USAGE: &str = "Usage: /setautoreply <trigger> <response>";
pub const ADD_BAD_WORD_USAGE: &str = "Usage: /addbadword <word>";
pub const REMOVE_BAD_WORD_USAGE: &str = "Usage: /removebadword <word>";

/// Arguments for `/setautoreply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoReplyArgs {
    /// Lower-cased trigger (first argument).
    pub trigger: String,
    /// Remaining arguments joined by single spaces.
    pub response: String,
}

/// Admin commands understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Greeting.
    Start,

    /// Show the command list.
    Help,

    /// Replace the welcome template.
    SetWelcome(String),

    /// Replace the goodbye template.
    SetGoodbye(String),

    /// Replace the broadcast body.
    SetSchedule(String),

    /// Change the broadcast interval.
    SetInterval { minutes: u64 },

    /// Add a filter entry (normalized).
    AddBadWord(String),

    /// Remove a filter entry (normalized).
    RemoveBadWord(String),

    AutoReplyOn,

    AutoReplyOff,

    /// Set the auto-reply trigger and response.
    SetAutoReply(AutoReplyArgs),

    /// Show the current policy and scheduler state.
    Status,
}

/// Why a piece of text did not produce a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not a `/command`, or addressed to a different bot.
    NotACommand,

    /// A `/command` this bot does not know.
    Unknown(String),

    /// A known command with bad arguments; carries the usage line.
    Usage(&'static str),
}

impl BotCommand {
    /// Parses a full message such as `/setinterval 5` or
    /// `/help@guard_bot`.
    ///
    /// When `bot_username` is given, commands explicitly addressed to a
    /// different bot are ignored.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Result<Self, ParseError> {
        let rest = text
            .trim()
            .strip_prefix('/')
            .filter(|rest| starts_with_command_name(rest))
            .ok_or(ParseError::NotACommand)?;

        let mut parts = rest.split_whitespace();
        let head = parts.next().ok_or(ParseError::NotACommand)?;
        let args: Vec<&str> = parts.collect();

        let (name, mention) = split_mention(head);
        if let (Some(mention), Some(own)) = (mention, bot_username)
            && !mention.eq_ignore_ascii_case(own.trim_start_matches('@'))
        {
            return Err(ParseError::NotACommand);
        }

        Self::from_parts(name, &args)
    }

    /// Builds a command from an already split name and argument list.
    ///
    /// Command names are case-sensitive. A leading `/` and a trailing
    /// `@botname` on `name` are tolerated.
    pub fn from_parts<S: AsRef<str>>(name: &str, args: &[S]) -> Result<Self, ParseError> {
        let name = name.strip_prefix('/').unwrap_or(name);
        let (name, _) = split_mention(name);
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        let joined = args.join(" ");

        match name {
            "start" => Ok(Self::Start),
            "help" => Ok(Self::Help),
            "setwelcome" => Ok(Self::SetWelcome(joined)),
            "setgoodbye" => Ok(Self::SetGoodbye(joined)),
            "setschedule" => Ok(Self::SetSchedule(joined)),
            "setinterval" => args
                .first()
                .and_then(|arg| parse_minutes(arg))
                .map(|minutes| Self::SetInterval { minutes })
                .ok_or(ParseError::Usage(SET_INTERVAL_USAGE)),
            "addbadword" => non_empty_word(&joined)
                .map(Self::AddBadWord)
                .ok_or(ParseError::Usage(ADD_BAD_WORD_USAGE)),
            "removebadword" => non_empty_word(&joined)
                .map(Self::RemoveBadWord)
                .ok_or(ParseError::Usage(REMOVE_BAD_WORD_USAGE)),
            "autoreplyon" => Ok(Self::AutoReplyOn),
            "autoreplyoff" => Ok(Self::AutoReplyOff),
            "setautoreply" => match args.as_slice() {
                [trigger, response @ ..] if !response.is_empty() => {
                    Ok(Self::SetAutoReply(AutoReplyArgs {
                        trigger: Policy::normalize_word(trigger),
                        response: response.join(" "),
                    }))
                }
                _ => Err(ParseError::Usage(SET_AUTO_REPLY_USAGE)),
            },
            "status" => Ok(Self::Status),
            other => Err(ParseError::Unknown(other.to_owned())),
        }
    }

    /// Returns the command name as typed after the slash.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::SetWelcome(_) => "setwelcome",
            Self::SetGoodbye(_) => "setgoodbye",
            Self::SetSchedule(_) => "setschedule",
            Self::SetInterval { .. } => "setinterval",
            Self::AddBadWord(_) => "addbadword",
            Self::RemoveBadWord(_) => "removebadword",
            Self::AutoReplyOn => "autoreplyon",
            Self::AutoReplyOff => "autoreplyoff",
            Self::SetAutoReply(_) => "setautoreply",
            Self::Status => "status",
        }
    }

    /// Usage and description for every command, in help order.
    #[must_use]
    pub fn all_commands() -> Vec<(&'static str, &'static str)> {
        vec![
            ("/start", "Start the bot"),
            ("/help", "Show this help message"),
            ("/setwelcome <message>", "Set welcome message"),
            ("/setgoodbye <message>", "Set goodbye message"),
            ("/setschedule <message>", "Set scheduled message"),
            ("/setinterval <minutes>", "Set schedule interval"),
            ("/addbadword <word>", "Add a bad word to the filter"),
            ("/removebadword <word>", "Remove a bad word from the filter"),
            ("/autoreplyon", "Turn auto-reply on"),
            ("/autoreplyoff", "Turn auto-reply off"),
            ("/setautoreply <trigger> <response>", "Set auto-reply trigger and response"),
            ("/status", "Show current settings"),
        ]
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetInterval { minutes } => write!(f, "setinterval {minutes}"),
            Self::AddBadWord(word) => write!(f, "addbadword {word}"),
            Self::RemoveBadWord(word) => write!(f, "removebadword {word}"),
            Self::SetAutoReply(args) => write!(f, "setautoreply {}", args.trigger),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Splits `cmd@bot` into its parts.
fn split_mention(head: &str) -> (&str, Option<&str>) {
    match head.split_once('@') {
        Some((name, bot)) => (name, Some(bot)),
        None => (head, None),
    }
}

/// Positive whole minutes whose length in seconds still fits a `u64`.
fn parse_minutes(arg: &str) -> Option<u64> {
    arg.parse::<u64>()
        .ok()
        .filter(|&m| m > 0)
        .filter(|m| m.checked_mul(60).is_some())
}

fn non_empty_word(raw: &str) -> Option<String> {
    Some(Policy::normalize_word(raw)).filter(|w| !w.is_empty())
}

/// Result of command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Whether the command did what was asked.
    pub success: bool,

    /// Reply shown to the user.
    pub message: String,

    /// New broadcast interval to apply once the reply is out.
    pub rearm: Option<Duration>,
}

impl CommandResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            rearm: None,
        }
    }

    /// Creates a successful result that re-arms the broadcast timer.
    #[must_use]
    pub fn success_with_rearm(message: impl Into<String>, interval: Duration) -> Self {
        Self {
            success: true,
            message: message.into(),
            rearm: Some(interval),
        }
    }

    /// Creates an error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            rearm: None,
        }
    }
}
