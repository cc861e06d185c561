//! Command handling module.
//!
//! Parses `/command` messages and applies them to the policy store.
//! Any user who can address the bot may run any command.

mod handler;
mod types;

pub use handler::CommandHandler;
pub use types::{
    ADD_BAD_WORD_USAGE, AutoReplyArgs, BotCommand, CommandResult, ParseError,
    REMOVE_BAD_WORD_USAGE, SET_AUTO_REPLY_USAGE, SET_INTERVAL_USAGE,
};
