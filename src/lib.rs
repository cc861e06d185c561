//! Group Guard Bot Library
//!
//! A Telegram group moderation bot.
//!
//! This crate provides the core functionality for:
//! - Persisting the moderation policy as JSON
//! - Deleting messages that contain filtered words
//! - Greeting joining members and saying goodbye to leaving ones
//! - Broadcasting a configured message on a fixed interval
//! - Answering a trigger word with a canned reply
//! - Handling admin commands via chat messages

pub mod bot;
pub mod commands;
pub mod config;
pub mod membership;
pub mod moderation;
pub mod scheduler;
pub mod telegram;
pub mod transport;
