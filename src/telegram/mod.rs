//! Telegram client wrapper module.
//!
//! Connects as a bot over `MTProto`, turns updates into inbound events and
//! implements the outbound transport with flood-wait protection.

mod client;
mod rate_limiter;

pub use client::{TelegramBot, TelegramError};
pub use grammers_client::UpdateStream;
pub use rate_limiter::FloodGuard;
