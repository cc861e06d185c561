//! Configuration module for the guard bot.
//!
//! Holds the persisted moderation policy, the store that owns it, and the
//! environment-driven settings for the Telegram connection.

mod policy;
mod settings;
mod store;

pub use policy::Policy;
pub use settings::{SettingsError, TelegramConfig, resolve_token};
pub use store::{ConfigError, ConfigStore, policy_json, read_policy, write_policy};

/// Welcome template used when no config file exists.
pub const DEFAULT_WELCOME_TEMPLATE: &str = "Welcome, {name}!";

/// Goodbye template used when no config file exists.
pub const DEFAULT_GOODBYE_TEMPLATE: &str = "Goodbye, {name}!";

/// Broadcast body used when no config file exists.
pub const DEFAULT_SCHEDULED_TEXT: &str = "This is a scheduled message.";

/// One hour between broadcasts by default.
pub const DEFAULT_SCHEDULE_INTERVAL_SECS: u64 = 3600;
