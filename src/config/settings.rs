//! Process settings for the Telegram connection.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Telegram API configuration.
///
/// MTProto clients need an application id/hash even when signing in as a
/// bot; the bot token itself lives in the persisted policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    pub api_hash: String,

    /// Path to the session file.
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
}

fn default_session_path() -> PathBuf {
    PathBuf::from("bot.session")
}

impl TelegramConfig {
    /// Creates a new Telegram configuration.
    #[must_use]
    pub fn new(api_id: i32, api_hash: String) -> Self {
        Self {
            api_id,
            api_hash,
            session_path: default_session_path(),
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `TG_API_ID` and `TG_API_HASH` to be set.
    pub fn from_env() -> Result<Self, SettingsError> {
        let api_id: i32 = std::env::var("TG_API_ID")
            .map_err(|_| SettingsError::MissingEnvVar("TG_API_ID"))?
            .parse()
            .map_err(|_| SettingsError::InvalidApiId)?;

        let api_hash = std::env::var("TG_API_HASH")
            .map_err(|_| SettingsError::MissingEnvVar("TG_API_HASH"))?;

        let session_path = std::env::var("TG_SESSION_PATH")
            .map_or_else(|_| default_session_path(), PathBuf::from);

        Ok(Self {
            api_id,
            api_hash,
            session_path,
        })
    }
}

/// Picks the bot token: the persisted one wins, `BOT_TOKEN` fills in when
/// the policy file has none yet.
pub fn resolve_token(policy_token: &str, env_token: Option<String>) -> Result<String, SettingsError> {
    if !policy_token.trim().is_empty() {
        return Ok(policy_token.trim().to_owned());
    }
    env_token
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
        .ok_or(SettingsError::MissingToken)
}

/// Settings errors.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid API ID format (must be a positive integer)")]
    InvalidApiId,

    #[error("No bot token: set TOKEN in the config file or BOT_TOKEN in the environment")]
    MissingToken,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telegram_config_new() {
        let config = TelegramConfig::new(12345, "abc123".to_owned());
        assert_eq!(config.api_id, 12345);
        assert_eq!(config.api_hash, "abc123");
        assert_eq!(config.session_path, PathBuf::from("bot.session"));
    }

    #[test]
    fn test_resolve_token_prefers_policy() {
        let token = resolve_token("111:aaa", Some("222:bbb".to_owned())).unwrap();
        assert_eq!(token, "111:aaa");
    }

    #[test]
    fn test_resolve_token_falls_back_to_env() {
        let token = resolve_token("", Some(" 222:bbb ".to_owned())).unwrap();
        assert_eq!(token, "222:bbb");
    }

    #[test]
    fn test_resolve_token_missing() {
        assert!(matches!(
            resolve_token("  ", Some(String::new())),
            Err(SettingsError::MissingToken)
        ));
        assert!(matches!(resolve_token("", None), Err(SettingsError::MissingToken)));
    }
}
