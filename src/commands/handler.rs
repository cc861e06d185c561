//! Command handler implementation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::types::{AutoReplyArgs, BotCommand, CommandResult, ParseError};
use crate::config::{ConfigStore, Policy};
use crate::scheduler::{SchedulerPhase, SchedulerState};

/// Applies admin commands to the policy store.
pub struct CommandHandler {
    /// Policy owner; every change goes through its `update`.
    store: Arc<ConfigStore>,

    /// Read-only view of the broadcast scheduler, for `/status`.
    scheduler_state: Arc<RwLock<SchedulerState>>,

    /// Our own username, to ignore `/cmd@other_bot`.
    bot_username: Option<String>,
}

impl CommandHandler {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(store: Arc<ConfigStore>, scheduler_state: Arc<RwLock<SchedulerState>>) -> Self {
        Self {
            store,
            scheduler_state,
            bot_username: None,
        }
    }

    /// Sets the bot username used to filter addressed commands.
    #[must_use]
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    /// Tries to parse and execute a command from a message.
    ///
    /// Returns `None` if the message is not a command for this bot.
    pub async fn try_handle(&self, message_text: &str) -> Option<CommandResult> {
        let parsed = BotCommand::parse(message_text, self.bot_username.as_deref());
        self.finish(parsed).await
    }

    /// Executes a command that the transport already split into name and
    /// arguments.
    pub async fn handle<S: AsRef<str> + Sync>(&self, name: &str, args: &[S]) -> Option<CommandResult> {
        let parsed = BotCommand::from_parts(name, args);
        self.finish(parsed).await
    }

    async fn finish(&self, parsed: Result<BotCommand, ParseError>) -> Option<CommandResult> {
        let command = match parsed {
            Ok(command) => command,
            Err(ParseError::NotACommand) => return None,
            Err(ParseError::Unknown(name)) => {
                debug!("Ignoring unknown command /{}", name);
                return None;
            }
            Err(ParseError::Usage(usage)) => {
                debug!("Rejected command arguments: {}", usage);
                return Some(CommandResult::error(usage));
            }
        };

        debug!("Handling command: {}", command);
        let result = self.execute(command).await;
        info!(
            "Command result: success={}, rearm={:?}",
            result.success, result.rearm
        );

        Some(result)
    }

    /// Executes a parsed command.
    pub async fn execute(&self, command: BotCommand) -> CommandResult {
        match command {
            BotCommand::Start => CommandResult::success("Hi! I am your group guardian bot! 🤖"),
            BotCommand::Help => Self::handle_help(),
            BotCommand::SetWelcome(text) => {
                self.set_text(|p| p.welcome_template = text, "Welcome message updated! 🎉")
                    .await
            }
            BotCommand::SetGoodbye(text) => {
                self.set_text(|p| p.goodbye_template = text, "Goodbye message updated! 👋")
                    .await
            }
            BotCommand::SetSchedule(text) => {
                self.set_text(|p| p.scheduled_text = text, "Scheduled message updated! 🗓️")
                    .await
            }
            BotCommand::SetInterval { minutes } => self.handle_set_interval(minutes).await,
            BotCommand::AddBadWord(word) => self.handle_add_bad_word(word).await,
            BotCommand::RemoveBadWord(word) => self.handle_remove_bad_word(word).await,
            BotCommand::AutoReplyOn => {
                self.set_text(|p| p.auto_reply_enabled = true, "Auto-reply is now enabled.")
                    .await
            }
            BotCommand::AutoReplyOff => {
                self.set_text(|p| p.auto_reply_enabled = false, "Auto-reply is now disabled.")
                    .await
            }
            BotCommand::SetAutoReply(args) => self.handle_set_auto_reply(args).await,
            BotCommand::Status => self.handle_status().await,
        }
    }

    /// Runs a mutation through the store, turning a failed save into the
    /// reply the user sees.
    async fn mutate<R, F>(&self, mutate: F) -> Result<(Arc<Policy>, R), CommandResult>
    where
        F: FnOnce(&mut Policy) -> R + Send,
        R: Send,
    {
        self.store.update(mutate).await.map_err(|e| {
            warn!("Failed to save config: {}", e);
            CommandResult::error(format!(
                "Failed to save settings: {e}. No changes were applied."
            ))
        })
    }

    async fn set_text<F>(&self, mutate: F, reply: &str) -> CommandResult
    where
        F: FnOnce(&mut Policy) + Send,
    {
        match self.mutate(mutate).await {
            Ok(_) => CommandResult::success(reply),
            Err(failure) => failure,
        }
    }

    async fn handle_set_interval(&self, minutes: u64) -> CommandResult {
        // Bounds were checked while parsing.
        let secs = minutes.saturating_mul(60);

        match self.mutate(|p| p.schedule_interval_secs = secs).await {
            Ok(_) => CommandResult::success_with_rearm(
                format!(
                    "Schedule interval updated! Broadcasting every {minutes} minute{}.",
                    if minutes == 1 { "" } else { "s" }
                ),
                Duration::from_secs(secs),
            ),
            Err(failure) => failure,
        }
    }

    async fn handle_add_bad_word(&self, word: String) -> CommandResult {
        let candidate = word.clone();
        match self.mutate(move |p| p.add_bad_word(&candidate)).await {
            Ok((_, true)) => {
                CommandResult::success(format!("Added \"{word}\" to bad words list. 🛑"))
            }
            Ok((_, false)) => CommandResult::success(format!(
                "\"{word}\" is already in the bad words list. ⚠️"
            )),
            Err(failure) => failure,
        }
    }

    async fn handle_remove_bad_word(&self, word: String) -> CommandResult {
        let candidate = word.clone();
        match self.mutate(move |p| p.remove_bad_word(&candidate)).await {
            Ok((_, true)) => {
                CommandResult::success(format!("Removed \"{word}\" from bad words list. ✅"))
            }
            Ok((_, false)) => CommandResult::success(format!(
                "\"{word}\" is not in the bad words list. ❌"
            )),
            Err(failure) => failure,
        }
    }

    async fn handle_set_auto_reply(&self, args: AutoReplyArgs) -> CommandResult {
        let AutoReplyArgs { trigger, response } = args;
        let reply = format!("Auto-reply set for trigger \"{trigger}\".");

        match self.mutate(move |p| p.set_auto_reply(&trigger, &response)).await {
            Ok(_) => CommandResult::success(reply),
            Err(failure) => failure,
        }
    }

    fn handle_help() -> CommandResult {
        let mut lines = vec!["📜 Commands:".to_owned()];
        for (usage, description) in BotCommand::all_commands() {
            lines.push(format!("{usage} - {description}"));
        }
        CommandResult::success(lines.join("\n"))
    }

    async fn handle_status(&self) -> CommandResult {
        let policy = self.store.get().await;
        let state = self.scheduler_state.read().await;

        let schedule = match state.phase {
            SchedulerPhase::Armed => format!(
                "▶ Broadcasting every {}",
                format_duration(policy.schedule_interval_secs)
            ),
            SchedulerPhase::Idle => "⏸ Scheduler not started".to_owned(),
            SchedulerPhase::Stopped => "⏹ Scheduler stopped".to_owned(),
        };

        let chat = if policy.chat_id.is_empty() {
            "not set"
        } else {
            policy.chat_id.as_str()
        };

        let last = state.last_broadcast_at.map_or_else(
            || "never".to_owned(),
            |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        );

        let next = state
            .time_until_next()
            .map_or_else(|| "N/A".to_owned(), |d| format_duration(d.as_secs()));

        let auto_reply = if policy.auto_reply_enabled && !policy.auto_reply_trigger.is_empty() {
            format!("on (trigger \"{}\")", policy.auto_reply_trigger)
        } else if policy.auto_reply_enabled {
            "on (no trigger set)".to_owned()
        } else {
            "off".to_owned()
        };

        let message = format!(
            "Schedule: {schedule}\n\
             Broadcast chat: {chat}\n\
             Broadcast text: \"{}\"\n\
             Last broadcast: {last} ({} sent, {} failed)\n\
             Next broadcast in: {next}\n\
             Welcome: \"{}\"\n\
             Goodbye: \"{}\"\n\
             Bad words: {}\n\
             Auto-reply: {auto_reply}",
            truncate(&policy.scheduled_text, 30),
            state.broadcasts_sent,
            state.failed_deliveries,
            truncate(&policy.welcome_template, 30),
            truncate(&policy.goodbye_template, 30),
            policy.bad_words.len(),
        );

        CommandResult::success(message)
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("store", &self.store)
            .field("bot_username", &self.bot_username)
            .finish_non_exhaustive()
    }
}

/// Truncates a string to a maximum length, adding "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", chars[..max_len].iter().collect::<String>())
    }
}

/// Formats a duration in seconds to a human-readable string.
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins == 0 {
            format!("{hours}h")
        } else {
            format!("{hours}h {mins}m")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::types::{SET_AUTO_REPLY_USAGE, SET_INTERVAL_USAGE};

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<ConfigStore>,
        handler: CommandHandler,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ConfigStore::load(dir.path().join("config.json")).unwrap());
        let state = Arc::new(RwLock::new(SchedulerState::new()));
        let handler = CommandHandler::new(Arc::clone(&store), state);
        Fixture {
            _dir: dir,
            store,
            handler,
        }
    }

    async fn run(handler: &CommandHandler, text: &str) -> CommandResult {
        handler.try_handle(text).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_bad_word_reply_and_state() {
        let fx = fixture();
        let result = run(&fx.handler, "/addbadword spam").await;

        assert!(result.success);
        assert!(result.message.contains("spam"));
        assert!(result.message.to_lowercase().contains("added"));
        assert_eq!(fx.store.get().await.bad_words, vec!["spam".to_owned()]);
    }

    #[tokio::test]
    async fn test_add_existing_word_is_informational() {
        let fx = fixture();
        run(&fx.handler, "/addbadword spam").await;
        let result = run(&fx.handler, "/addbadword SPAM").await;

        assert!(result.success);
        assert!(result.message.contains("already"));
        assert_eq!(fx.store.get().await.bad_words.len(), 1);
    }

    #[tokio::test]
    async fn test_add_then_remove_restores_policy() {
        let fx = fixture();
        run(&fx.handler, "/addbadword scam").await;
        let before = fx.store.get().await;

        run(&fx.handler, "/addbadword spam").await;
        let result = run(&fx.handler, "/removebadword spam").await;

        assert!(result.message.contains("Removed"));
        assert_eq!(fx.store.get().await.bad_words, before.bad_words);
    }

    #[tokio::test]
    async fn test_remove_missing_word() {
        let fx = fixture();
        let result = run(&fx.handler, "/removebadword spam").await;
        assert!(result.message.contains("not in the bad words list"));
    }

    #[tokio::test]
    async fn test_set_interval_converts_minutes() {
        let fx = fixture();
        let result = run(&fx.handler, "/setinterval 2").await;

        assert!(result.success);
        assert_eq!(result.rearm, Some(Duration::from_secs(120)));
        assert_eq!(fx.store.get().await.schedule_interval_secs, 120);
    }

    #[tokio::test]
    async fn test_set_interval_rejects_and_leaves_policy() {
        let fx = fixture();
        for text in ["/setinterval", "/setinterval 0", "/setinterval -1", "/setinterval ten"] {
            let result = run(&fx.handler, text).await;
            assert!(!result.success);
            assert_eq!(result.message, SET_INTERVAL_USAGE);
            assert_eq!(result.rearm, None);
        }
        assert_eq!(fx.store.get().await.schedule_interval_secs, 3600);
        assert!(!fx.store.path().exists());
    }

    #[tokio::test]
    async fn test_set_auto_reply_needs_two_args() {
        let fx = fixture();
        run(&fx.handler, "/setautoreply hi hello there").await;
        let result = run(&fx.handler, "/setautoreply lonely").await;

        assert_eq!(result.message, SET_AUTO_REPLY_USAGE);
        let policy = fx.store.get().await;
        assert_eq!(policy.auto_reply_trigger, "hi");
        assert_eq!(policy.auto_reply_response, "hello there");
    }

    #[tokio::test]
    async fn test_set_auto_reply_names_trigger() {
        let fx = fixture();
        let result = run(&fx.handler, "/setautoreply HELP see /help").await;
        assert_eq!(result.message, "Auto-reply set for trigger \"help\".");
    }

    #[tokio::test]
    async fn test_toggle_auto_reply() {
        let fx = fixture();
        run(&fx.handler, "/autoreplyon").await;
        assert!(fx.store.get().await.auto_reply_enabled);
        let result = run(&fx.handler, "/autoreplyoff").await;
        assert_eq!(result.message, "Auto-reply is now disabled.");
        assert!(!fx.store.get().await.auto_reply_enabled);
    }

    #[tokio::test]
    async fn test_templates_are_persisted() {
        let fx = fixture();
        run(&fx.handler, "/setwelcome Hi {name}, read the rules").await;
        run(&fx.handler, "/setschedule Daily reminder").await;

        let reloaded = ConfigStore::load(fx.store.path()).unwrap();
        let policy = reloaded.get().await;
        assert_eq!(policy.welcome_template, "Hi {name}, read the rules");
        assert_eq!(policy.scheduled_text, "Daily reminder");
    }

    #[tokio::test]
    async fn test_commands_are_idempotent() {
        let fx = fixture();
        run(&fx.handler, "/setgoodbye Bye {name}").await;
        let first = fx.store.get().await;
        run(&fx.handler, "/setgoodbye Bye {name}").await;
        assert_eq!(*fx.store.get().await, *first);
    }

    #[tokio::test]
    async fn test_save_failure_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = Arc::new(ConfigStore::with_policy(
            blocker.join("config.json"),
            Policy::default(),
        ));
        let handler =
            CommandHandler::new(Arc::clone(&store), Arc::new(RwLock::new(SchedulerState::new())));

        let result = run(&handler, "/setinterval 5").await;
        assert!(!result.success);
        assert!(result.message.starts_with("Failed to save settings"));
        assert_eq!(result.rearm, None);
        assert_eq!(store.get().await.schedule_interval_secs, 3600);
    }

    #[tokio::test]
    async fn test_unknown_and_plain_text_ignored() {
        let fx = fixture();
        assert!(fx.handler.try_handle("/frobnicate").await.is_none());
        assert!(fx.handler.try_handle("just chatting").await.is_none());
    }

    #[tokio::test]
    async fn test_handle_from_parts() {
        let fx = fixture();
        let result = fx
            .handler
            .handle("addbadword", &["Free", "Money"])
            .await
            .unwrap();
        assert!(result.message.contains("\"free money\""));
    }

    #[tokio::test]
    async fn test_help_lists_every_command() {
        let fx = fixture();
        let result = run(&fx.handler, "/help").await;
        for (usage, _) in BotCommand::all_commands() {
            assert!(result.message.contains(usage), "{usage}");
        }
    }

    #[tokio::test]
    async fn test_status_before_scheduler_starts() {
        let fx = fixture();
        let result = run(&fx.handler, "/status").await;
        assert!(result.message.contains("Scheduler not started"));
        assert!(result.message.contains("Broadcast chat: not set"));
        assert!(result.message.contains("Auto-reply: off"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Hello", 10), "Hello");
        assert_eq!(truncate("Hello, World!", 5), "Hello...");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(120), "2m");
        assert_eq!(format_duration(3600), "1h");
        assert_eq!(format_duration(5400), "1h 30m");
    }
}
