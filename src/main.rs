//! Group Guard Bot - Main Entry Point
//!
//! A Telegram bot that keeps a group tidy: filters bad words, greets
//! members, posts a scheduled message and answers a trigger word.

use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use group_guard_bot::bot::EventRouter;
use group_guard_bot::commands::CommandHandler;
use group_guard_bot::config::{ConfigStore, Policy, TelegramConfig, resolve_token, write_policy};
use group_guard_bot::scheduler::{BroadcastScheduler, SchedulerHandle, SchedulerState};
use group_guard_bot::telegram::TelegramBot;
use group_guard_bot::transport::{InboundEvent, MessageRef, RecordingTransport};

/// Chat id used for console input when no broadcast chat is configured.
const CONSOLE_CHAT: &str = "console";

/// Telegram group moderation bot.
#[derive(Parser, Debug)]
#[command(name = "group_guard_bot")]
#[command(about = "Moderate a Telegram group: bad-word filter, greetings, broadcasts, auto-reply")]
#[command(version)]
struct Args {
    /// Path to the JSON policy file.
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log file, written in addition to stdout.
    #[arg(long, default_value = "bot.log")]
    log_file: String,

    /// Generate an example configuration file and exit.
    #[arg(long)]
    generate_config: bool,

    /// Run without Telegram: read events from stdin and log the actions.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = init_logging(&args.log_level, &args.log_file)?;

    if args.generate_config {
        return generate_example_config();
    }

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let store = Arc::new(
        ConfigStore::load(&args.config)
            .with_context(|| format!("Failed to load configuration from {}", args.config))?,
    );
    let policy = store.get().await;
    info!(
        "Loaded policy: {} bad word(s), broadcast every {}s to {}, auto-reply {}",
        policy.bad_words.len(),
        policy.schedule_interval_secs,
        if policy.chat_id.is_empty() { "<no chat>" } else { policy.chat_id.as_str() },
        if policy.auto_reply_enabled { "on" } else { "off" },
    );

    let state = Arc::new(RwLock::new(SchedulerState::new()));

    if args.dry_run {
        return run_dry(store, state).await;
    }

    let token = resolve_token(&policy.token, std::env::var("BOT_TOKEN").ok())
        .context("No bot token configured")?;
    let tg_config = TelegramConfig::from_env()
        .context("Failed to load Telegram configuration from environment")?;

    let (bot, mut updates) = TelegramBot::connect(&tg_config, &token)
        .await
        .context("Failed to connect to Telegram")?;
    let bot = Arc::new(bot);

    let scheduler = SchedulerHandle::spawn(BroadcastScheduler::new(
        Arc::clone(&store),
        bot.clone(),
        Arc::clone(&state),
    ));

    let mut commands = CommandHandler::new(Arc::clone(&store), Arc::clone(&state));
    if let Some(username) = bot.username() {
        commands = commands.with_bot_username(username);
    }
    let router = Arc::new(
        EventRouter::new(Arc::clone(&store), commands, bot.clone())
            .with_scheduler(scheduler.sender()),
    );

    info!("Bot is running. Use Ctrl+C to stop.");

    let mut in_flight = JoinSet::new();
    loop {
        let update = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
            update = updates.next() => update,
        };

        while in_flight.try_join_next().is_some() {}

        let update = match update {
            Ok(update) => update,
            Err(e) => {
                warn!("Failed to receive update: {}", e);
                continue;
            }
        };

        let Some(event) = bot.event_from_update(update).await else {
            continue;
        };
        let router = Arc::clone(&router);
        in_flight.spawn(async move {
            router.dispatch(event).await;
        });
    }

    // Stop order: handlers (and their saves), then the timer, then the link.
    if !in_flight.is_empty() {
        info!("Waiting for {} in-flight handler(s)...", in_flight.len());
    }
    while in_flight.join_next().await.is_some() {}
    scheduler.shutdown().await;
    bot.disconnect();

    Ok(())
}

/// Runs the bot against stdin instead of Telegram.
///
/// Each line is one event in the configured chat: `+Ann Bo` is a join,
/// `-Ann` a leave, anything else a text message or `/command`.
async fn run_dry(store: Arc<ConfigStore>, state: Arc<RwLock<SchedulerState>>) -> Result<()> {
    let transport = Arc::new(RecordingTransport::new());

    let scheduler = SchedulerHandle::spawn(BroadcastScheduler::new(
        Arc::clone(&store),
        transport.clone(),
        Arc::clone(&state),
    ));
    let router = EventRouter::new(
        Arc::clone(&store),
        CommandHandler::new(Arc::clone(&store), Arc::clone(&state)),
        transport.clone(),
    )
    .with_scheduler(scheduler.sender());

    info!("Dry run: type messages, `+Name` to join, `-Name` to leave, Ctrl+D to stop.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut next_id: i32 = 0;
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else { break };

        let chat = {
            let policy = store.get().await;
            if policy.chat_id.is_empty() {
                CONSOLE_CHAT.to_owned()
            } else {
                policy.chat_id.clone()
            }
        };
        next_id += 1;

        if let Some(event) = console_event(&chat, next_id, &line) {
            router.dispatch(event).await;
        }
    }

    info!("Shutting down...");
    scheduler.shutdown().await;
    info!("{} action(s) recorded", transport.actions().len());
    Ok(())
}

fn console_event(chat: &str, id: i32, line: &str) -> Option<InboundEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Some(names) = line.strip_prefix('+') {
        return Some(InboundEvent::MembersJoined {
            chat: chat.to_owned(),
            names: names.split_whitespace().map(str::to_owned).collect(),
        });
    }
    if let Some(name) = line.strip_prefix('-') {
        return Some(InboundEvent::MemberLeft {
            chat: chat.to_owned(),
            name: name.trim().to_owned(),
        });
    }
    InboundEvent::from_text(MessageRef::new(chat, id), line, "console", None)
}

/// Initializes logging to stdout and an append-only log file.
fn init_logging(level: &str, log_file: &str) -> Result<WorkerGuard> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {log_file}"))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(false)
                .with_filter(filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(filter()),
        )
        .init();

    Ok(guard)
}

/// Generates an example configuration file.
fn generate_example_config() -> Result<()> {
    let path = std::path::Path::new("config.example.json");
    write_policy(path, &Policy::example())?;

    println!("✓ Example configuration written to: {}", path.display());
    println!("\nTo use this bot:");
    println!("1. Copy config.example.json to config.json");
    println!("2. Set CHAT_ID and adjust the messages");
    println!("3. Create a .env file with TG_API_ID, TG_API_HASH and BOT_TOKEN");
    println!("4. Run: group_guard_bot");

    Ok(())
}
