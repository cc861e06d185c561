//! Standalone checker for policy files.
//!
//! Loads a `config.json` the same way the bot does and reports whether the
//! bot would accept it, plus settings that are accepted but probably wrong.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;

use group_guard_bot::config::{Policy, read_policy, write_policy};

/// Policy file checker.
#[derive(Parser, Debug)]
#[command(name = "check_config")]
#[command(about = "Checks a group guard bot policy file")]
#[command(version)]
struct Args {
    /// Path to the JSON policy file to check.
    #[arg(short, long, default_value = "config.json")]
    file: String,

    /// Generate an example policy file at the specified path.
    #[arg(long)]
    generate_example: Option<String>,

    /// Print every setting, not just the summary.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(output_path) = args.generate_example {
        return generate_example(&output_path);
    }

    check_config(&args.file, args.verbose)
}

fn generate_example(output_path: &str) -> ExitCode {
    let example = Policy::example();

    match write_policy(Path::new(output_path), &example) {
        Ok(()) => {
            println!("✓ Example configuration written to: {output_path}");
            println!("\nSet TOKEN (or BOT_TOKEN in the environment) and CHAT_ID before use.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Failed to write example file: {e}");
            ExitCode::FAILURE
        }
    }
}

fn check_config(path: &str, verbose: bool) -> ExitCode {
    println!("Checking: {path}\n");

    let policy = match read_policy(Path::new(path)) {
        Ok(Some(policy)) => policy,
        Ok(None) => {
            println!("✓ {path} does not exist; the bot will start with default settings.");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("✗ Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if verbose {
        print_settings(&policy);
    }

    let warnings = warnings(&policy);
    for warning in &warnings {
        println!("  ⚠ Warning: {warning}");
    }
    if !warnings.is_empty() {
        println!();
    }

    println!("✓ Configuration is valid");
    if !warnings.is_empty() {
        println!("  ({} warning(s))", warnings.len());
    }

    ExitCode::SUCCESS
}

fn print_settings(policy: &Policy) {
    println!(
        "Token:            {}",
        if policy.token.is_empty() { "<not set>" } else { "<set>" }
    );
    println!("Chat:             {}", display_or(&policy.chat_id, "<not set>"));
    println!("Welcome:          \"{}\"", truncate(&policy.welcome_template, 40));
    println!("Goodbye:          \"{}\"", truncate(&policy.goodbye_template, 40));
    println!("Scheduled:        \"{}\"", truncate(&policy.scheduled_text, 40));
    println!("Interval:         {}s", policy.schedule_interval_secs);
    println!("Bad words ({}):", policy.bad_words.len());
    for word in &policy.bad_words {
        println!("  - {word}");
    }
    println!(
        "Auto-reply:       {} (trigger \"{}\")",
        if policy.auto_reply_enabled { "on" } else { "off" },
        policy.auto_reply_trigger
    );
    println!("Auto-reply text:  \"{}\"", truncate(&policy.auto_reply_response, 40));
    println!();
}

/// Settings the bot accepts but that will not do what the operator wants.
fn warnings(policy: &Policy) -> Vec<String> {
    let mut warnings = Vec::new();

    if policy.token.trim().is_empty() {
        warnings.push("TOKEN is empty; BOT_TOKEN must be set in the environment".to_owned());
    }
    if policy.chat_id.trim().is_empty() {
        warnings.push("CHAT_ID is empty; scheduled messages will be skipped".to_owned());
    }
    if policy.schedule_interval_secs % 60 != 0 {
        warnings.push(format!(
            "SCHEDULE_INTERVAL {}s is not a whole number of minutes",
            policy.schedule_interval_secs
        ));
    }
    if policy.auto_reply_enabled && policy.auto_reply_trigger.is_empty() {
        warnings.push("Auto-reply is enabled but AUTO_REPLY_TRIGGER is empty".to_owned());
    }
    if policy.auto_reply_enabled && policy.auto_reply_response.trim().is_empty() {
        warnings.push("Auto-reply is enabled but AUTO_REPLY_RESPONSE is empty".to_owned());
    }

    warnings
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

/// Truncates a string for display.
fn truncate(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", chars[..max_len].iter().collect::<String>())
    }
}
