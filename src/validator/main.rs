//! Standalone checker for spam bot configuration files.
//!
//! Loads the JSON document without touching it and reports structural
//! problems, missing placeholders and a trigger that collides with a
//! built-in command.

use std::process::ExitCode;

use clap::Parser;

use spam_bot::broadcast::MAX_QUANTITY;
use spam_bot::commands::BotCommand;
use spam_bot::config::{BotConfig, MENTION_PLACEHOLDER, Severity};

/// Spam bot configuration checker.
#[derive(Parser, Debug)]
#[command(name = "check_config")]
#[command(about = "Checks configuration files for the Telegram spam bot")]
#[command(version)]
struct Args {
    /// Path to the JSON configuration file to check.
    #[arg(short, long, default_value = "config.json")]
    file: String,

    /// Generate an example configuration file at the specified path.
    #[arg(long)]
    generate_example: Option<String>,

    /// Owner id to put into a generated example.
    #[arg(long, default_value_t = 0)]
    owner_id: i64,

    /// Show every template and list entry.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(output_path) = args.generate_example {
        return generate_example(&output_path, args.owner_id);
    }

    check_config(&args.file, args.verbose)
}

fn generate_example(output_path: &str, owner_id: i64) -> ExitCode {
    let example = BotConfig::example(owner_id);

    match example.save_to_file(output_path) {
        Ok(()) => {
            println!("✓ Example configuration written to: {output_path}");
            println!(
                "\nThe file contains {} example messages.",
                example.spam_messages.len()
            );
            println!("Use {MENTION_PLACEHOLDER} where the target user should be mentioned.");
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

    let config = match BotConfig::load_from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("✗ Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if verbose {
        print_summary(&config);
    }

    let mut issues: Vec<(Severity, String)> = config
        .audit()
        .into_iter()
        .map(|issue| (issue.severity(), issue.to_string()))
        .collect();

    if BotCommand::is_reserved(config.trigger_name()) {
        issues.push((
            Severity::Error,
            format!(
                "trigger {} collides with a built-in command",
                config.spam_command
            ),
        ));
    }

    let errors = issues
        .iter()
        .filter(|(severity, _)| *severity == Severity::Error)
        .count();
    let warnings = issues.len() - errors;

    for (severity, message) in &issues {
        match severity {
            Severity::Error => println!("  ✗ Error: {message}"),
            Severity::Warning => println!("  ⚠ Warning: {message}"),
        }
    }

    if !issues.is_empty() {
        println!();
    }

    if errors == 0 {
        println!(
            "✓ Configuration is valid ({} messages, {} users, {} chats)",
            config.spam_messages.len(),
            config.authorized_users.len(),
            config.authorized_chats.len()
        );
        if warnings > 0 {
            println!("  ({warnings} warning(s))");
        }
        ExitCode::SUCCESS
    } else {
        println!("✗ Check failed: {errors} error(s), {warnings} warning(s)");
        ExitCode::FAILURE
    }
}

fn print_summary(config: &BotConfig) {
    println!("Owner:            {}", config.owner_id);
    println!("Trigger command:  {}", config.spam_command);
    println!("Max per command:  {MAX_QUANTITY}");

    println!("Authorized users: {}", config.authorized_users.len());
    for id in &config.authorized_users {
        println!("  • {id}");
    }

    println!("Authorized chats: {}", config.authorized_chats.len());
    for id in &config.authorized_chats {
        println!("  • {id}");
    }

    println!("Messages:         {}", config.spam_messages.len());
    for (i, template) in config.spam_messages.iter().enumerate() {
        println!("  [{}] \"{}\"", i + 1, truncate(template, 50));
    }
    println!();
}

/// Truncates a string for display.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}
