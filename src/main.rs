//! Spam Bot - Main Entry Point
//!
//! A Telegram bot that sends rotating template messages mentioning a target
//! user into authorized group chats.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use spam_bot::broadcast::{Broadcaster, Pacer};
use spam_bot::commands::CommandHandler;
use spam_bot::config::{BotConfig, BotSettings, ConfigStore, TelegramConfig};
use spam_bot::telegram::{Directory, MessageSender, TelegramBot, listener};

/// Telegram bot that broadcasts template messages into authorized chats.
#[derive(Parser, Debug)]
#[command(name = "spam_bot")]
#[command(about = "Broadcast rotating mention messages into authorized Telegram chats")]
#[command(version)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Generate an example configuration file and exit.
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    if args.generate_config {
        return generate_example_config();
    }

    let tg_config = TelegramConfig::from_env()
        .context("Failed to load Telegram configuration from environment")?;
    let settings =
        BotSettings::from_env().context("Failed to load bot settings from environment")?;

    let store = Arc::new(ConfigStore::load(&args.config, settings.owner_id));
    let config = store.snapshot().await;

    info!("Owner ID: {}", config.owner_id);
    info!("Broadcast command: {}", config.spam_command);
    info!("Messages loaded: {}", config.spam_messages.len());
    info!("Authorized users: {}", config.authorized_users.len());
    info!("Authorized chats: {}", config.authorized_chats.len());

    let (min, max) = settings.pacing_bounds();
    let broadcaster = Broadcaster::new(Pacer::new(min, max));
    debug!("Pacing between {:?} and {:?}", min, max);

    let (bot, updates) = TelegramBot::connect(&tg_config)
        .await
        .context("Failed to connect to Telegram")?;
    let bot = Arc::new(bot);

    let handler = Arc::new(CommandHandler::new(
        Arc::clone(&store),
        Arc::clone(&bot) as Arc<dyn Directory>,
        Arc::clone(&bot) as Arc<dyn MessageSender>,
        broadcaster,
        bot.username().map(str::to_owned),
    ));

    info!("Bot is running. Use Ctrl+C to stop.");

    let outcome = tokio::select! {
        result = listener::run(Arc::clone(&bot), updates, handler) => {
            result.context("Update loop stopped")
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
    };

    if let Err(e) = &outcome {
        error!("{:#}", e);
    }

    bot.disconnect();
    outcome
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Generates an example configuration file.
fn generate_example_config() -> Result<()> {
    let owner_id = std::env::var("OWNER_ID")
        .ok()
        .and_then(|id| id.trim().parse().ok())
        .unwrap_or_default();

    let example = BotConfig::example(owner_id);
    example.save_to_file("config.example.json")?;

    println!("✓ Example configuration written to: config.example.json");
    println!("\nTo use this bot:");
    println!("1. Copy config.example.json to config.json");
    println!("2. Edit the messages to your liking");
    println!("3. Create a .env file with API_ID, API_HASH, BOT_TOKEN and OWNER_ID");
    println!("4. Run: spam_bot");

    Ok(())
}
