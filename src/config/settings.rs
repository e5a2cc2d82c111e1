//! Startup settings and Telegram credentials.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Telegram API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    pub api_hash: String,

    /// Bot token issued by `@BotFather`.
    pub bot_token: String,

    /// Path to the session file.
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
}

fn default_session_path() -> PathBuf {
    PathBuf::from("spam_bot.session")
}

impl TelegramConfig {
    /// Creates a new Telegram configuration.
    #[must_use]
    pub fn new(api_id: i32, api_hash: String, bot_token: String) -> Self {
        Self {
            api_id,
            api_hash,
            bot_token,
            session_path: default_session_path(),
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `API_ID`, `API_HASH` and `BOT_TOKEN` to be set.
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_id: i32 = required_var("API_ID")?
            .trim()
            .parse()
            .ok()
            .filter(|id| *id > 0)
            .ok_or(ConfigError::InvalidApiId)?;

        let api_hash = required_var("API_HASH")?;
        let bot_token = required_var("BOT_TOKEN")?;

        let session_path =
            std::env::var("SESSION_PATH").map_or_else(|_| default_session_path(), PathBuf::from);

        Ok(Self {
            api_id,
            api_hash,
            bot_token,
            session_path,
        })
    }
}

/// Bot-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// The single super-privileged account.
    pub owner_id: i64,

    /// Lower bound of the pause between two broadcast messages, in milliseconds.
    #[serde(default = "default_pacing_min")]
    pub pacing_min_ms: u64,

    /// Upper bound of the pause between two broadcast messages, in milliseconds.
    #[serde(default = "default_pacing_max")]
    pub pacing_max_ms: u64,
}

fn default_pacing_min() -> u64 {
    300
}

fn default_pacing_max() -> u64 {
    1500
}

impl BotSettings {
    /// Creates settings for the given owner with default pacing.
    #[must_use]
    pub fn new(owner_id: i64) -> Self {
        Self {
            owner_id,
            pacing_min_ms: default_pacing_min(),
            pacing_max_ms: default_pacing_max(),
        }
    }

    /// Creates bot settings from environment variables.
    ///
    /// `OWNER_ID` is required; pacing bounds fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `OWNER_ID` is missing, zero or not a number.
    pub fn from_env() -> Result<Self, ConfigError> {
        let owner_id: i64 = required_var("OWNER_ID")?
            .trim()
            .parse()
            .ok()
            .filter(|id| *id != 0)
            .ok_or(ConfigError::InvalidOwnerId)?;

        let pacing_min_ms = env_or("PACING_MIN_MS", default_pacing_min);
        let pacing_max_ms = env_or("PACING_MAX_MS", default_pacing_max);
        if pacing_min_ms > pacing_max_ms {
            return Err(ConfigError::InvalidPacing {
                min: pacing_min_ms,
                max: pacing_max_ms,
            });
        }

        Ok(Self {
            owner_id,
            pacing_min_ms,
            pacing_max_ms,
        })
    }

    /// Returns the pacing bounds as durations.
    #[must_use]
    pub const fn pacing_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.pacing_min_ms),
            Duration::from_millis(self.pacing_max_ms),
        )
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::MissingEnvVar(name))
}

fn env_or(name: &str, default: fn() -> u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or_else(default)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid API ID format (must be a positive integer)")]
    InvalidApiId,

    #[error("Invalid OWNER_ID (must be a non-zero integer)")]
    InvalidOwnerId,

    #[error("Invalid pacing bounds: min {min}ms is greater than max {max}ms")]
    InvalidPacing { min: u64, max: u64 },
}
