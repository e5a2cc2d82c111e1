//! Configuration module for the spam bot.
//!
//! Handles environment settings, Telegram API credentials and the
//! persisted JSON document with authorized users, chats and templates.

mod settings;
mod store;

pub use settings::{BotSettings, ConfigError, TelegramConfig};
pub use store::{
    BotConfig, Change, ConfigIssue, ConfigStore, Severity, StoreError, TemplateRemoval,
    TriggerChange, normalize_trigger,
};

/// Placeholder substituted with the target mention at send time.
pub const MENTION_PLACEHOLDER: &str = "{mention}";

/// Template restored by clearing the template list.
pub const DEFAULT_TEMPLATE: &str = "Hello {mention}! Welcome to the group!";

/// Trigger command used until the owner picks another one.
pub const DEFAULT_TRIGGER: &str = "/s";

/// Leading marker of every command.
pub const TRIGGER_MARKER: char = '/';
