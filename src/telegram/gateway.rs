//! Platform-facing interfaces consumed by the bot core.
//!
//! The command handler and the broadcast engine only see these traits;
//! [`TelegramBot`](super::TelegramBot) implements them over MTProto and
//! tests implement them with in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Kind of conversation a message arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    /// One-to-one conversation with the bot.
    Private,
    /// Basic group or supergroup.
    Group,
    /// Broadcast channel.
    Channel,
}

impl ChatKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Private => "Private",
            Self::Group => "Group",
            Self::Channel => "Channel",
        }
    }
}

/// The bot's own standing in a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Owner,
    Administrator,
    Member,
    None,
}

impl MemberStatus {
    /// Whether the bot may broadcast here.
    #[must_use]
    pub const fn can_broadcast(self) -> bool {
        matches!(self, Self::Owner | Self::Administrator)
    }
}

/// Title and kind of a chat, for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub title: String,
    pub kind: ChatKind,
}

/// Outcome of a failed send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("rate limited, retry after {0:?}")]
    FloodWait(Duration),

    #[error("write access to the chat was revoked")]
    WriteForbidden,

    #[error("send failed: {0}")]
    Other(String),
}

/// Identity resolution and chat metadata.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Resolves a numeric id or `@handle` to a user id.
    async fn resolve_user(&self, input: &str) -> Option<i64>;

    /// Resolves a numeric id or `@handle` to a chat id.
    async fn resolve_chat(&self, input: &str) -> Option<i64>;

    /// Display name of a user, if the platform knows one.
    async fn display_name(&self, user_id: i64) -> Option<String>;

    /// The bot's own membership status in a chat.
    async fn self_status(&self, chat_id: i64) -> MemberStatus;

    /// Title and kind of a chat, if it can be fetched.
    async fn describe_chat(&self, chat_id: i64) -> Option<ChatSummary>;
}

/// Outgoing message delivery.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Sends HTML `text` to `chat_id`.
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), SendError>;
}

/// Parses a numeric id literal (optionally negative). Zero is not an id.
#[must_use]
pub fn parse_numeric_id(input: &str) -> Option<i64> {
    let input = input.trim();
    let digits = input.strip_prefix('-').unwrap_or(input);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    input.parse().ok().filter(|&id: &i64| id != 0)
}

/// Strips a leading `@` from a handle; `None` if nothing usable remains.
#[must_use]
pub fn parse_handle(input: &str) -> Option<&str> {
    let handle = input.trim().trim_start_matches('@');
    let valid = !handle.is_empty()
        && handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_id() {
        assert_eq!(parse_numeric_id("12345"), Some(12345));
        assert_eq!(parse_numeric_id("-1001234"), Some(-1_001_234));
        assert_eq!(parse_numeric_id("0"), None);
        assert_eq!(parse_numeric_id("-"), None);
        assert_eq!(parse_numeric_id("12a"), None);
        assert_eq!(parse_numeric_id("+5"), None);
        assert_eq!(parse_numeric_id("@user"), None);
    }

    #[test]
    fn test_parse_handle() {
        assert_eq!(parse_handle("@some_user"), Some("some_user"));
        assert_eq!(parse_handle("channel42"), Some("channel42"));
        assert_eq!(parse_handle("@"), None);
        assert_eq!(parse_handle("bad handle"), None);
    }

    #[test]
    fn test_member_status_gate() {
        assert!(MemberStatus::Owner.can_broadcast());
        assert!(MemberStatus::Administrator.can_broadcast());
        assert!(!MemberStatus::Member.can_broadcast());
        assert!(!MemberStatus::None.can_broadcast());
    }
}
