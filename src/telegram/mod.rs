//! Telegram client wrapper module.
//!
//! The core depends only on the platform-neutral [`Directory`] and
//! [`MessageSender`] traits;
//! [`TelegramBot`] implements them over MTProto and [`listener`] drives the
//! update loop.

mod client;
mod gateway;
pub mod listener;

pub use client::{TelegramBot, TelegramError, UpdatesReceiver, chat_kind, peer_chat_id};
pub use gateway::{
    ChatKind, ChatSummary, Directory, MemberStatus, MessageSender, SendError, parse_handle,
    parse_numeric_id,
};
