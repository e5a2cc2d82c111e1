//! Command handling module.
//!
//! Owner commands manage users, chats, the trigger and the templates from a
//! private chat; the configurable trigger starts a broadcast in a group.

mod handler;
mod types;

pub use handler::CommandHandler;
pub use types::{BotCommand, CommandResult, Incoming, RESERVED_COMMANDS};
