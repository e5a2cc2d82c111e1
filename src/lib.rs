//! Spam Bot Library
//!
//! A Telegram bot that floods authorized chats with mention messages on
//! command.
//!
//! This crate provides the core functionality for:
//! - Persisting users, chats, the trigger command and message templates
//! - Owner and authorized-user permission checks
//! - Building shuffled message pools and sending them with pacing
//! - Handling owner commands via private chat messages

pub mod auth;
pub mod broadcast;
pub mod commands;
pub mod config;
pub mod telegram;
