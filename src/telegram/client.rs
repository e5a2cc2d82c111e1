//! Telegram bot client over MTProto.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use grammers_client::message::InputMessage;
use grammers_client::peer::Peer;
use grammers_client::{Client, InvocationError, SenderPool, sender};
use grammers_session::storages::SqliteSession;
use grammers_session::updates::UpdatesLike;
use grammers_tl_types as tl;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::gateway::{
    ChatKind, ChatSummary, Directory, MemberStatus, MessageSender, SendError, parse_handle,
    parse_numeric_id,
};
use crate::config::TelegramConfig;

/// Raw update feed handed to the listener.
pub type UpdatesReceiver = mpsc::UnboundedReceiver<UpdatesLike>;

/// Errors that can occur during Telegram operations.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Sign in failed: {0}")]
    SignInFailed(String),

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Write access to the chat was revoked")]
    WriteForbidden,

    #[error("Chat {0} has not been seen yet")]
    UnknownChat(i64),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("API invocation error: {0}")]
    Invocation(String),
}

/// RPC errors meaning the bot can no longer post in a chat.
const WRITE_FORBIDDEN_ERRORS: &[&str] = &[
    "CHAT_WRITE_FORBIDDEN",
    "CHAT_ADMIN_REQUIRED",
    "USER_BANNED_IN_CHANNEL",
    "CHANNEL_PRIVATE",
];

impl From<InvocationError> for TelegramError {
    fn from(err: InvocationError) -> Self {
        classify_error(&err.to_string())
    }
}

impl From<TelegramError> for SendError {
    fn from(err: TelegramError) -> Self {
        match err {
            TelegramError::FloodWait(seconds) => {
                Self::FloodWait(Duration::from_secs(u64::from(seconds)))
            }
            TelegramError::WriteForbidden => Self::WriteForbidden,
            other => Self::Other(other.to_string()),
        }
    }
}

fn classify_error(err_str: &str) -> TelegramError {
    if (err_str.contains("FLOOD_WAIT") || err_str.to_lowercase().contains("flood"))
        && let Some(seconds) = extract_flood_wait_seconds(err_str)
    {
        return TelegramError::FloodWait(seconds);
    }

    if WRITE_FORBIDDEN_ERRORS.iter().any(|code| err_str.contains(code)) {
        return TelegramError::WriteForbidden;
    }

    TelegramError::Invocation(err_str.to_owned())
}

/// Extracts flood wait seconds from an error message.
fn extract_flood_wait_seconds(err_msg: &str) -> Option<u32> {
    let patterns = ["FLOOD_WAIT_", "flood wait "];
    let lowered = err_msg.to_lowercase();

    for pattern in patterns {
        if let Some(idx) = lowered.find(&pattern.to_lowercase()) {
            let start = idx + pattern.len();
            let num_str: String = lowered[start..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(seconds) = num_str.parse() {
                return Some(seconds);
            }
        }
    }
    None
}

/// Dialog id of a peer in Bot API form (`-100…` for channels).
#[must_use]
pub fn peer_chat_id(peer: &Peer) -> i64 {
    peer.id().bot_api_dialog_id()
}

/// Conversation kind of a peer; supergroups count as groups.
#[must_use]
pub fn chat_kind(peer: &Peer) -> ChatKind {
    match peer {
        Peer::User(_) => ChatKind::Private,
        Peer::Group(_) => ChatKind::Group,
        Peer::Channel(channel) if channel.raw.megagroup => ChatKind::Group,
        Peer::Channel(_) => ChatKind::Channel,
    }
}

/// The bot's standing in a chat, read from the flags Telegram attaches
/// to the chat entity.
fn member_status(peer: &Peer) -> MemberStatus {
    let flags = match peer {
        Peer::User(_) => None,
        Peer::Group(group) => match &group.raw {
            tl::enums::Chat::Chat(c) => Some((c.creator, c.admin_rights.is_some(), c.left)),
            tl::enums::Chat::Channel(c) => Some((c.creator, c.admin_rights.is_some(), c.left)),
            _ => None,
        },
        Peer::Channel(channel) => Some((
            channel.raw.creator,
            channel.raw.admin_rights.is_some(),
            channel.raw.left,
        )),
    };

    match flags {
        Some((true, _, _)) => MemberStatus::Owner,
        Some((_, true, _)) => MemberStatus::Administrator,
        Some((_, _, false)) => MemberStatus::Member,
        _ => MemberStatus::None,
    }
}

fn user_display_name(user: &tl::enums::User) -> Option<String> {
    let tl::enums::User::User(user) = user else {
        return None;
    };
    let name = [user.first_name.as_deref(), user.last_name.as_deref()]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!name.is_empty()).then_some(name)
}

/// High-level Telegram bot client.
///
/// Keeps every chat and user it has seen so later commands can address
/// them by id; bots cannot enumerate dialogs.
pub struct TelegramBot {
    /// The underlying grammers client.
    client: Client,

    /// Handle to the sender pool for disconnection.
    handle: sender::SenderPoolHandle,

    /// Chats by Bot API dialog id.
    peers: RwLock<HashMap<i64, Peer>>,

    /// Display names of users seen so far.
    user_names: RwLock<HashMap<i64, String>>,

    /// The bot's own username.
    username: Option<String>,

    /// Background task running the sender pool.
    _pool_task: JoinHandle<()>,
}

impl TelegramBot {
    /// Connects to Telegram and signs in with the bot token if the session
    /// is not authorized yet.
    ///
    /// Returns the client and the raw update feed for the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be opened, the connection
    /// fails, or the token is rejected.
    pub async fn connect(config: &TelegramConfig) -> Result<(Self, UpdatesReceiver), TelegramError> {
        info!("Connecting to Telegram...");

        let session = Arc::new(
            SqliteSession::open(&config.session_path)
                .await
                .map_err(|e| TelegramError::Session(e.to_string()))?,
        );

        let SenderPool {
            runner,
            updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), config.api_id);

        let client = Client::new(handle.clone());

        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        let is_authorized = client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))?;

        if is_authorized {
            debug!(
                "Reusing authorized session {}",
                config.session_path.display()
            );
        } else {
            info!("Signing in with bot token...");
            client
                .bot_sign_in(&config.bot_token, &config.api_hash)
                .await
                .map_err(|e| TelegramError::SignInFailed(e.to_string()))?;
        }

        let me = client.get_me().await?;
        let username = me.username().map(str::to_owned);
        info!(
            "Connected to Telegram as @{}",
            username.as_deref().unwrap_or("<no username>")
        );

        let bot = Self {
            client,
            handle: handle.thin,
            peers: RwLock::new(HashMap::new()),
            user_names: RwLock::new(HashMap::new()),
            username,
            _pool_task: pool_task,
        };

        Ok((bot, updates))
    }

    /// The bot's own username, without `@`.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns a reference to the underlying client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Caches a peer so it can be addressed by id later.
    pub async fn remember_peer(&self, peer: &Peer) {
        let id = peer_chat_id(peer);
        if let Peer::User(user) = peer
            && let Some(name) = user_display_name(&user.raw)
        {
            self.user_names.write().await.insert(id, name);
        }
        self.peers.write().await.insert(id, peer.clone());
    }

    async fn resolve_handle(&self, input: &str) -> Option<Peer> {
        let handle = parse_handle(input)?;
        match self.client.resolve_username(handle).await {
            Ok(Some(peer)) => {
                self.remember_peer(&peer).await;
                Some(peer)
            }
            Ok(None) => {
                debug!("Username @{} not found", handle);
                None
            }
            Err(e) => {
                warn!("Failed to resolve @{}: {}", handle, e);
                None
            }
        }
    }

    async fn fetch_user_name(&self, user_id: i64) -> Option<String> {
        let request = tl::functions::users::GetUsers {
            id: vec![tl::enums::InputUser::User(tl::types::InputUser {
                user_id,
                access_hash: 0,
            })],
        };

        match self.client.invoke(&request).await {
            Ok(users) => users.first().and_then(user_display_name),
            Err(e) => {
                debug!("Could not fetch user {}: {}", user_id, e);
                None
            }
        }
    }

    /// Sends an HTML message to a cached chat.
    ///
    /// # Errors
    ///
    /// Returns an error if the chat has never been seen or the request fails.
    pub async fn send_html(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let peer = self
            .peers
            .read()
            .await
            .get(&chat_id)
            .cloned()
            .ok_or(TelegramError::UnknownChat(chat_id))?;

        self.client
            .send_message(&peer, InputMessage::new().html(text))
            .await?;
        Ok(())
    }

    /// Disconnects from Telegram.
    pub fn disconnect(&self) {
        info!("Disconnecting from Telegram...");
        self.handle.quit();
    }
}

#[async_trait]
impl Directory for TelegramBot {
    async fn resolve_user(&self, input: &str) -> Option<i64> {
        if let Some(id) = parse_numeric_id(input) {
            return Some(id);
        }
        match self.resolve_handle(input).await? {
            peer @ Peer::User(_) => Some(peer_chat_id(&peer)),
            _ => None,
        }
    }

    async fn resolve_chat(&self, input: &str) -> Option<i64> {
        if let Some(id) = parse_numeric_id(input) {
            return Some(id);
        }
        match self.resolve_handle(input).await? {
            Peer::User(_) => None,
            peer => Some(peer_chat_id(&peer)),
        }
    }

    async fn display_name(&self, user_id: i64) -> Option<String> {
        if let Some(name) = self.user_names.read().await.get(&user_id) {
            return Some(name.clone());
        }

        let name = self.fetch_user_name(user_id).await?;
        self.user_names.write().await.insert(user_id, name.clone());
        Some(name)
    }

    async fn self_status(&self, chat_id: i64) -> MemberStatus {
        self.peers
            .read()
            .await
            .get(&chat_id)
            .map_or(MemberStatus::None, member_status)
    }

    async fn describe_chat(&self, chat_id: i64) -> Option<ChatSummary> {
        let peers = self.peers.read().await;
        let peer = peers.get(&chat_id)?;
        Some(ChatSummary {
            title: peer.name().unwrap_or_default().to_owned(),
            kind: chat_kind(peer),
        })
    }
}

#[async_trait]
impl MessageSender for TelegramBot {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        self.send_html(chat_id, text).await.map_err(SendError::from)
    }
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
