//! Update loop feeding incoming messages to the command handler.

use std::sync::Arc;

use grammers_client::client::UpdatesConfiguration;
use grammers_client::message::InputMessage;
use grammers_client::peer::Peer;
use grammers_client::update::Update;
use tracing::{debug, error, info, warn};

use super::client::{TelegramBot, TelegramError, UpdatesReceiver, chat_kind, peer_chat_id};
use crate::commands::{CommandHandler, Incoming};

/// Receives updates until the connection fails.
///
/// Every message is handled on its own task, so a long broadcast in one
/// chat does not hold up commands elsewhere.
///
/// # Errors
///
/// Returns an error if the update stream breaks.
pub async fn run(
    bot: Arc<TelegramBot>,
    updates: UpdatesReceiver,
    handler: Arc<CommandHandler>,
) -> Result<(), TelegramError> {
    let mut stream = bot.inner().stream_updates(
        updates,
        UpdatesConfiguration {
            catch_up: false,
            ..Default::default()
        },
    );

    info!("Listening for messages");

    loop {
        let update = match stream.next().await {
            Ok(update) => update,
            Err(e) => {
                error!("Update stream failed: {}", e);
                return Err(e.into());
            }
        };

        let Update::NewMessage(message) = update else {
            continue;
        };
        if message.outgoing() {
            continue;
        }

        let Some(peer) = message.peer().cloned() else {
            debug!("Skipping message without chat info");
            continue;
        };
        bot.remember_peer(&peer).await;

        let actor_id = match message.sender() {
            Some(sender @ Peer::User(_)) => {
                bot.remember_peer(sender).await;
                Some(peer_chat_id(sender))
            }
            _ => None,
        };

        let text = message.text().trim().to_owned();
        if text.is_empty() {
            continue;
        }

        let incoming = Incoming {
            actor_id,
            chat_id: peer_chat_id(&peer),
            chat: chat_kind(&peer),
            text,
        };

        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let Some(result) = handler.try_handle(&incoming).await else {
                return;
            };
            if let Err(e) = message.reply(InputMessage::new().html(result.message)).await {
                warn!("Failed to reply in chat {}: {}", incoming.chat_id, e);
            }
        });
    }
}
