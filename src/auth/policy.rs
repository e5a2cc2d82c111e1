//! Role and permission checks.

use crate::config::BotConfig;
use crate::telegram::ChatKind;

/// Role of an actor relative to the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Authorized,
    Stranger,
}

/// Why an administrative command was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminDenial {
    /// Sent from a group or channel; ignored regardless of sender.
    SharedContext,
    /// Sent privately by someone other than the owner.
    NotOwner,
}

/// Permission checks evaluated against one configuration snapshot.
///
/// Build a fresh policy per request so revocations apply immediately.
#[derive(Debug, Clone, Copy)]
pub struct AccessPolicy<'a> {
    config: &'a BotConfig,
}

impl<'a> AccessPolicy<'a> {
    #[must_use]
    pub const fn new(config: &'a BotConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn is_owner(&self, actor_id: i64) -> bool {
        actor_id == self.config.owner_id
    }

    /// Owner or explicitly authorized user.
    #[must_use]
    pub fn is_authorized_user(&self, actor_id: i64) -> bool {
        self.is_owner(actor_id) || self.config.authorized_users.contains(&actor_id)
    }

    #[must_use]
    pub fn is_authorized_chat(&self, chat_id: i64) -> bool {
        self.config.authorized_chats.contains(&chat_id)
    }

    /// The single gate in front of the distribution engine.
    #[must_use]
    pub fn can_broadcast(&self, actor_id: i64, chat_id: i64) -> bool {
        self.is_authorized_user(actor_id) && self.is_authorized_chat(chat_id)
    }

    #[must_use]
    pub fn role(&self, actor_id: i64) -> Role {
        if self.is_owner(actor_id) {
            Role::Owner
        } else if self.is_authorized_user(actor_id) {
            Role::Authorized
        } else {
            Role::Stranger
        }
    }

    /// Administrative commands: owner only, one-to-one chat only.
    ///
    /// # Errors
    ///
    /// Returns the reason the command must be refused.
    pub fn check_admin(&self, actor_id: Option<i64>, chat: ChatKind) -> Result<(), AdminDenial> {
        if chat != ChatKind::Private {
            return Err(AdminDenial::SharedContext);
        }
        match actor_id {
            Some(id) if self.is_owner(id) => Ok(()),
            _ => Err(AdminDenial::NotOwner),
        }
    }
}
