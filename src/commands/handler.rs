//! Command handler implementation.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::types::{BotCommand, CommandResult, Incoming};
use crate::auth::{AccessPolicy, AdminDenial, Role};
use crate::broadcast::{BroadcastReport, Broadcaster, Quantity, render_mention};
use crate::config::{
    BotConfig, Change, ConfigStore, MENTION_PLACEHOLDER, StoreError, TemplateRemoval,
};
use crate::telegram::{ChatKind, Directory, MessageSender};

/// Longest command name Telegram accepts.
const MAX_COMMAND_LEN: usize = 32;

/// Templates shown in the owner's introduction.
const INTRO_TEMPLATE_PREVIEW: usize = 5;

const OWNER_ONLY: &str = "⛔ This command is for owner only!";

/// Routes parsed commands to their policy check and handler.
pub struct CommandHandler {
    /// Configuration record and its backing file.
    store: Arc<ConfigStore>,

    /// Identity resolution and chat metadata.
    directory: Arc<dyn Directory>,

    /// Delivery channel for broadcasts.
    sender: Arc<dyn MessageSender>,

    /// Broadcast engine.
    broadcaster: Broadcaster,

    /// The bot's own username, for `/cmd@name` addressing.
    bot_username: Option<String>,
}

impl CommandHandler {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(
        store: Arc<ConfigStore>,
        directory: Arc<dyn Directory>,
        sender: Arc<dyn MessageSender>,
        broadcaster: Broadcaster,
        bot_username: Option<String>,
    ) -> Self {
        Self {
            store,
            directory,
            sender,
            broadcaster,
            bot_username,
        }
    }

    /// Tries to parse and execute a command from a message.
    ///
    /// Returns `None` if nothing should be replied: not a command, a
    /// command from a shared chat, or any broadcast.
    pub async fn try_handle(&self, incoming: &Incoming) -> Option<CommandResult> {
        let config = self.store.snapshot().await;
        let command = BotCommand::parse(
            &incoming.text,
            &config.spam_command,
            self.bot_username.as_deref(),
        )?;

        debug!(
            "Handling command {} from {:?} in chat {}",
            command, incoming.actor_id, incoming.chat_id
        );

        let policy = AccessPolicy::new(&config);

        match command {
            BotCommand::Broadcast(args) => {
                // Broadcasts never reply; the report is only logged.
                if let Some(report) = self.broadcast(incoming, &config, &args).await {
                    debug!("Broadcast report: {:?}", report);
                }
                None
            }
            BotCommand::Start => {
                if incoming.chat != ChatKind::Private {
                    return None;
                }
                let actor = incoming.actor_id?;
                Some(CommandResult::success(introduction(&config, actor)))
            }
            command => match policy.check_admin(incoming.actor_id, incoming.chat) {
                Err(AdminDenial::SharedContext) => {
                    debug!("Ignoring /{} outside a private chat", command.name());
                    None
                }
                Err(AdminDenial::NotOwner) => {
                    info!(
                        "Refused /{} from non-owner {:?}",
                        command.name(),
                        incoming.actor_id
                    );
                    Some(CommandResult::error(OWNER_ONLY))
                }
                Ok(()) => {
                    let result = self.execute_admin(command, &config).await;
                    info!("Command result: success={}", result.success);
                    Some(result)
                }
            },
        }
    }

    /// Executes an owner command that already passed the policy check.
    async fn execute_admin(&self, command: BotCommand, config: &BotConfig) -> CommandResult {
        match command {
            BotCommand::AuthorizeUser(arg) => self.handle_authorize_user(arg.as_deref()).await,
            BotCommand::RevokeUser(arg) => self.handle_revoke_user(arg.as_deref()).await,
            BotCommand::ListUsers => handle_list_users(config),
            BotCommand::AuthorizeChat(arg) => self.handle_authorize_chat(arg.as_deref()).await,
            BotCommand::RevokeChat(arg) => self.handle_revoke_chat(arg.as_deref()).await,
            BotCommand::ListChats => self.handle_list_chats(config).await,
            BotCommand::SetTrigger(arg) => self.handle_set_trigger(arg.as_deref()).await,
            BotCommand::AddTemplate(arg) => self.handle_add_template(arg.as_deref()).await,
            BotCommand::DeleteTemplate(arg) => {
                self.handle_delete_template(arg.as_deref(), config).await
            }
            BotCommand::ListTemplates => handle_list_templates(config),
            BotCommand::ClearTemplates => self.handle_clear_templates().await,
            BotCommand::Start | BotCommand::Broadcast(_) => {
                CommandResult::error("This command is not an owner command.")
            }
        }
    }

    /// Runs the broadcast if every precondition holds; otherwise does nothing.
    async fn broadcast(
        &self,
        incoming: &Incoming,
        config: &BotConfig,
        args: &[String],
    ) -> Option<BroadcastReport> {
        if incoming.chat == ChatKind::Private {
            return None;
        }

        let actor = incoming.actor_id?;
        if !AccessPolicy::new(config).can_broadcast(actor, incoming.chat_id) {
            debug!("Broadcast by {} in {} not permitted", actor, incoming.chat_id);
            return None;
        }

        let [target, quantity, ..] = args else {
            return None;
        };
        let quantity = Quantity::parse(quantity)?;

        let Some(target_id) = self.directory.resolve_user(target).await else {
            debug!("Broadcast target {:?} not resolved", target);
            return None;
        };
        let name = self.directory.display_name(target_id).await?;
        let mention = render_mention(target_id, &name);

        let status = self.directory.self_status(incoming.chat_id).await;
        if !status.can_broadcast() {
            debug!("Not an admin in {} ({:?}), skipping broadcast", incoming.chat_id, status);
            return None;
        }

        if config.spam_messages.is_empty() {
            return None;
        }

        info!(
            "Broadcasting {} messages to {} for {} (target {})",
            quantity.get(),
            incoming.chat_id,
            actor,
            target_id
        );

        Some(
            self.broadcaster
                .run(
                    self.sender.as_ref(),
                    incoming.chat_id,
                    &mention,
                    &config.spam_messages,
                    quantity,
                )
                .await,
        )
    }

    async fn handle_authorize_user(&self, arg: Option<&str>) -> CommandResult {
        let Some(input) = arg else {
            return CommandResult::error("Usage: <code>/a &lt;user_id_or_username&gt;</code>");
        };
        let Some(user_id) = self.directory.resolve_user(input).await else {
            return CommandResult::error("❌ Invalid user ID or username!");
        };

        match self.store.authorize_user(user_id).await {
            Ok(Change::Applied) => CommandResult::success(format!(
                "✅ User <code>{user_id}</code> has been authorized!"
            )),
            Ok(Change::OwnerProtected) => {
                CommandResult::error("⚠️ Owner is already authorized by default!")
            }
            Ok(_) => CommandResult::error("⚠️ User is already authorized!"),
            Err(e) => save_failed(&e),
        }
    }

    async fn handle_revoke_user(&self, arg: Option<&str>) -> CommandResult {
        let Some(input) = arg else {
            return CommandResult::error("Usage: <code>/r &lt;user_id_or_username&gt;</code>");
        };
        let Some(user_id) = self.directory.resolve_user(input).await else {
            return CommandResult::error("❌ Invalid user ID or username!");
        };

        match self.store.revoke_user(user_id).await {
            Ok(Change::Applied) => CommandResult::success(format!(
                "✅ User <code>{user_id}</code> has been removed!"
            )),
            Ok(Change::OwnerProtected) => CommandResult::error("❌ Cannot remove owner!"),
            Ok(_) => CommandResult::error("⚠️ User is not in authorized list!"),
            Err(e) => save_failed(&e),
        }
    }

    async fn handle_authorize_chat(&self, arg: Option<&str>) -> CommandResult {
        let Some(input) = arg else {
            return CommandResult::error(
                "Usage: <code>/addchat &lt;chat_id_or_username&gt;</code>",
            );
        };
        let Some(chat_id) = self.directory.resolve_chat(input).await else {
            return CommandResult::error("❌ Invalid chat ID or username!");
        };

        match self.store.authorize_chat(chat_id).await {
            Ok(Change::Applied) => CommandResult::success(format!(
                "✅ Chat <code>{chat_id}</code> has been authorized!"
            )),
            Ok(_) => CommandResult::error("⚠️ Chat is already authorized!"),
            Err(e) => save_failed(&e),
        }
    }

    async fn handle_revoke_chat(&self, arg: Option<&str>) -> CommandResult {
        let Some(input) = arg else {
            return CommandResult::error(
                "Usage: <code>/removechat &lt;chat_id_or_username&gt;</code>",
            );
        };
        let Some(chat_id) = self.directory.resolve_chat(input).await else {
            return CommandResult::error("❌ Invalid chat ID or username!");
        };

        match self.store.revoke_chat(chat_id).await {
            Ok(Change::Applied) => CommandResult::success(format!(
                "✅ Chat <code>{chat_id}</code> has been removed!"
            )),
            Ok(_) => CommandResult::error("⚠️ Chat is not in authorized list!"),
            Err(e) => save_failed(&e),
        }
    }

    async fn handle_list_chats(&self, config: &BotConfig) -> CommandResult {
        if config.authorized_chats.is_empty() {
            return CommandResult::error("❌ No authorized chats!");
        }

        let mut lines = String::new();
        for &chat_id in &config.authorized_chats {
            match self.directory.describe_chat(chat_id).await {
                Some(summary) => {
                    let title = if summary.title.is_empty() {
                        "Unknown".to_owned()
                    } else {
                        html_escape::encode_text(&summary.title).into_owned()
                    };
                    let _ = writeln!(
                        lines,
                        "• <code>{chat_id}</code> - {title} ({})",
                        summary.kind.label()
                    );
                }
                None => {
                    let _ = writeln!(
                        lines,
                        "• <code>{chat_id}</code> - Unknown (Cannot fetch info)"
                    );
                }
            }
        }

        CommandResult::success(format!(
            "<b>💬 Authorized Chats ({}):</b>\n\n{lines}",
            config.authorized_chats.len()
        ))
    }

    async fn handle_set_trigger(&self, arg: Option<&str>) -> CommandResult {
        let Some(raw) = arg else {
            return CommandResult::error(
                "Usage: <code>/setcmd &lt;new_command&gt;</code>\nExample: <code>/setcmd spam</code>",
            );
        };

        let name = raw.trim_start_matches('/');
        if !is_valid_command_name(name) {
            return CommandResult::error(format!(
                "❌ Command names use 1-{MAX_COMMAND_LEN} letters, digits or underscores."
            ));
        }
        if BotCommand::is_reserved(name) {
            return CommandResult::error(format!(
                "❌ <code>/{name}</code> is a built-in command, pick another name."
            ));
        }

        match self.store.set_trigger_command(name).await {
            Ok(change) => CommandResult::success(format!(
                "✅ Broadcast command updated!\n\nOld: <code>{}</code>\nNew: <code>{}</code>",
                change.old, change.new
            )),
            Err(e) => save_failed(&e),
        }
    }

    async fn handle_add_template(&self, arg: Option<&str>) -> CommandResult {
        let Some(text) = arg else {
            return CommandResult::error(format!(
                "Usage: <code>/addmsg &lt;message_text&gt;</code>\n\n\
                 Use <code>{MENTION_PLACEHOLDER}</code> as placeholder for user mention.\n\
                 Example: <code>/addmsg Hello {MENTION_PLACEHOLDER}! Check this out!</code>"
            ));
        };

        match self.store.add_spam_message(text).await {
            Ok((Change::Applied, total)) => {
                CommandResult::success(format!(
                    "✅ Message added!\nTotal messages: <code>{total}</code>\n\n\
                     <b>Message:</b> <code>{}</code>",
                    html_escape::encode_text(text)
                ))
            }
            Ok(_) => CommandResult::error("⚠️ This message already exists in the list!"),
            Err(e) => save_failed(&e),
        }
    }

    async fn handle_delete_template(&self, arg: Option<&str>, config: &BotConfig) -> CommandResult {
        let Some(raw_index) = arg else {
            if config.spam_messages.is_empty() {
                return CommandResult::error("❌ No messages configured!");
            }
            return CommandResult::success(format!(
                "📝 Current messages:\n\n{}\n\
                 Usage: <code>/delmsg &lt;index&gt;</code>\n\
                 Example: <code>/delmsg 1</code> to delete first message",
                numbered_templates(&config.spam_messages, None)
            ));
        };

        let Ok(index) = raw_index.parse::<i64>() else {
            return CommandResult::error("❌ Invalid index! Please provide a number.");
        };
        // Negative indices are out of range like any other.
        let index = usize::try_from(index).unwrap_or(0);

        match self.store.remove_spam_message(index).await {
            Ok(TemplateRemoval::Removed { text, remaining }) => CommandResult::success(format!(
                "✅ Message deleted!\nRemaining messages: <code>{remaining}</code>\n\n\
                 <b>Deleted:</b> <code>{}</code>",
                html_escape::encode_text(&text)
            )),
            Ok(TemplateRemoval::OutOfRange { len: 0 }) => {
                CommandResult::error("❌ No messages configured!")
            }
            Ok(TemplateRemoval::OutOfRange { len }) => {
                CommandResult::error(format!("❌ Invalid index! Please use 1-{len}"))
            }
            Ok(TemplateRemoval::LastTemplate) => CommandResult::error(
                "⚠️ Cannot delete the last message!\n\
                 Add another one first, or use <code>/clrmsg</code> to reset to the default.",
            ),
            Err(e) => save_failed(&e),
        }
    }

    async fn handle_clear_templates(&self) -> CommandResult {
        match self.store.clear_spam_messages().await {
            Ok(Change::Applied) => CommandResult::success(
                "✅ All messages cleared!\nDefault message has been added.",
            ),
            Ok(_) => CommandResult::error("❌ No messages to clear!"),
            Err(e) => save_failed(&e),
        }
    }
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("broadcaster", &self.broadcaster)
            .field("bot_username", &self.bot_username)
            .finish_non_exhaustive()
    }
}

fn handle_list_users(config: &BotConfig) -> CommandResult {
    let users = if config.authorized_users.is_empty() {
        "No authorized users (only owner)".to_owned()
    } else {
        config
            .authorized_users
            .iter()
            .map(|id| format!("• <code>{id}</code>"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    CommandResult::success(format!(
        "<b>👥 Authorized Users:</b>\n\n\
         <b>Owner:</b> <code>{}</code>\n\n\
         <b>Authorized Users ({}):</b>\n{users}",
        config.owner_id,
        config.authorized_users.len()
    ))
}

fn handle_list_templates(config: &BotConfig) -> CommandResult {
    if config.spam_messages.is_empty() {
        return CommandResult::error("❌ No messages configured!");
    }

    CommandResult::success(format!(
        "📝 Messages ({}):\n\n{}",
        config.spam_messages.len(),
        numbered_templates(&config.spam_messages, None)
    ))
}

/// Role-dependent `/start` text.
fn introduction(config: &BotConfig, actor: i64) -> String {
    let trigger = &config.spam_command;
    let header = "<b>✨ Welcome to Spam Bot ✨</b>";

    match AccessPolicy::new(config).role(actor) {
        Role::Owner => {
            let mut commands = String::new();
            for (usage, description) in BotCommand::owner_commands() {
                let _ = writeln!(commands, "• <code>{usage}</code> - {description}");
            }
            format!(
                "{header}\n\n\
                 <b>Owner:</b> <code>{owner}</code>\n\
                 <b>Your ID:</b> <code>{actor}</code>\n\n\
                 <b>📋 Available Commands:</b>\n\
                 • <code>{trigger} &lt;target&gt; &lt;quantity&gt;</code> - Send messages\n\n\
                 <b>⚙️ Current Configuration:</b>\n\
                 • Broadcast Command: <code>{trigger}</code>\n\
                 • Messages: <code>{templates}</code> available\n\
                 • Authorized Users: <code>{users}</code>\n\
                 • Authorized Chats: <code>{chats}</code>\n\n\
                 <b>📝 Messages:</b>\n{preview}\n\
                 <b>🔧 Owner Commands (PM only):</b>\n{commands}\n\
                 <b>📝 Usage:</b>\n\
                 Send <code>{trigger} @username 5</code> in authorized chats.",
                owner = config.owner_id,
                templates = config.spam_messages.len(),
                users = config.authorized_users.len(),
                chats = config.authorized_chats.len(),
                preview = numbered_templates(&config.spam_messages, Some(INTRO_TEMPLATE_PREVIEW)),
            )
        }
        Role::Authorized => format!(
            "{header}\n\n\
             <b>Your ID:</b> <code>{actor}</code>\n\n\
             <b>📋 Available Commands:</b>\n\
             • <code>{trigger} &lt;target&gt; &lt;quantity&gt;</code> - Send messages in authorized chats\n\n\
             <b>⚙️ Current Configuration:</b>\n\
             • Broadcast Command: <code>{trigger}</code>\n\
             • Messages: <code>{templates}</code> available\n\
             • Your Status: <b>✅ Authorized User</b>\n\n\
             <b>📝 Usage:</b>\n\
             1. Add me to a group/channel as admin\n\
             2. Ask the owner to authorize that chat using <code>/addchat</code>\n\
             3. Use: <code>{trigger} @username 5</code>\n\n\
             <i>Note: the command only works in authorized chats.</i>",
            templates = config.spam_messages.len(),
        ),
        Role::Stranger => format!(
            "{header}\n\n\
             <b>Your ID:</b> <code>{actor}</code>\n\n\
             ⛔ <b>Access Denied</b>\n\n\
             You are not authorized to use this bot.\n\
             Contact the owner (<code>{owner}</code>) for access.\n\n\
             <i>Owner can authorize you using: <code>/a {actor}</code></i>",
            owner = config.owner_id,
        ),
    }
}

/// `1. <code>text</code>` lines, optionally cut after `limit` entries.
fn numbered_templates(templates: &[String], limit: Option<usize>) -> String {
    let shown = limit.unwrap_or(templates.len()).min(templates.len());
    let mut out = String::new();
    for (i, template) in templates.iter().take(shown).enumerate() {
        let _ = writeln!(
            out,
            "{}. <code>{}</code>",
            i + 1,
            html_escape::encode_text(template)
        );
    }
    if templates.len() > shown {
        let _ = writeln!(out, "and {} more...", templates.len() - shown);
    }
    out
}

/// Telegram command names: 1-32 of `[A-Za-z0-9_]`.
fn is_valid_command_name(name: &str) -> bool {
    (1..=MAX_COMMAND_LEN).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn save_failed(err: &StoreError) -> CommandResult {
    warn!("Failed to save config: {}", err);
    CommandResult::error(format!("❌ Failed to save configuration: {err}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::broadcast::Pacer;
    use crate::config::DEFAULT_TEMPLATE;
    use crate::telegram::{ChatSummary, MemberStatus, SendError, parse_handle, parse_numeric_id};

    const OWNER: i64 = 100;
    const USER: i64 = 200;
    const GROUP: i64 = -100_555;

    struct FakeDirectory {
        handles: HashMap<String, i64>,
        names: HashMap<i64, String>,
        status: MemberStatus,
    }

    impl Default for FakeDirectory {
        fn default() -> Self {
            Self {
                handles: HashMap::from([
                    ("alice".to_owned(), USER),
                    ("bob".to_owned(), 300),
                    ("fun_group".to_owned(), GROUP),
                ]),
                names: HashMap::from([(USER, "Alice".to_owned()), (300, "Bob".to_owned())]),
                status: MemberStatus::Administrator,
            }
        }
    }

    impl FakeDirectory {
        fn lookup(&self, input: &str) -> Option<i64> {
            parse_numeric_id(input)
                .or_else(|| parse_handle(input).and_then(|h| self.handles.get(h).copied()))
        }
    }

    #[async_trait]
    impl Directory for FakeDirectory {
        async fn resolve_user(&self, input: &str) -> Option<i64> {
            self.lookup(input)
        }

        async fn resolve_chat(&self, input: &str) -> Option<i64> {
            self.lookup(input)
        }

        async fn display_name(&self, user_id: i64) -> Option<String> {
            self.names.get(&user_id).cloned()
        }

        async fn self_status(&self, _chat_id: i64) -> MemberStatus {
            self.status
        }

        async fn describe_chat(&self, chat_id: i64) -> Option<ChatSummary> {
            (chat_id == GROUP).then(|| ChatSummary {
                title: "Fun & Games".to_owned(),
                kind: ChatKind::Group,
            })
        }
    }

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(i64, String)>>,
    }

    impl RecordingSender {
        fn sent(&self) -> Vec<(i64, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
            self.sent.lock().unwrap().push((chat_id, text.to_owned()));
            Ok(())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        store: Arc<ConfigStore>,
        sender: Arc<RecordingSender>,
        handler: CommandHandler,
    }

    /// `seed` is written as the config file before the store loads it.
    fn build(directory: FakeDirectory, seed: Option<&str>, pacer: Pacer) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        if let Some(seed) = seed {
            std::fs::write(&path, seed).unwrap();
        }
        let store = Arc::new(ConfigStore::load(path, OWNER));
        let sender = Arc::new(RecordingSender::default());
        let handler = CommandHandler::new(
            Arc::clone(&store),
            Arc::new(directory),
            Arc::clone(&sender) as Arc<dyn MessageSender>,
            Broadcaster::new(pacer),
            Some("spam_bot".to_owned()),
        );
        Harness {
            _dir: dir,
            store,
            sender,
            handler,
        }
    }

    fn harness_with(directory: FakeDirectory) -> Harness {
        build(directory, None, Pacer::disabled())
    }

    fn harness() -> Harness {
        harness_with(FakeDirectory::default())
    }

    fn private(actor: i64, text: &str) -> Incoming {
        Incoming {
            actor_id: Some(actor),
            chat_id: actor,
            chat: ChatKind::Private,
            text: text.to_owned(),
        }
    }

    fn group(actor: i64, text: &str) -> Incoming {
        Incoming {
            actor_id: Some(actor),
            chat_id: GROUP,
            chat: ChatKind::Group,
            text: text.to_owned(),
        }
    }

    impl Harness {
        async fn run(&self, incoming: Incoming) -> Option<CommandResult> {
            self.handler.try_handle(&incoming).await
        }

        async fn ok(&self, incoming: Incoming) -> String {
            let result = self.run(incoming).await.unwrap();
            assert!(result.success, "unexpected failure: {}", result.message);
            result.message
        }

        async fn err(&self, incoming: Incoming) -> String {
            let result = self.run(incoming).await.unwrap();
            assert!(!result.success, "unexpected success: {}", result.message);
            result.message
        }

        async fn authorize_broadcast(&self) {
            self.ok(private(OWNER, "/a 200")).await;
            self.ok(private(OWNER, &format!("/addchat {GROUP}"))).await;
        }
    }

    #[tokio::test]
    async fn test_non_command_is_ignored() {
        let h = harness();
        assert!(h.run(private(OWNER, "hello")).await.is_none());
    }

    #[tokio::test]
    async fn test_admin_commands_refused_for_non_owner() {
        let h = harness();
        assert_eq!(h.err(private(USER, "/listauth")).await, OWNER_ONLY);
        assert_eq!(h.err(private(USER, "/a 300")).await, OWNER_ONLY);
        assert!(h.store.snapshot().await.authorized_users.is_empty());
    }

    #[tokio::test]
    async fn test_admin_commands_silent_in_groups_even_for_owner() {
        let h = harness();
        assert!(h.run(group(OWNER, "/a 300")).await.is_none());
        assert!(h.run(group(USER, "/clrmsg")).await.is_none());
        assert!(h.store.snapshot().await.authorized_users.is_empty());
    }

    #[tokio::test]
    async fn test_authorize_and_revoke_user() {
        let h = harness();

        let message = h.ok(private(OWNER, "/a @alice")).await;
        assert!(message.contains("<code>200</code>"));
        assert_eq!(h.store.snapshot().await.authorized_users, vec![USER]);

        assert!(h.err(private(OWNER, "/a 200")).await.contains("already authorized"));
        assert!(h.err(private(OWNER, "/a 100")).await.contains("by default"));
        assert!(h.err(private(OWNER, "/r 100")).await.contains("Cannot remove owner"));

        h.ok(private(OWNER, "/remove 200")).await;
        assert!(h.err(private(OWNER, "/r 200")).await.contains("not in authorized list"));
    }

    #[tokio::test]
    async fn test_usage_and_resolution_errors() {
        let h = harness();
        assert!(h.err(private(OWNER, "/a")).await.starts_with("Usage:"));
        assert!(h.err(private(OWNER, "/addchat")).await.starts_with("Usage:"));
        assert!(h.err(private(OWNER, "/a @ghost")).await.contains("Invalid user"));
        assert!(h.err(private(OWNER, "/addchat @nowhere")).await.contains("Invalid chat"));
    }

    #[tokio::test]
    async fn test_chat_management_and_listing() {
        let h = harness();
        assert!(h.err(private(OWNER, "/listchats")).await.contains("No authorized chats"));

        h.ok(private(OWNER, "/addchat @fun_group")).await;
        h.ok(private(OWNER, "/addchat -42")).await;
        assert!(h.err(private(OWNER, "/addchat -42")).await.contains("already authorized"));

        let listing = h.ok(private(OWNER, "/listchats")).await;
        assert!(listing.contains("(2)"));
        assert!(listing.contains("Fun &amp; Games (Group)"));
        assert!(listing.contains("<code>-42</code> - Unknown (Cannot fetch info)"));

        h.ok(private(OWNER, "/removechat -42")).await;
        assert!(h.err(private(OWNER, "/removechat -42")).await.contains("not in authorized list"));
    }

    #[tokio::test]
    async fn test_list_users() {
        let h = harness();
        assert!(h.ok(private(OWNER, "/listauth")).await.contains("only owner"));

        h.ok(private(OWNER, "/a 200")).await;
        let listing = h.ok(private(OWNER, "/listauth")).await;
        assert!(listing.contains("<b>Owner:</b> <code>100</code>"));
        assert!(listing.contains("• <code>200</code>"));
    }

    #[tokio::test]
    async fn test_set_trigger() {
        let h = harness();
        assert!(h.err(private(OWNER, "/setcmd")).await.starts_with("Usage:"));
        assert!(h.err(private(OWNER, "/setcmd listauth")).await.contains("built-in"));
        assert!(h.err(private(OWNER, "/setcmd bad-name")).await.contains("letters"));

        let message = h.ok(private(OWNER, "/setcmd spam")).await;
        assert!(message.contains("Old: <code>/s</code>"));
        assert!(message.contains("New: <code>/spam</code>"));
        assert_eq!(h.store.snapshot().await.spam_command, "/spam");
    }

    #[tokio::test]
    async fn test_template_management() {
        let h = harness();

        let message = h.ok(private(OWNER, "/addmsg Yo {mention} <3")).await;
        assert!(message.contains("Total messages: <code>2</code>"));
        assert!(message.contains("Yo {mention} &lt;3"));
        assert!(h.err(private(OWNER, "/addmsg Yo {mention} <3")).await.contains("already exists"));

        let listing = h.ok(private(OWNER, "/listmsg")).await;
        assert!(listing.contains("Messages (2)"));
        assert!(listing.contains("2. <code>Yo {mention} &lt;3</code>"));

        let prompt = h.ok(private(OWNER, "/delmsg")).await;
        assert!(prompt.contains("Usage: <code>/delmsg"));

        assert!(h.err(private(OWNER, "/delmsg abc")).await.contains("provide a number"));
        assert!(h.err(private(OWNER, "/delmsg 3")).await.contains("use 1-2"));
        assert!(h.err(private(OWNER, "/delmsg 0")).await.contains("use 1-2"));
        assert!(h.err(private(OWNER, "/delmsg -1")).await.contains("use 1-2"));
        assert_eq!(h.store.snapshot().await.spam_messages.len(), 2);

        let message = h.ok(private(OWNER, "/delmsg 1")).await;
        assert!(message.contains("Remaining messages: <code>1</code>"));

        h.ok(private(OWNER, "/clrmsg")).await;
        assert_eq!(
            h.store.snapshot().await.spam_messages,
            vec![DEFAULT_TEMPLATE.to_owned()]
        );
    }

    #[tokio::test]
    async fn test_introduction_depends_on_role() {
        let h = harness();

        let owner = h.ok(private(OWNER, "/start")).await;
        assert!(owner.contains("Owner Commands"));
        assert!(owner.contains("/setcmd"));

        h.ok(private(OWNER, "/a 200")).await;
        let user = h.ok(private(USER, "/help")).await;
        assert!(user.contains("Authorized User"));
        assert!(!user.contains("Owner Commands"));

        let stranger = h.ok(private(999, "/start")).await;
        assert!(stranger.contains("Access Denied"));
        assert!(stranger.contains("<code>/a 999</code>"));

        assert!(h.run(group(OWNER, "/start")).await.is_none());
    }

    #[test]
    fn test_intro_preview_is_capped() {
        let mut config = BotConfig::with_owner(OWNER);
        config.spam_messages = (1..=7).map(|i| format!("m{i}")).collect();
        let text = introduction(&config, OWNER);
        assert!(text.contains("5. <code>m5</code>"));
        assert!(!text.contains("m6"));
        assert!(text.contains("and 2 more..."));
    }

    #[tokio::test]
    async fn test_broadcast_happy_path() {
        let h = harness();
        h.authorize_broadcast().await;

        assert!(h.run(group(USER, "/s @bob 3")).await.is_none());

        let sent = h.sender.sent();
        assert_eq!(sent.len(), 3);
        let mention = "<a href=\"tg://user?id=300\">Bob</a>";
        for (chat, text) in &sent {
            assert_eq!(*chat, GROUP);
            assert_eq!(text, &DEFAULT_TEMPLATE.replace("{mention}", mention));
        }
    }

    #[tokio::test]
    async fn test_owner_can_broadcast_with_new_trigger() {
        let h = harness();
        h.ok(private(OWNER, &format!("/addchat {GROUP}"))).await;
        h.ok(private(OWNER, "/setcmd go")).await;

        assert!(h.run(group(OWNER, "/s 300 2")).await.is_none());
        assert!(h.sender.sent().is_empty());

        h.run(group(OWNER, "/go@spam_bot 300 2")).await;
        assert_eq!(h.sender.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_is_silent_when_not_allowed() {
        let h = harness();
        h.ok(private(OWNER, "/a 200")).await;

        // Chat not authorized yet.
        assert!(h.run(group(USER, "/s @bob 3")).await.is_none());
        h.ok(private(OWNER, &format!("/addchat {GROUP}"))).await;

        // Stranger, private chat, bad input, unknown target.
        for incoming in [
            group(999, "/s @bob 3"),
            private(USER, "/s @bob 3"),
            group(USER, "/s @bob"),
            group(USER, "/s @bob 0"),
            group(USER, "/s @bob 101"),
            group(USER, "/s @bob many"),
            group(USER, "/s @ghost 3"),
            group(USER, "/s 12345 3"),
        ] {
            assert!(h.run(incoming).await.is_none());
        }
        assert!(h.sender.sent().is_empty());

        h.ok(private(OWNER, "/r 200")).await;
        assert!(h.run(group(USER, "/s @bob 3")).await.is_none());
        assert!(h.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_requires_admin_status() {
        let h = harness_with(FakeDirectory {
            status: MemberStatus::Member,
            ..FakeDirectory::default()
        });
        h.authorize_broadcast().await;

        assert!(h.run(group(USER, "/s @bob 3")).await.is_none());
        assert!(h.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_report_counts() {
        let h = harness();
        h.authorize_broadcast().await;
        h.ok(private(OWNER, "/addmsg Second {mention}")).await;

        let config = h.store.snapshot().await;
        let report = h
            .handler
            .broadcast(&group(USER, ""), &config, &["@bob".to_owned(), "5".to_owned()])
            .await
            .unwrap();
        assert_eq!(report.planned, 5);
        assert_eq!(report.delivered, 5);
    }

    #[tokio::test]
    async fn test_last_template_is_kept() {
        let h = harness();
        h.authorize_broadcast().await;

        let message = h.err(private(OWNER, "/delmsg 1")).await;
        assert!(message.contains("last message"));
        assert_eq!(
            h.store.snapshot().await.spam_messages,
            vec![DEFAULT_TEMPLATE.to_owned()]
        );

        h.run(group(USER, "/s @bob 2")).await;
        assert_eq!(h.sender.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_template_list_from_file() {
        let seed = format!(
            r#"{{"owner_id": {OWNER}, "authorized_users": [{USER}], "authorized_chats": [{GROUP}], "spam_messages": []}}"#
        );
        let h = build(FakeDirectory::default(), Some(&seed), Pacer::disabled());

        assert!(h.err(private(OWNER, "/listmsg")).await.contains("No messages configured"));
        assert!(h.err(private(OWNER, "/delmsg")).await.contains("No messages configured"));
        assert!(h.err(private(OWNER, "/delmsg 1")).await.contains("No messages configured"));

        assert!(h.run(group(USER, "/s @bob 3")).await.is_none());
        let config = h.store.snapshot().await;
        let args = ["@bob".to_owned(), "3".to_owned()];
        assert!(h.handler.broadcast(&group(USER, ""), &config, &args).await.is_none());
        assert!(h.sender.sent().is_empty());

        assert!(h.err(private(OWNER, "/clrmsg")).await.contains("No messages to clear"));
        assert!(h.store.snapshot().await.spam_messages.is_empty());

        let message = h.ok(private(OWNER, "/addmsg Back {mention}")).await;
        assert!(message.contains("Total messages: <code>1</code>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admin_commands_served_while_broadcast_paces() {
        let pacer = Pacer::new(Duration::from_secs(1), Duration::from_secs(1));
        let h = Arc::new(build(FakeDirectory::default(), None, pacer));
        h.authorize_broadcast().await;

        let broadcast = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.run(group(USER, "/s @bob 5")).await })
        };

        // First message out, now waiting on the pacer.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.sender.sent().len(), 1);

        let start = tokio::time::Instant::now();
        let message = h.ok(private(OWNER, "/addmsg Fresh {mention}")).await;
        assert!(message.contains("Total messages: <code>2</code>"));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!broadcast.is_finished());
        assert_eq!(h.sender.sent().len(), 1);

        assert!(broadcast.await.unwrap().is_none());
        assert_eq!(h.sender.sent().len(), 5);
    }

    #[test]
    fn test_is_valid_command_name() {
        assert!(is_valid_command_name("spam_2"));
        assert!(!is_valid_command_name(""));
        assert!(!is_valid_command_name("with space"));
        assert!(!is_valid_command_name(&"x".repeat(33)));
    }
}
