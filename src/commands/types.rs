//! Command types and definitions.

use std::fmt;

use crate::telegram::ChatKind;

/// Command names that the trigger command may never take.
pub const RESERVED_COMMANDS: &[&str] = &[
    "start",
    "help",
    "a",
    "add",
    "r",
    "remove",
    "listauth",
    "addchat",
    "removechat",
    "listchats",
    "setcmd",
    "addmsg",
    "delmsg",
    "listmsg",
    "clrmsg",
];

/// A text message as seen by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    /// Sender, if the platform exposes one (channel posts have none).
    pub actor_id: Option<i64>,
    pub chat_id: i64,
    pub chat: ChatKind,
    pub text: String,
}

/// Available bot commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Role-dependent introduction (`/start`, `/help`).
    Start,

    /// Grant broadcast privilege to a user.
    AuthorizeUser(Option<String>),

    /// Revoke a user's broadcast privilege.
    RevokeUser(Option<String>),

    /// List the owner and authorized users.
    ListUsers,

    /// Permit broadcasting in a chat.
    AuthorizeChat(Option<String>),

    /// Forbid broadcasting in a chat.
    RevokeChat(Option<String>),

    /// List authorized chats.
    ListChats,

    /// Change the trigger command.
    SetTrigger(Option<String>),

    /// Add a message template (raw text after the command).
    AddTemplate(Option<String>),

    /// Delete a template by 1-based index.
    DeleteTemplate(Option<String>),

    /// List all templates.
    ListTemplates,

    /// Reset templates to the default one.
    ClearTemplates,

    /// The configurable trigger command with its arguments.
    Broadcast(Vec<String>),
}

impl BotCommand {
    /// Parses a command from a message text.
    ///
    /// `trigger` is the current trigger command (with or without the leading
    /// `/`). A `/cmd@name` form is accepted only when `name` is this bot.
    /// Returns `None` if the message is not a known command.
    #[must_use]
    pub fn parse(text: &str, trigger: &str, bot_username: Option<&str>) -> Option<Self> {
        let text = text.trim_start();
        let body = text.strip_prefix('/')?;

        let (head, rest) = match body.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (body, ""),
        };

        let name = match head.split_once('@') {
            Some((name, addressee)) => {
                if let Some(me) = bot_username
                    && !addressee.eq_ignore_ascii_case(me.trim_start_matches('@'))
                {
                    return None;
                }
                name
            }
            None => head,
        };
        if name.is_empty() {
            return None;
        }

        let name = name.to_lowercase();
        let arg = rest.split_whitespace().next().map(str::to_owned);

        let command = match name.as_str() {
            "start" | "help" => Self::Start,
            "a" | "add" => Self::AuthorizeUser(arg),
            "r" | "remove" => Self::RevokeUser(arg),
            "listauth" => Self::ListUsers,
            "addchat" => Self::AuthorizeChat(arg),
            "removechat" => Self::RevokeChat(arg),
            "listchats" => Self::ListChats,
            "setcmd" => Self::SetTrigger(arg),
            "addmsg" => Self::AddTemplate((!rest.is_empty()).then(|| rest.to_owned())),
            "delmsg" => Self::DeleteTemplate(arg),
            "listmsg" => Self::ListTemplates,
            "clrmsg" => Self::ClearTemplates,
            other => {
                let trigger = trigger.trim().trim_start_matches('/');
                if trigger.is_empty() || !other.eq_ignore_ascii_case(trigger) {
                    return None;
                }
                Self::Broadcast(rest.split_whitespace().map(str::to_owned).collect())
            }
        };

        Some(command)
    }

    /// Whether `name` (with or without `/`) collides with a built-in command.
    #[must_use]
    pub fn is_reserved(name: &str) -> bool {
        let name = name.trim().trim_start_matches('/');
        RESERVED_COMMANDS
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(name))
    }

    /// Administrative commands require the owner in a private chat.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        !matches!(self, Self::Start | Self::Broadcast(_))
    }

    /// Returns the command name as it appears in help.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::AuthorizeUser(_) => "a",
            Self::RevokeUser(_) => "r",
            Self::ListUsers => "listauth",
            Self::AuthorizeChat(_) => "addchat",
            Self::RevokeChat(_) => "removechat",
            Self::ListChats => "listchats",
            Self::SetTrigger(_) => "setcmd",
            Self::AddTemplate(_) => "addmsg",
            Self::DeleteTemplate(_) => "delmsg",
            Self::ListTemplates => "listmsg",
            Self::ClearTemplates => "clrmsg",
            Self::Broadcast(_) => "broadcast",
        }
    }

    /// Owner commands with their usage and description, for help.
    #[must_use]
    pub fn owner_commands() -> Vec<(&'static str, &'static str)> {
        vec![
            ("/a &lt;user_id/username&gt;", "Authorize user"),
            ("/r &lt;user_id/username&gt;", "Remove user"),
            ("/listauth", "List authorized users"),
            ("/addchat &lt;chat_id/username&gt;", "Authorize chat (group/channel)"),
            ("/removechat &lt;chat_id/username&gt;", "Remove authorized chat"),
            ("/listchats", "List authorized chats"),
            ("/setcmd &lt;new_command&gt;", "Set broadcast command"),
            ("/addmsg &lt;message&gt;", "Add message template"),
            ("/delmsg &lt;index&gt;", "Delete message template"),
            ("/listmsg", "List all message templates"),
            ("/clrmsg", "Clear all message templates"),
        ]
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthorizeUser(Some(arg))
            | Self::RevokeUser(Some(arg))
            | Self::AuthorizeChat(Some(arg))
            | Self::RevokeChat(Some(arg))
            | Self::SetTrigger(Some(arg))
            | Self::DeleteTemplate(Some(arg)) => write!(f, "/{} {arg}", self.name()),
            Self::AddTemplate(Some(text)) => write!(f, "/addmsg ({} chars)", text.chars().count()),
            Self::Broadcast(args) => write!(f, "broadcast {}", args.join(" ")),
            _ => write!(f, "/{}", self.name()),
        }
    }
}

/// Result of command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Whether the command was successful.
    pub success: bool,

    /// HTML response to show the user.
    pub message: String,
}

impl CommandResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Creates an error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
