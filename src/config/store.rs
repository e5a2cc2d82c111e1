//! Persisted bot configuration and its serialized store.
//!
//! The whole document lives in one JSON file. Every mutation is applied to a
//! copy, written out in full, and only then committed to memory, so a failed
//! write leaves both the file and the in-memory record untouched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{DEFAULT_TEMPLATE, DEFAULT_TRIGGER, MENTION_PLACEHOLDER, TRIGGER_MARKER};

/// Errors raised while reading or persisting the configuration document.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// The persisted configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BotConfig {
    /// Users granted broadcast privilege (insertion order kept for display).
    #[serde(default)]
    pub authorized_users: Vec<i64>,

    /// Chats in which broadcasting is permitted.
    #[serde(default)]
    pub authorized_chats: Vec<i64>,

    /// Trigger command, always stored with its leading `/`.
    #[serde(default = "default_trigger")]
    pub spam_command: String,

    /// Message templates, each may contain `{mention}`.
    #[serde(default = "default_templates")]
    pub spam_messages: Vec<String>,

    /// The owner. Zero means "not recorded yet".
    #[serde(default)]
    pub owner_id: i64,
}

fn default_trigger() -> String {
    DEFAULT_TRIGGER.to_owned()
}

fn default_templates() -> Vec<String> {
    vec![DEFAULT_TEMPLATE.to_owned()]
}

/// Canonical form of a trigger command: trimmed, exactly one leading `/`.
#[must_use]
pub fn normalize_trigger(raw: &str) -> String {
    let name = raw.trim().trim_start_matches(TRIGGER_MARKER);
    format!("{TRIGGER_MARKER}{name}")
}

/// How serious a configuration issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A problem found by [`BotConfig::audit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssue {
    NoTemplates,
    EmptyTemplate { index: usize },
    MissingPlaceholder { index: usize },
    DuplicateTemplate { index: usize },
    DuplicateUser(i64),
    DuplicateChat(i64),
    OwnerListedAsUser(i64),
    MissingOwner,
    TriggerNotCanonical(String),
    TriggerEmpty,
}

impl ConfigIssue {
    /// Returns how serious the issue is.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::MissingPlaceholder { .. } | Self::TriggerNotCanonical(_) | Self::MissingOwner => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoTemplates => write!(f, "no message templates configured"),
            Self::EmptyTemplate { index } => write!(f, "template #{index} is empty"),
            Self::MissingPlaceholder { index } => {
                write!(f, "template #{index} has no {MENTION_PLACEHOLDER} placeholder")
            }
            Self::DuplicateTemplate { index } => write!(f, "template #{index} is a duplicate"),
            Self::DuplicateUser(id) => write!(f, "user {id} is listed more than once"),
            Self::DuplicateChat(id) => write!(f, "chat {id} is listed more than once"),
            Self::OwnerListedAsUser(id) => {
                write!(f, "owner {id} must not appear in authorized_users")
            }
            Self::MissingOwner => write!(f, "owner_id is not recorded (OWNER_ID will be used)"),
            Self::TriggerNotCanonical(raw) => {
                write!(f, "trigger {raw:?} lacks the leading {TRIGGER_MARKER}")
            }
            Self::TriggerEmpty => write!(f, "trigger command is empty"),
        }
    }
}

impl BotConfig {
    /// Built-in default document for the given owner.
    #[must_use]
    pub fn with_owner(owner_id: i64) -> Self {
        Self {
            authorized_users: Vec::new(),
            authorized_chats: Vec::new(),
            spam_command: default_trigger(),
            spam_messages: default_templates(),
            owner_id,
        }
    }

    /// Loads the document from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Writes the whole document to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Trigger name without the leading marker (e.g. `s` for `/s`).
    #[must_use]
    pub fn trigger_name(&self) -> &str {
        self.spam_command.trim_start_matches(TRIGGER_MARKER)
    }

    /// Restores in-memory invariants after loading a hand-edited file.
    ///
    /// Returns `true` if anything had to change.
    fn sanitize(&mut self) -> bool {
        let before = self.clone();

        self.spam_command = normalize_trigger(&self.spam_command);
        dedup_in_order(&mut self.authorized_users);
        dedup_in_order(&mut self.authorized_chats);
        let owner = self.owner_id;
        self.authorized_users.retain(|&id| id != owner);

        *self != before
    }

    /// Reports every problem in the document without modifying it.
    #[must_use]
    pub fn audit(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.owner_id == 0 {
            issues.push(ConfigIssue::MissingOwner);
        }

        if self.trigger_name().trim().is_empty() {
            issues.push(ConfigIssue::TriggerEmpty);
        } else if !self.spam_command.starts_with(TRIGGER_MARKER) {
            issues.push(ConfigIssue::TriggerNotCanonical(self.spam_command.clone()));
        }

        let mut seen_users = HashSet::new();
        for &id in &self.authorized_users {
            if id == self.owner_id {
                issues.push(ConfigIssue::OwnerListedAsUser(id));
            }
            if !seen_users.insert(id) {
                issues.push(ConfigIssue::DuplicateUser(id));
            }
        }

        let mut seen_chats = HashSet::new();
        for &id in &self.authorized_chats {
            if !seen_chats.insert(id) {
                issues.push(ConfigIssue::DuplicateChat(id));
            }
        }

        if self.spam_messages.is_empty() {
            issues.push(ConfigIssue::NoTemplates);
        }

        let mut seen_templates = HashSet::new();
        for (i, template) in self.spam_messages.iter().enumerate() {
            let index = i + 1;
            if template.trim().is_empty() {
                issues.push(ConfigIssue::EmptyTemplate { index });
                continue;
            }
            if !seen_templates.insert(template.as_str()) {
                issues.push(ConfigIssue::DuplicateTemplate { index });
            }
            if !template.contains(MENTION_PLACEHOLDER) {
                issues.push(ConfigIssue::MissingPlaceholder { index });
            }
        }

        issues
    }

    /// Example document for `--generate-config`.
    #[must_use]
    pub fn example(owner_id: i64) -> Self {
        Self {
            spam_messages: vec![
                DEFAULT_TEMPLATE.to_owned(),
                "Hey {mention}, good to see you here!".to_owned(),
                "{mention} has joined the party 🎉".to_owned(),
            ],
            ..Self::with_owner(owner_id)
        }
    }
}

fn dedup_in_order(ids: &mut Vec<i64>) {
    let mut seen = HashSet::new();
    ids.retain(|id| seen.insert(*id));
}

/// Outcome of a validated mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// The document changed and was persisted.
    Applied,
    /// The value was already present; nothing written.
    AlreadyPresent,
    /// The value was not present; nothing written.
    Missing,
    /// The owner cannot be added to or removed from the user list.
    OwnerProtected,
    /// The template list was already empty; nothing written.
    NothingToClear,
}

/// Outcome of deleting a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateRemoval {
    /// The template was deleted; `remaining` templates are left.
    Removed { text: String, remaining: usize },
    /// The 1-based index is outside `1..=len`; nothing written.
    OutOfRange { len: usize },
    /// The list holds a single template, which cannot be deleted.
    LastTemplate,
}

/// Result of changing the trigger command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerChange {
    pub old: String,
    pub new: String,
}

/// Exclusive owner of the configuration record and its backing file.
///
/// All mutations go through one mutex, so at most one read-modify-write
/// is in flight at a time.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: Mutex<BotConfig>,
}

impl ConfigStore {
    /// Loads the store from `path`.
    ///
    /// A missing or malformed file yields the default document for
    /// `owner_id`; nothing is written until the first mutation.
    pub fn load(path: impl Into<PathBuf>, owner_id: i64) -> Self {
        let path = path.into();

        let mut config = match BotConfig::load_from_file(&path) {
            Ok(config) => {
                debug!("Loaded configuration from {}", path.display());
                config
            }
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No configuration at {}, using defaults", path.display());
                BotConfig::with_owner(owner_id)
            }
            Err(e) => {
                warn!("Ignoring unreadable configuration {}: {}", path.display(), e);
                BotConfig::with_owner(owner_id)
            }
        };

        if config.owner_id == 0 {
            config.owner_id = owner_id;
        } else if config.owner_id != owner_id {
            warn!(
                "Persisted owner {} differs from OWNER_ID {}, keeping the persisted one",
                config.owner_id, owner_id
            );
        }

        if config.sanitize() {
            warn!("Configuration normalized in memory; it will be rewritten on the next change");
        }

        Self {
            path,
            config: Mutex::new(config),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a copy of the current document.
    pub async fn snapshot(&self) -> BotConfig {
        self.config.lock().await.clone()
    }

    /// Returns the owner id.
    pub async fn owner_id(&self) -> i64 {
        self.config.lock().await.owner_id
    }

    /// Serializes the current document and overwrites the backing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self) -> Result<(), StoreError> {
        let config = self.config.lock().await;
        config.save_to_file(&self.path)
    }

    /// Applies `mutate` to a copy of the document; if it reports a change,
    /// persists the copy and commits it.
    async fn update<T>(
        &self,
        mutate: impl FnOnce(&mut BotConfig) -> (T, bool),
    ) -> Result<T, StoreError> {
        let mut current = self.config.lock().await;
        let mut draft = current.clone();

        let (outcome, changed) = mutate(&mut draft);
        if changed {
            draft.save_to_file(&self.path)?;
            *current = draft;
            debug!("Configuration saved to {}", self.path.display());
        }

        Ok(outcome)
    }

    /// Grants broadcast privilege to a user.
    pub async fn authorize_user(&self, user_id: i64) -> Result<Change, StoreError> {
        self.update(|config| {
            if user_id == config.owner_id {
                (Change::OwnerProtected, false)
            } else if config.authorized_users.contains(&user_id) {
                (Change::AlreadyPresent, false)
            } else {
                config.authorized_users.push(user_id);
                (Change::Applied, true)
            }
        })
        .await
    }

    /// Revokes broadcast privilege from a user.
    pub async fn revoke_user(&self, user_id: i64) -> Result<Change, StoreError> {
        self.update(|config| {
            if user_id == config.owner_id {
                (Change::OwnerProtected, false)
            } else if let Some(pos) = config.authorized_users.iter().position(|&id| id == user_id) {
                config.authorized_users.remove(pos);
                (Change::Applied, true)
            } else {
                (Change::Missing, false)
            }
        })
        .await
    }

    /// Permits broadcasting in a chat.
    pub async fn authorize_chat(&self, chat_id: i64) -> Result<Change, StoreError> {
        self.update(|config| {
            if config.authorized_chats.contains(&chat_id) {
                (Change::AlreadyPresent, false)
            } else {
                config.authorized_chats.push(chat_id);
                (Change::Applied, true)
            }
        })
        .await
    }

    /// Forbids broadcasting in a chat.
    pub async fn revoke_chat(&self, chat_id: i64) -> Result<Change, StoreError> {
        self.update(|config| {
            if let Some(pos) = config.authorized_chats.iter().position(|&id| id == chat_id) {
                config.authorized_chats.remove(pos);
                (Change::Applied, true)
            } else {
                (Change::Missing, false)
            }
        })
        .await
    }

    /// Stores a new trigger command in canonical form.
    pub async fn set_trigger_command(&self, raw: &str) -> Result<TriggerChange, StoreError> {
        let new = normalize_trigger(raw);
        self.update(|config| {
            let old = std::mem::replace(&mut config.spam_command, new.clone());
            let changed = old != new;
            (TriggerChange { old, new }, changed)
        })
        .await
    }

    /// Appends a template unless an identical one exists.
    ///
    /// Also returns the number of templates after the call.
    pub async fn add_spam_message(&self, text: &str) -> Result<(Change, usize), StoreError> {
        self.update(|config| {
            if config.spam_messages.iter().any(|m| m == text) {
                ((Change::AlreadyPresent, config.spam_messages.len()), false)
            } else {
                config.spam_messages.push(text.to_owned());
                ((Change::Applied, config.spam_messages.len()), true)
            }
        })
        .await
    }

    /// Removes the template at a 1-based `index`.
    ///
    /// The list never drops to zero through deletion; `/clrmsg` is the way
    /// back to the default template.
    pub async fn remove_spam_message(&self, index: usize) -> Result<TemplateRemoval, StoreError> {
        self.update(|config| {
            let len = config.spam_messages.len();
            if !(1..=len).contains(&index) {
                (TemplateRemoval::OutOfRange { len }, false)
            } else if len == 1 {
                (TemplateRemoval::LastTemplate, false)
            } else {
                let text = config.spam_messages.remove(index - 1);
                let remaining = config.spam_messages.len();
                (TemplateRemoval::Removed { text, remaining }, true)
            }
        })
        .await
    }

    /// Resets the template list to the single default template.
    pub async fn clear_spam_messages(&self) -> Result<Change, StoreError> {
        self.update(|config| {
            if config.spam_messages.is_empty() {
                (Change::NothingToClear, false)
            } else {
                config.spam_messages = default_templates();
                (Change::Applied, true)
            }
        })
        .await
    }
}
