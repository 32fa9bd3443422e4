//! Messaging rows and conversation keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

const DIRECT_PREFIX: char = '@';
const GROUP_PREFIX: char = '-';

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

/// Conversation key. Renders as `@<user id>` for direct chats and
/// `-<group id>` for groups, so both kinds share one map.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatSlug {
    kind: ConversationKind,
    id: String,
}

impl ChatSlug {
    #[must_use]
    pub fn new(kind: ConversationKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    #[must_use]
    pub fn direct(user_id: impl Into<String>) -> Self {
        Self::new(ConversationKind::Direct, user_id)
    }

    #[must_use]
    pub fn group(group_id: impl Into<String>) -> Self {
        Self::new(ConversationKind::Group, group_id)
    }

    /// Parse `@id` / `-id`. Anything else (or an empty id) is rejected.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut chars = raw.chars();
        let kind = match chars.next()? {
            DIRECT_PREFIX => ConversationKind::Direct,
            GROUP_PREFIX => ConversationKind::Group,
            _ => return None,
        };
        let id = chars.as_str();
        if id.is_empty() {
            return None;
        }
        Some(Self::new(kind, id))
    }

    #[must_use]
    pub fn kind(&self) -> ConversationKind {
        self.kind
    }

    /// Counterpart user id (direct) or group id (group).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn is_group(&self) -> bool {
        self.kind == ConversationKind::Group
    }
}

impl fmt::Display for ChatSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            ConversationKind::Direct => DIRECT_PREFIX,
            ConversationKind::Group => GROUP_PREFIX,
        };
        write!(f, "{prefix}{}", self.id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Attachment,
    Voice,
}

/// Voice attachment payload stored in a message's `data`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoicePayload {
    /// Storage path of the uploaded clip.
    pub path: String,
    /// Clip length in seconds.
    pub duration: f64,
    /// Size in bytes.
    pub size: u64,
}

/// Content of a message about to be sent.
#[derive(Clone, Debug, PartialEq)]
pub enum MessageContent {
    Text(String),
    Attachment(Value),
    Voice(VoicePayload),
}

impl MessageContent {
    #[must_use]
    pub fn into_parts(self) -> (MessageType, Value) {
        match self {
            Self::Text(text) => (MessageType::Text, Value::String(text)),
            Self::Attachment(data) => (MessageType::Attachment, data),
            Self::Voice(voice) => (
                MessageType::Voice,
                serde_json::to_value(voice).unwrap_or(Value::Null),
            ),
        }
    }
}

/// Sender display metadata joined onto group messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub id: String,
    pub name: String,
    pub avatar_url: String,
}

/// One direct or group message. Mirrors the `messages` and
/// `group_messages` tables (the latter via the `by_id`/`group_id` aliases).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    #[serde(alias = "by_id")]
    pub from_id: String,
    /// Recipient user id (direct) or group id (group).
    #[serde(alias = "group_id")]
    pub to_id: String,
    pub org_id: String,
    pub typ: MessageType,
    pub data: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub edited_at: Option<OffsetDateTime>,
    #[serde(default, alias = "users", skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderInfo>,
    /// Local-only: set while the write has not been echoed back.
    #[serde(skip)]
    pub optimistic: bool,
}

impl ChatMessage {
    /// Text body, if this is a text message.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self.typ {
            MessageType::Text => self.data.as_str(),
            _ => None,
        }
    }

    /// Conversation this message belongs to, seen from `me`.
    #[must_use]
    pub fn slug_for(&self, kind: ConversationKind, me: &str) -> ChatSlug {
        match kind {
            ConversationKind::Group => ChatSlug::group(&self.to_id),
            ConversationKind::Direct if self.from_id == me => ChatSlug::direct(&self.to_id),
            ConversationKind::Direct => ChatSlug::direct(&self.from_id),
        }
    }

    /// Overwrite server-owned fields with a confirmed copy, keeping local
    /// sender metadata when the confirmed row carries none.
    pub(crate) fn merge_confirmed(&mut self, confirmed: ChatMessage) {
        let sender = confirmed.sender.or_else(|| self.sender.take());
        *self = ChatMessage { sender, optimistic: false, ..confirmed };
    }
}

/// One row of the conversation overview (`get_chat_overview`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub is_group: bool,
    /// Counterpart user id or group id.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub unread_count: i64,
    #[serde(default)]
    pub typ: Option<MessageType>,
    #[serde(default)]
    pub data: Value,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub msg_created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub msg_edited_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub msg_read_at: Option<OffsetDateTime>,
}

impl ConversationSummary {
    #[must_use]
    pub fn slug(&self) -> ChatSlug {
        if self.is_group {
            ChatSlug::group(&self.id)
        } else {
            ChatSlug::direct(&self.id)
        }
    }

    /// Replace the last-message preview with `message`.
    pub(crate) fn set_preview(&mut self, message: &ChatMessage) {
        self.typ = Some(message.typ);
        self.data = message.data.clone();
        self.msg_created_at = Some(message.created_at);
        self.msg_edited_at = message.edited_at;
    }
}

/// `chat_group_members` row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group_id: String,
    pub user_id: String,
}

/// `chat_groups` row (only the fields the caches care about).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub org_id: String,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
