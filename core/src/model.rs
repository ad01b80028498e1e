/// Shared domain types for the chat core
///
/// Everything the server sends passes through the wire types here exactly
/// once, so field aliasing (`message`/`content`/`text`) and the
/// bare-vs-embedded sender shape are unwrapped in a single place.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix tagging client-generated ids for messages not yet acknowledged
const PROVISIONAL_PREFIX: &str = "pending-";

/// Message identity: server-assigned, or a client-generated placeholder
/// for an optimistic send awaiting acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageId {
    Server(String),
    Provisional(String),
}

impl MessageId {
    /// Mint a fresh provisional identity
    pub fn provisional() -> Self {
        MessageId::Provisional(format!("{}{}", PROVISIONAL_PREFIX, Uuid::new_v4()))
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, MessageId::Provisional(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageId::Server(s) | MessageId::Provisional(s) => s,
        }
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        if s.starts_with(PROVISIONAL_PREFIX) {
            MessageId::Provisional(s)
        } else {
            MessageId::Server(s)
        }
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        match id {
            MessageId::Server(s) | MessageId::Provisional(s) => s,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sender identity as it appears on the wire: either a bare id string or an
/// embedded object with `_id`. `id()` is the canonical extraction used
/// everywhere; no call site unwraps the shape itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SenderRef {
    Embedded {
        #[serde(rename = "_id")]
        id: String,
        #[serde(default)]
        name: Option<String>,
    },
    Bare(String),
}

impl SenderRef {
    pub fn id(&self) -> &str {
        match self {
            SenderRef::Embedded { id, .. } => id,
            SenderRef::Bare(id) => id,
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        match self {
            SenderRef::Embedded { name, .. } => name.as_deref(),
            SenderRef::Bare(_) => None,
        }
    }
}

/// A message as the server labels it. The body field arrives under any of
/// several names depending on the endpoint; `content` is the canonical one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(alias = "_id")]
    pub id: MessageId,

    #[serde(default, alias = "roomId", alias = "conversation")]
    pub conversation_id: Option<String>,

    #[serde(alias = "sender", alias = "from")]
    pub sender_id: SenderRef,

    #[serde(alias = "message", alias = "text", alias = "body")]
    pub content: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub is_read: bool,

    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub is_deleted: bool,

    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Canonical in-memory message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,

    /// True while awaiting server acknowledgment; never persisted
    #[serde(skip)]
    pub pending: bool,
}

impl Message {
    /// Normalize a wire message into the canonical shape. The event's
    /// conversation id wins over whatever the embedded message carries.
    pub fn from_wire(conversation_id: &str, wire: WireMessage) -> Self {
        Self {
            id: wire.id,
            conversation_id: wire
                .conversation_id
                .unwrap_or_else(|| conversation_id.to_string()),
            sender_id: wire.sender_id.id().to_string(),
            content: wire.content,
            created_at: wire.created_at,
            is_read: wire.is_read,
            read_at: wire.read_at,
            is_deleted: wire.is_deleted,
            deleted_at: wire.deleted_at,
            pending: false,
        }
    }

    /// Build the optimistic local copy appended before the server confirms
    pub fn provisional(conversation_id: &str, sender_id: &str, content: &str) -> Self {
        Self {
            id: MessageId::provisional(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
            is_read: false,
            read_at: None,
            is_deleted: false,
            deleted_at: None,
            pending: true,
        }
    }

    /// Content for display; withheld once the message is tombstoned
    pub fn display_content(&self) -> Option<&str> {
        if self.is_deleted {
            None
        } else {
            Some(&self.content)
        }
    }

    /// Flag as deleted in place. The record stays at its position in the
    /// sequence; `is_deleted` never reverts.
    pub fn tombstone(&mut self, deleted_at: Option<DateTime<Utc>>) {
        self.is_deleted = true;
        if self.deleted_at.is_none() {
            self.deleted_at = deleted_at.or_else(|| Some(Utc::now()));
        }
    }
}

/// One conversation thread as listed for the current user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Stable identity; the server addresses the same entity by
    /// conversation id or room id interchangeably
    #[serde(alias = "_id", alias = "roomId")]
    pub id: String,

    /// Display identity of the remote party
    #[serde(default, alias = "otherParticipant")]
    pub participant_name: String,

    /// Denormalized preview of the last message
    #[serde(default)]
    pub last_message: String,

    #[serde(default = "Utc::now")]
    pub last_message_at: DateTime<Utc>,

    #[serde(default)]
    pub unread_count: u32,
}

/// Ephemeral typing indicator for the active conversation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingState {
    pub is_typing: bool,
    pub typing_user_name: Option<String>,
}
