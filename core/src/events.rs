/// Event types crossing the live channel
use crate::model::WireMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events from the server, tagged on the wire by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A new message was persisted (our own send confirmed, or the other
    /// party wrote)
    NewMessage {
        #[serde(alias = "roomId")]
        conversation_id: String,
        message: WireMessage,
    },

    /// A message was deleted server-side
    MessageDeleted {
        #[serde(alias = "roomId")]
        conversation_id: String,
        message_id: String,
        #[serde(default)]
        deleted_at: Option<DateTime<Utc>>,
    },

    /// The other party started typing
    TypingStart {
        conversation_id: String,
        user_id: String,
        #[serde(default)]
        user_name: Option<String>,
    },

    /// The other party stopped typing
    TypingStop {
        conversation_id: String,
        user_id: String,
    },

    /// The other party read the conversation; applies to messages we sent
    MessagesRead {
        conversation_id: String,
        #[serde(default)]
        read_at: Option<DateTime<Utc>>,
    },

    /// Cross-conversation alert, possibly for a conversation we do not
    /// hold locally yet
    Notification {
        #[serde(default)]
        message: Option<WireMessage>,
        #[serde(default)]
        sender_name: Option<String>,
    },

    /// Channel-level error surfaced as a transient alert
    Error { message: String },

    /// Keepalive probe; answered with `ClientEvent::Pong`
    Ping { timestamp: i64 },
}

impl ServerEvent {
    /// Event type as string, for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage { .. } => "new_message",
            ServerEvent::MessageDeleted { .. } => "message_deleted",
            ServerEvent::TypingStart { .. } => "typing_start",
            ServerEvent::TypingStop { .. } => "typing_stop",
            ServerEvent::MessagesRead { .. } => "messages_read",
            ServerEvent::Notification { .. } => "notification",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Ping { .. } => "ping",
        }
    }
}

/// Events emitted by the client, tagged on the wire by `type`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// First frame after connect; binds the channel to the session
    Auth { token: String },

    JoinConversation { conversation_id: String },

    LeaveConversation { conversation_id: String },

    SendMessage {
        conversation_id: String,
        receiver_id: String,
        content: String,
    },

    DeleteMessage {
        message_id: String,
        conversation_id: String,
    },

    MarkRead { conversation_id: String },

    TypingStart { conversation_id: String },

    TypingStop { conversation_id: String },

    Pong { timestamp: i64 },
}

/// What subscribers observe: server events plus connection lifecycle
/// notices on the same stream, so consumers project state from one source.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Connection established (also after a successful reconnect)
    Up,
    /// Connection lost; reconnect loop takes over
    Down,
    /// Repeated reconnect failures; emitted once per outage
    Degraded,
    /// Connectivity restored after a Degraded notice
    Restored,
    /// An event from the server
    Server(ServerEvent),
}
