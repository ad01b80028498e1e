/// LifeLink Chat Core
///
/// Client-side real-time chat layer for the LifeLink blood-donation
/// platform: connection lifecycle, conversation registry, optimistic
/// message streaming, typing indicators, read receipts and notifications.

pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod model;
pub mod notify;
pub mod presence;
pub mod registry;
pub mod session;
pub mod stream;
pub mod typing;
pub mod wire;

pub use api::{ChatApi, HttpChatApi};
pub use config::Config;
pub use connection::{ConnectionManager, EventSink};
pub use error::{ChatError, Result};
pub use events::{ChannelEvent, ClientEvent, ServerEvent};
pub use model::{Conversation, Message, MessageId, TypingState};
pub use session::ChatSession;
