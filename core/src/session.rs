/// Session wiring
///
/// Owns one connection, one of each component, and the pump task that
/// routes channel events to them. UI state is a projection of the
/// components reachable from here.
use crate::api::ChatApi;
use crate::config::Config;
use crate::connection::{ConnectionManager, EventSink};
use crate::error::Result;
use crate::events::{ChannelEvent, ServerEvent};
use crate::model::{Conversation, Message, TypingState};
use crate::notify::NotificationRelay;
use crate::presence::{ConnectionStatus, PresenceTracker};
use crate::registry::ConversationRegistry;
use crate::stream::{ActiveConversation, MessageStream};
use crate::typing::TypingCoordinator;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct ChatSession {
    connection: Arc<ConnectionManager>,
    registry: Arc<ConversationRegistry>,
    stream: Arc<MessageStream>,
    typing: Arc<TypingCoordinator>,
    presence: Arc<PresenceTracker>,
    relay: Arc<NotificationRelay>,
    pump: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ChatSession {
    pub fn new(config: Config, api: Arc<dyn ChatApi>, current_user: &str) -> Self {
        let connection = Arc::new(ConnectionManager::new(config.clone()));
        let sink: Arc<dyn EventSink> = connection.clone();
        let active = ActiveConversation::default();

        let registry = Arc::new(ConversationRegistry::new(
            api.clone(),
            current_user,
            active.clone(),
        ));
        let stream = Arc::new(MessageStream::new(
            sink.clone(),
            api,
            current_user,
            config.history_limit,
            active.clone(),
        ));
        let typing = Arc::new(TypingCoordinator::new(
            sink,
            current_user,
            config.typing_timeout,
            active,
        ));

        Self {
            connection,
            registry,
            stream,
            typing,
            presence: Arc::new(PresenceTracker::new()),
            relay: Arc::new(NotificationRelay::new()),
            pump: std::sync::Mutex::new(None),
        }
    }

    /// Connect the event channel and start routing events. Idempotent for
    /// the lifetime of the session.
    pub fn start(&self, token: &str) {
        self.connection.connect(token);

        let mut guard = self.pump.lock().unwrap_or_else(|e| e.into_inner());
        if guard.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return;
        }

        let mut events = self.connection.subscribe();
        let registry = self.registry.clone();
        let stream = self.stream.clone();
        let typing = self.typing.clone();
        let presence = self.presence.clone();
        let relay = self.relay.clone();

        *guard = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ChannelEvent::Up) => presence.set_connected(true),
                    Ok(ChannelEvent::Down) => presence.set_connected(false),
                    Ok(ChannelEvent::Degraded) => relay.notify_degraded(),
                    Ok(ChannelEvent::Restored) => relay.notify_restored(),
                    Ok(ChannelEvent::Server(event)) => {
                        Self::dispatch(event, &registry, &stream, &typing, &relay).await;
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("Event pump lagged {} events", n);
                    }
                    Err(RecvError::Closed) => {
                        debug!("Event channel closed, pump stopping");
                        break;
                    }
                }
            }
        }));
    }

    async fn dispatch(
        event: ServerEvent,
        registry: &ConversationRegistry,
        stream: &MessageStream,
        typing: &TypingCoordinator,
        relay: &NotificationRelay,
    ) {
        match event {
            ServerEvent::NewMessage {
                conversation_id,
                message,
            } => {
                // Normalized exactly once; both consumers see the
                // canonical shape
                let message = Message::from_wire(&conversation_id, message);
                if let Err(e) = registry.apply_incoming_message(&message).await {
                    warn!("Conversation list update failed: {}", e);
                }
                stream.apply_new_message(message).await;
            }
            ServerEvent::MessageDeleted {
                conversation_id,
                message_id,
                deleted_at,
            } => {
                stream
                    .apply_deleted(&conversation_id, &message_id, deleted_at)
                    .await;
            }
            ServerEvent::TypingStart {
                conversation_id,
                user_id,
                user_name,
            } => typing.apply_start(&conversation_id, &user_id, user_name.as_deref()),
            ServerEvent::TypingStop {
                conversation_id,
                user_id,
            } => typing.apply_stop(&conversation_id, &user_id),
            ServerEvent::MessagesRead {
                conversation_id,
                read_at,
            } => stream.apply_read(&conversation_id, read_at).await,
            ServerEvent::Notification {
                message,
                sender_name,
            } => {
                let conversation_open = message
                    .as_ref()
                    .and_then(|m| m.conversation_id.as_deref())
                    .map(|id| stream.active().is(id))
                    .unwrap_or(false);
                if !conversation_open {
                    let name = sender_name.as_deref().or_else(|| {
                        message.as_ref().and_then(|m| m.sender_id.display_name())
                    });
                    relay.notify_message(name);
                }
                if let Err(e) = registry.apply_notification().await {
                    warn!("Conversation refresh after notification failed: {}", e);
                }
            }
            ServerEvent::Error { message } => relay.notify_error(&message),
            // Answered inside the connection manager; never reaches here
            ServerEvent::Ping { .. } => {}
        }
    }

    /// Load the conversation list
    pub async fn fetch_conversations(&self) -> Result<()> {
        self.registry.fetch_all().await
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.registry.conversations().await
    }

    /// Open a conversation: settle typing state for the old room, swap the
    /// active selection, load history, reset its unread counter
    pub async fn select_conversation(&self, conversation_id: &str) -> Result<()> {
        self.typing.reset();
        let loaded = self.stream.select(conversation_id).await;
        self.registry.mark_opened(conversation_id).await;
        loaded
    }

    pub async fn deselect_conversation(&self) {
        self.typing.reset();
        self.stream.deselect().await;
    }

    /// Send in the active conversation. Typing settles first so the other
    /// party never sees a stuck indicator.
    pub async fn send_message(&self, receiver_id: &str, content: &str) -> Result<()> {
        self.typing.stop_now();
        self.stream.send(receiver_id, content).await
    }

    pub async fn take_failed_draft(&self) -> Option<String> {
        self.stream.take_failed_draft().await
    }

    /// Request message deletion; `confirm` is the caller-supplied
    /// confirmation step
    pub async fn delete_message<F>(&self, message_id: &str, confirm: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        self.stream.delete(message_id, confirm).await
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.stream.messages().await
    }

    pub fn keystroke(&self) {
        self.typing.keystroke();
    }

    pub fn typing_state(&self) -> TypingState {
        self.typing.state()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.presence.status(self.connection.reconnect_attempts())
    }

    pub fn relay(&self) -> &NotificationRelay {
        &self.relay
    }

    /// End the session: leave any joined room, settle typing, stop the
    /// pump and drop the connection. Nothing leaks into the next session.
    pub async fn dispose(&self) {
        self.typing.stop_now();
        self.stream.deselect().await;
        if let Some(pump) = self
            .pump
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            pump.abort();
        }
        self.connection.dispose();
        info!("Chat session disposed");
    }
}
