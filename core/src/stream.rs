/// Active-conversation message sequence and outbound send logic
///
/// Owns the selection state machine (join/leave against the live room),
/// the optimistic send protocol, and the merge of live inserts, deletes
/// and read receipts into the locally held history.
use crate::api::ChatApi;
use crate::connection::EventSink;
use crate::error::{ChatError, Result};
use crate::events::ClientEvent;
use crate::model::Message;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::RwLock as StdRwLock;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Shared handle to the single active-conversation selection. Only the
/// stream controller writes it; the registry and typing coordinator read.
#[derive(Clone, Debug, Default)]
pub struct ActiveConversation(Arc<StdRwLock<Option<String>>>);

impl ActiveConversation {
    pub fn get(&self) -> Option<String> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is(&self, conversation_id: &str) -> bool {
        self.get().as_deref() == Some(conversation_id)
    }

    pub(crate) fn set(&self, conversation_id: Option<String>) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = conversation_id;
    }
}

/// Selection lifecycle of the stream controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// No conversation selected
    Idle,
    /// Room joined, history fetch in flight
    Joining,
    /// History loaded, live merging active
    Loaded,
}

struct StreamState {
    phase: StreamPhase,
    messages: Vec<Message>,
    sending: bool,
    failed_draft: Option<String>,
}

pub struct MessageStream {
    sink: Arc<dyn EventSink>,
    api: Arc<dyn ChatApi>,
    current_user: String,
    history_limit: usize,
    active: ActiveConversation,
    state: RwLock<StreamState>,
}

impl MessageStream {
    pub fn new(
        sink: Arc<dyn EventSink>,
        api: Arc<dyn ChatApi>,
        current_user: &str,
        history_limit: usize,
        active: ActiveConversation,
    ) -> Self {
        Self {
            sink,
            api,
            current_user: current_user.to_string(),
            history_limit,
            active,
            state: RwLock::new(StreamState {
                phase: StreamPhase::Idle,
                messages: Vec::new(),
                sending: false,
                failed_draft: None,
            }),
        }
    }

    /// Make a conversation active: leave the previous room, join the new
    /// one, then load history. Every join gets exactly one matching leave,
    /// including across rapid switches.
    pub async fn select(&self, conversation_id: &str) -> Result<()> {
        if self.active.is(conversation_id) {
            debug!("Conversation {} already active", conversation_id);
            return Ok(());
        }

        self.leave_current().await;

        self.active.set(Some(conversation_id.to_string()));
        self.sink.emit(ClientEvent::JoinConversation {
            conversation_id: conversation_id.to_string(),
        });

        {
            let mut state = self.state.write().await;
            state.phase = StreamPhase::Joining;
            state.messages.clear();
            state.sending = false;
            state.failed_draft = None;
        }

        let history = self
            .api
            .fetch_history(conversation_id, self.history_limit)
            .await;

        let mut state = self.state.write().await;
        // A rapid switch may have moved selection on while the fetch was
        // in flight; stale history must not clobber the new conversation
        if !self.active.is(conversation_id) {
            debug!("Discarding stale history for {}", conversation_id);
            return Ok(());
        }
        match history {
            Ok(wire) => {
                state.messages = wire
                    .into_iter()
                    .map(|w| Message::from_wire(conversation_id, w))
                    .collect();
                state.phase = StreamPhase::Loaded;
                Ok(())
            }
            Err(e) => {
                // Recoverable: the room stays joined with an empty view
                warn!("History fetch failed for {}: {}", conversation_id, e);
                state.phase = StreamPhase::Loaded;
                Err(e)
            }
        }
    }

    /// Drop the active conversation and leave its room
    pub async fn deselect(&self) {
        self.leave_current().await;
        let mut state = self.state.write().await;
        state.phase = StreamPhase::Idle;
        state.messages.clear();
        state.sending = false;
    }

    async fn leave_current(&self) {
        if let Some(prev) = self.active.get() {
            self.sink.emit(ClientEvent::LeaveConversation {
                conversation_id: prev,
            });
            self.active.set(None);
        }
    }

    /// Optimistic send. The provisional copy lands in the sequence
    /// immediately; the live path reconciles it via the inbound
    /// new-message event, the REST fallback replaces it in place.
    pub async fn send(&self, receiver_id: &str, content: &str) -> Result<()> {
        let text = content.trim();
        if text.is_empty() {
            return Err(ChatError::SendRejected("empty message".to_string()));
        }

        let conversation_id = self
            .active
            .get()
            .ok_or_else(|| ChatError::SendRejected("no active conversation".to_string()))?;

        let provisional = Message::provisional(&conversation_id, &self.current_user, text);
        let provisional_id = provisional.id.clone();
        {
            let mut state = self.state.write().await;
            if state.sending {
                return Err(ChatError::SendRejected("send already in flight".to_string()));
            }
            state.sending = true;
            state.messages.push(provisional);
        }

        if self.sink.connected() {
            // Fire-and-forget; the authoritative record arrives as an
            // inbound event and supersedes the provisional copy
            self.sink.emit(ClientEvent::SendMessage {
                conversation_id: conversation_id.clone(),
                receiver_id: receiver_id.to_string(),
                content: text.to_string(),
            });
            self.state.write().await.sending = false;
            return Ok(());
        }

        // REST fallback while the channel is down
        match self
            .api
            .send_message(&conversation_id, receiver_id, text)
            .await
        {
            Ok(wire) => {
                let authoritative = Message::from_wire(&conversation_id, wire);
                let mut state = self.state.write().await;
                state.sending = false;
                match state.messages.iter().position(|m| m.id == provisional_id) {
                    Some(pos) => state.messages[pos] = authoritative,
                    None => state.messages.push(authoritative),
                }
                Ok(())
            }
            Err(e) => {
                // Roll back and keep the draft for resubmission
                let mut state = self.state.write().await;
                state.sending = false;
                state.messages.retain(|m| m.id != provisional_id);
                state.failed_draft = Some(text.to_string());
                warn!("Send failed, provisional rolled back: {}", e);
                Err(ChatError::SendRejected(e.to_string()))
            }
        }
    }

    /// The draft of the last failed send, for repopulating the compose field
    pub async fn take_failed_draft(&self) -> Option<String> {
        self.state.write().await.failed_draft.take()
    }

    /// Merge an authoritative inbound message. Idempotent under duplicate
    /// delivery; supersedes a matching still-pending provisional copy.
    pub async fn apply_new_message(&self, message: Message) {
        let conversation_id = message.conversation_id.clone();
        if !self.active.is(&conversation_id) {
            return;
        }

        let from_other = message.sender_id != self.current_user;

        {
            let mut state = self.state.write().await;

            if let Some(pos) = state.messages.iter().position(|m| {
                m.pending && m.sender_id == message.sender_id && m.content == message.content
            }) {
                state.messages.remove(pos);
            }

            if state.messages.iter().any(|m| m.id == message.id) {
                debug!("Duplicate delivery of {}, ignored", message.id);
                return;
            }

            state.messages.push(message);
        }

        // Read receipts go out eagerly while the conversation is open;
        // with the channel down they take the REST path instead
        if from_other {
            if self.sink.connected() {
                self.sink.emit(ClientEvent::MarkRead { conversation_id });
            } else if let Err(e) = self.api.mark_read(&conversation_id).await {
                warn!("Mark-read fallback failed for {}: {}", conversation_id, e);
            }
        }
    }

    /// Tombstone a message in place. Unknown ids are ignored so a late
    /// insert is never born deleted; repeated deletes are no-ops.
    pub async fn apply_deleted(
        &self,
        conversation_id: &str,
        message_id: &str,
        deleted_at: Option<DateTime<Utc>>,
    ) {
        if !self.active.is(conversation_id) {
            return;
        }
        let mut state = self.state.write().await;
        match state
            .messages
            .iter_mut()
            .find(|m| m.id.as_str() == message_id)
        {
            Some(message) => message.tombstone(deleted_at),
            None => debug!("Delete for unknown message {}, ignored", message_id),
        }
    }

    /// The other party read the conversation: flip read state on messages
    /// the current user authored, nothing else.
    pub async fn apply_read(&self, conversation_id: &str, read_at: Option<DateTime<Utc>>) {
        if !self.active.is(conversation_id) {
            return;
        }
        let stamp = read_at.unwrap_or_else(Utc::now);
        let mut state = self.state.write().await;
        for message in state
            .messages
            .iter_mut()
            .filter(|m| m.sender_id == self.current_user && !m.is_read)
        {
            message.is_read = true;
            message.read_at = Some(stamp);
        }
    }

    /// Request deletion of a message. The caller supplies the confirmation
    /// step; nothing is tombstoned locally until the server confirms.
    pub async fn delete<F>(&self, message_id: &str, confirm: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let conversation_id = match self.active.get() {
            Some(id) => id,
            None => return false,
        };
        if !confirm() {
            return false;
        }
        self.sink.emit(ClientEvent::DeleteMessage {
            message_id: message_id.to_string(),
            conversation_id,
        });
        true
    }

    /// Snapshot of the active conversation's sequence
    pub async fn messages(&self) -> Vec<Message> {
        self.state.read().await.messages.clone()
    }

    pub async fn phase(&self) -> StreamPhase {
        self.state.read().await.phase
    }

    pub fn active(&self) -> &ActiveConversation {
        &self.active
    }
}
