/// Conversation list bookkeeping
///
/// Single source of truth for the ordered conversation list. Fresh data
/// comes from REST fetches and from live new-message events; the list is
/// never locally extended without server confirmation.
use crate::api::ChatApi;
use crate::error::Result;
use crate::model::{Conversation, Message};
use crate::stream::ActiveConversation;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub struct ConversationRegistry {
    api: Arc<dyn ChatApi>,
    current_user: String,
    active: ActiveConversation,
    conversations: RwLock<Vec<Conversation>>,
}

impl ConversationRegistry {
    pub fn new(api: Arc<dyn ChatApi>, current_user: &str, active: ActiveConversation) -> Self {
        Self {
            api,
            current_user: current_user.to_string(),
            active,
            conversations: RwLock::new(Vec::new()),
        }
    }

    /// Replace the list from the server. On failure the previous list stays
    /// visible and the error goes back to the caller.
    pub async fn fetch_all(&self) -> Result<()> {
        let fresh = self.api.list_conversations().await?;
        let mut guard = self.conversations.write().await;
        *guard = fresh;
        Self::sort(&mut guard);
        Ok(())
    }

    /// Snapshot of the list, newest activity first
    pub async fn conversations(&self) -> Vec<Conversation> {
        self.conversations.read().await.clone()
    }

    /// Fold a live new-message event into the list. Unknown conversations
    /// trigger a full refetch rather than a fabricated local entry.
    pub async fn apply_incoming_message(&self, message: &Message) -> Result<()> {
        let conversation_id = message.conversation_id.as_str();
        let known = {
            let mut guard = self.conversations.write().await;
            match guard.iter_mut().find(|c| c.id == conversation_id) {
                Some(conv) => {
                    conv.last_message = message.content.clone();
                    conv.last_message_at = message.created_at;
                    // Only messages from the other party, landing in a
                    // conversation we are not looking at, count as unread
                    if message.sender_id != self.current_user
                        && !self.active.is(conversation_id)
                    {
                        conv.unread_count += 1;
                    }
                    Self::sort(&mut guard);
                    true
                }
                None => false,
            }
        };

        if !known {
            debug!(
                "Message for unknown conversation {}, refetching list",
                conversation_id
            );
            if let Err(e) = self.fetch_all().await {
                warn!("Conversation refetch failed: {}", e);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Lightweight cross-conversation signal; carries no usable payload,
    /// so refresh the whole list
    pub async fn apply_notification(&self) -> Result<()> {
        self.fetch_all().await
    }

    /// Reset the per-conversation unread counter when the user opens it,
    /// and push the read state to the server so the next refetch does not
    /// resurrect it
    pub async fn mark_opened(&self, conversation_id: &str) {
        let had_unread = {
            let mut guard = self.conversations.write().await;
            match guard.iter_mut().find(|c| c.id == conversation_id) {
                Some(conv) => {
                    let had = conv.unread_count > 0;
                    conv.unread_count = 0;
                    had
                }
                None => false,
            }
        };

        if had_unread {
            if let Err(e) = self.api.mark_read(conversation_id).await {
                warn!("Mark-read sync failed for {}: {}", conversation_id, e);
            }
        }
    }

    fn sort(list: &mut [Conversation]) {
        list.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    }
}
