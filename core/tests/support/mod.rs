//! Shared test doubles: a recording event sink and an in-memory API
// Each test binary uses a different subset of these helpers
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use lifelink_chat::api::ChatApi;
use lifelink_chat::connection::EventSink;
use lifelink_chat::error::{ChatError, Result};
use lifelink_chat::events::ClientEvent;
use lifelink_chat::model::{Conversation, MessageId, SenderRef, WireMessage};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Records emitted events; honors the drop-while-disconnected contract
#[derive(Default)]
pub struct FakeSink {
    pub connected: AtomicBool,
    pub events: Mutex<Vec<ClientEvent>>,
}

impl FakeSink {
    pub fn online() -> Arc<Self> {
        let sink = Self::default();
        sink.connected.store(true, Ordering::SeqCst);
        Arc::new(sink)
    }

    pub fn offline() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emitted(&self) -> Vec<ClientEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count<F: Fn(&ClientEvent) -> bool>(&self, pred: F) -> usize {
        self.emitted().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for FakeSink {
    fn emit(&self, event: ClientEvent) {
        if !self.connected.load(Ordering::SeqCst) {
            return;
        }
        self.events.lock().unwrap().push(event);
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// In-memory API with scriptable failure modes
#[derive(Default)]
pub struct FakeApi {
    pub conversations: Mutex<Vec<Conversation>>,
    pub history: Mutex<Vec<WireMessage>>,
    pub fail_send: AtomicBool,
    pub fail_list: AtomicBool,
    pub list_calls: AtomicU32,
    pub sends: Mutex<Vec<String>>,
    pub mark_reads: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_conversations(conversations: Vec<Conversation>) -> Arc<Self> {
        let api = Self::default();
        *api.conversations.lock().unwrap() = conversations;
        Arc::new(api)
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(ChatError::Api("list unavailable".to_string()));
        }
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn fetch_history(&self, _conversation_id: &str, _limit: usize)
        -> Result<Vec<WireMessage>> {
        Ok(self.history.lock().unwrap().clone())
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        _receiver_id: &str,
        content: &str,
    ) -> Result<WireMessage> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ChatError::Api("send rejected".to_string()));
        }
        let mut sends = self.sends.lock().unwrap();
        sends.push(content.to_string());
        Ok(wire_message(
            &format!("srv-{}", sends.len()),
            conversation_id,
            "me",
            content,
        ))
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<()> {
        self.mark_reads
            .lock()
            .unwrap()
            .push(conversation_id.to_string());
        Ok(())
    }
}

pub fn wire_message(id: &str, conversation_id: &str, sender: &str, content: &str) -> WireMessage {
    WireMessage {
        id: MessageId::from(id.to_string()),
        conversation_id: Some(conversation_id.to_string()),
        sender_id: SenderRef::Bare(sender.to_string()),
        content: content.to_string(),
        created_at: Utc::now(),
        is_read: false,
        read_at: None,
        is_deleted: false,
        deleted_at: None,
    }
}

pub fn conversation(id: &str, participant: &str, unread: u32) -> Conversation {
    Conversation {
        id: id.to_string(),
        participant_name: participant.to_string(),
        last_message: String::new(),
        last_message_at: Utc::now(),
        unread_count: unread,
    }
}
