/// REST collaborator API
///
/// Persistence and auth live behind these endpoints; the core only
/// consumes them. The trait keeps components testable against a fake.
///
/// Endpoints:
///   GET  /conversations
///   GET  /conversations/:id/messages   ?limit=N
///   POST /messages                     body: {"conversationId","receiverId","content"}
///   POST /conversations/:id/read
use crate::error::{ChatError, Result};
use crate::model::{Conversation, WireMessage};
use async_trait::async_trait;
use serde::Deserialize;

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// List the current user's conversations, newest first
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    /// Fetch message history, assumed chronologically ordered
    async fn fetch_history(&self, conversation_id: &str, limit: usize)
        -> Result<Vec<WireMessage>>;

    /// Persist a message; returns the authoritative created record
    async fn send_message(
        &self,
        conversation_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> Result<WireMessage>;

    /// Mark the conversation read for the current user
    async fn mark_read(&self, conversation_id: &str) -> Result<()>;
}

/// HTTP-backed implementation
pub struct HttpChatApi {
    base: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ConversationsEnvelope {
    conversations: Vec<Conversation>,
}

#[derive(Deserialize)]
struct MessagesEnvelope {
    messages: Vec<WireMessage>,
}

#[derive(Deserialize)]
struct MessageEnvelope {
    message: WireMessage,
}

impl HttpChatApi {
    pub fn new(base: &str, token: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(ChatError::Api(format!(
                "{} {}",
                resp.status(),
                resp.text().await.unwrap_or_default()
            )))
        }
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let resp = self
            .client
            .get(self.url("/conversations"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let envelope: ConversationsEnvelope = Self::check(resp).await?.json().await?;
        Ok(envelope.conversations)
    }

    async fn fetch_history(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<WireMessage>> {
        let resp = self
            .client
            .get(self.url(&format!("/conversations/{}/messages", conversation_id)))
            .query(&[("limit", limit)])
            .bearer_auth(&self.token)
            .send()
            .await?;
        let envelope: MessagesEnvelope = Self::check(resp).await?.json().await?;
        Ok(envelope.messages)
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> Result<WireMessage> {
        let resp = self
            .client
            .post(self.url("/messages"))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "conversationId": conversation_id,
                "receiverId": receiver_id,
                "content": content,
            }))
            .send()
            .await?;
        let envelope: MessageEnvelope = Self::check(resp).await?.json().await?;
        Ok(envelope.message)
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("/conversations/{}/read", conversation_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}
