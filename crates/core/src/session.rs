//! ChatSession trait — the abstraction over an authenticated messaging session.
//!
//! A session connects groupclaw to a messaging network (WhatsApp Web via a
//! bridge in production). It emits lifecycle events and exposes the handful
//! of lookups and the reply operation the responder needs.

use crate::error::SessionError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A WhatsApp-style address: `user@server`.
///
/// Groups live on `g.us`, people on `c.us`. The `user` segment is what the
/// whitelist is compared against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaId {
    pub server: String,
    pub user: String,
    #[serde(rename = "_serialized")]
    pub serialized: String,
}

impl WaId {
    /// Parse a serialized id like `"120363041234567890@g.us"`.
    ///
    /// An id without `@` is kept whole as the user segment.
    pub fn parse(serialized: &str) -> Self {
        let (user, server) = serialized.split_once('@').unwrap_or((serialized, ""));
        Self {
            server: server.to_string(),
            user: user.to_string(),
            serialized: serialized.to_string(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.server == "g.us"
    }
}

impl std::fmt::Display for WaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.serialized)
    }
}

/// What kind of conversation a chat is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Group,
    Direct,
}

/// A resolved conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: WaId,
    pub kind: ChatKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Identity of a single message within a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    /// Sent by the logged-in account
    #[serde(default)]
    pub from_me: bool,

    /// Serialized id of the conversation the message lives in
    pub remote: String,

    /// Message id within the conversation
    pub id: String,

    /// Author within a group conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<WaId>,

    /// Globally unique serialized message id
    #[serde(rename = "_serialized")]
    pub serialized: String,
}

/// A message observed in, or sent to, a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "id")]
    pub key: MessageKey,

    #[serde(default)]
    pub body: String,

    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// The conversation this message belongs to.
    pub fn chat_id(&self) -> WaId {
        WaId::parse(&self.key.remote)
    }
}

/// A contact record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: WaId,

    /// Name the contact chose for themselves
    #[serde(default, rename = "pushname", skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,

    /// Name saved in the session's address book
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Contact {
    /// Push name, then saved name, then the bare user segment.
    pub fn display_name(&self) -> &str {
        self.push_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| self.name.as_deref().filter(|n| !n.is_empty()))
            .unwrap_or(&self.id.user)
    }
}

/// Lifecycle events emitted by a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A pairing code is ready to be scanned by the operator's phone
    #[serde(rename = "qr")]
    PairingCode { code: String },

    /// The session is authenticated and delivering messages
    Ready,

    /// A message was created in any conversation (including our own sends)
    #[serde(rename = "message_create")]
    MessageCreated { message: ChatMessage },

    /// The session dropped
    Disconnected {
        #[serde(default)]
        reason: String,
    },
}

/// The core ChatSession trait.
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Human-readable session name (e.g., "whatsapp").
    fn name(&self) -> &str;

    /// Connect and start receiving lifecycle events.
    ///
    /// The receiver closes when the underlying connection ends.
    async fn events(
        &self,
    ) -> std::result::Result<tokio::sync::mpsc::Receiver<SessionEvent>, SessionError>;

    /// Resolve the conversation a message belongs to.
    async fn chat(&self, message: &ChatMessage) -> std::result::Result<ChatInfo, SessionError>;

    /// Fetch the most recent `limit` messages of a conversation, oldest first.
    async fn fetch_messages(
        &self,
        chat: &WaId,
        limit: usize,
    ) -> std::result::Result<Vec<ChatMessage>, SessionError>;

    /// Look up a participant's contact record.
    async fn contact(&self, participant: &WaId) -> std::result::Result<Contact, SessionError>;

    /// Reply to a message, quoting it. Returns the sent message.
    async fn reply(
        &self,
        to: &ChatMessage,
        content: &str,
    ) -> std::result::Result<ChatMessage, SessionError>;

    /// Disconnect gracefully.
    async fn stop(&self) -> std::result::Result<(), SessionError> {
        Ok(())
    }

    /// Health check — is the session reachable?
    async fn health_check(&self) -> std::result::Result<bool, SessionError> {
        Ok(true)
    }
}
