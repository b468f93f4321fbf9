//! Shared fakes for assembler and responder tests.

use async_trait::async_trait;
use groupclaw_core::error::{ProviderError, SessionError};
use groupclaw_core::provider::{Completion, CompletionRequest, Provider};
use groupclaw_core::session::{
    ChatInfo, ChatKind, ChatMessage, ChatSession, Contact, MessageKey, SessionEvent, WaId,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// Build a message in `chat` (serialized id) authored by `participant`.
pub fn message(chat: &str, participant: Option<&str>, id: &str, body: &str) -> ChatMessage {
    ChatMessage {
        key: MessageKey {
            from_me: false,
            remote: chat.to_string(),
            id: id.to_string(),
            participant: participant.map(WaId::parse),
            serialized: format!("false_{chat}_{id}"),
        },
        body: body.to_string(),
        timestamp: None,
    }
}

pub fn group(chat: &str) -> ChatInfo {
    ChatInfo {
        id: WaId::parse(chat),
        kind: ChatKind::Group,
        name: Some("test group".into()),
    }
}

pub fn direct(chat: &str) -> ChatInfo {
    ChatInfo {
        id: WaId::parse(chat),
        kind: ChatKind::Direct,
        name: None,
    }
}

pub fn contact(participant: &str, push_name: &str) -> Contact {
    Contact {
        id: WaId::parse(participant),
        push_name: Some(push_name.to_string()),
        name: None,
    }
}

/// In-memory session with scripted chats, history and contacts.
///
/// Replies are recorded, appended to the chat history and echoed back as
/// `MessageCreated` events, like the real network does.
#[derive(Default)]
pub struct FakeSession {
    chats: Mutex<HashMap<String, ChatInfo>>,
    history: Mutex<HashMap<String, Vec<ChatMessage>>>,
    contacts: Mutex<HashMap<String, Contact>>,
    replies: Mutex<Vec<(String, String)>>,
    reply_failures: Mutex<VecDeque<SessionError>>,
    events_tx: Mutex<Option<mpsc::Sender<SessionEvent>>>,
    pub chat_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub contact_calls: AtomicUsize,
    pub events_calls: AtomicUsize,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chat(self, chat: ChatInfo) -> Self {
        self.chats
            .lock()
            .unwrap()
            .insert(chat.id.serialized.clone(), chat);
        self
    }

    pub fn with_history(self, chat: &str, messages: Vec<ChatMessage>) -> Self {
        self.history
            .lock()
            .unwrap()
            .insert(chat.to_string(), messages);
        self
    }

    pub fn with_contact(self, contact: Contact) -> Self {
        self.contacts
            .lock()
            .unwrap()
            .insert(contact.id.serialized.clone(), contact);
        self
    }

    /// Make the next `reply` calls fail with these errors, in order.
    pub fn failing_replies(self, errors: Vec<SessionError>) -> Self {
        *self.reply_failures.lock().unwrap() = errors.into();
        self
    }

    /// Recorded replies as (trigger serialized id, content).
    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }

    /// Push an event into the stream handed out by `events`.
    pub async fn emit(&self, event: SessionEvent) {
        let tx = self.events_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    /// End the event stream.
    pub fn close(&self) {
        self.events_tx.lock().unwrap().take();
    }
}

#[async_trait]
impl ChatSession for FakeSession {
    fn name(&self) -> &str {
        "fake"
    }

    async fn events(&self) -> Result<mpsc::Receiver<SessionEvent>, SessionError> {
        self.events_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(64);
        *self.events_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn chat(&self, message: &ChatMessage) -> Result<ChatInfo, SessionError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.chats
            .lock()
            .unwrap()
            .get(&message.key.remote)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(message.key.remote.clone()))
    }

    async fn fetch_messages(
        &self,
        chat: &WaId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let history = self.history.lock().unwrap();
        let messages = history.get(&chat.serialized).cloned().unwrap_or_default();
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn contact(&self, participant: &WaId) -> Result<Contact, SessionError> {
        self.contact_calls.fetch_add(1, Ordering::SeqCst);
        self.contacts
            .lock()
            .unwrap()
            .get(&participant.serialized)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(participant.serialized.clone()))
    }

    async fn reply(&self, to: &ChatMessage, content: &str) -> Result<ChatMessage, SessionError> {
        if let Some(err) = self.reply_failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let sent = {
            let mut replies = self.replies.lock().unwrap();
            replies.push((to.key.serialized.clone(), content.to_string()));
            let mut sent = message(
                &to.key.remote,
                Some("bot@c.us"),
                &format!("reply-{}", replies.len()),
                content,
            );
            sent.key.from_me = true;
            sent.key.serialized = format!("true_{}_reply-{}", to.key.remote, replies.len());
            sent
        };

        self.history
            .lock()
            .unwrap()
            .entry(to.key.remote.clone())
            .or_default()
            .push(sent.clone());

        self.emit(SessionEvent::MessageCreated {
            message: sent.clone(),
        })
        .await;

        Ok(sent)
    }
}

/// A provider that fails with scripted errors, then answers with fixed text.
pub struct ScriptedProvider {
    text: String,
    failures: Mutex<VecDeque<ProviderError>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn answering(text: &str) -> Self {
        Self {
            text: text.to_string(),
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first calls with these errors, in order.
    pub fn failing_first(self, errors: Vec<ProviderError>) -> Self {
        *self.failures.lock().unwrap() = errors.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(Completion {
            text: self.text.clone(),
            model: request.model,
            usage: None,
            finish_reason: Some("STOP".into()),
        })
    }
}
