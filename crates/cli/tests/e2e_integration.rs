//! End-to-end tests for the groupclaw responder.
//!
//! These drive the full pipeline from session events to sent replies, wired
//! from an `AppConfig` the same way `groupclaw run` wires it, with an
//! in-memory session and a scripted provider standing in for the network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use groupclaw_agent::{AssemblerSettings, ContextAssembler, Responder, RunSummary};
use groupclaw_config::AppConfig;
use groupclaw_core::error::{ProviderError, SessionError};
use groupclaw_core::message::Role;
use groupclaw_core::provider::{Completion, CompletionRequest, Provider, Usage};
use groupclaw_core::session::{
    ChatInfo, ChatKind, ChatMessage, ChatSession, Contact, MessageKey, SessionEvent, WaId,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const GROUP: &str = "120363041234567890@g.us";
const OTHER_GROUP: &str = "120363099999999999@g.us";

// ── Mock Provider ────────────────────────────────────────────────────────

/// A provider that returns scripted results in sequence, then repeats the last one.
struct ScriptedProvider {
    results: Mutex<Vec<Result<String, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    fn new(results: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            results: Mutex::new(results),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn text(response: &str) -> Self {
        Self::new(vec![Ok(response.to_string())])
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut results = self.results.lock().unwrap();
        let next = if results.len() > 1 {
            results.remove(0)
        } else {
            results[0].clone()
        };
        next.map(|text| Completion {
            text,
            model: request.model,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            finish_reason: Some("STOP".into()),
        })
    }
}

// ── Mock Session ─────────────────────────────────────────────────────────

/// A single-account messaging network held in memory.
#[derive(Default)]
struct MemorySession {
    chats: HashMap<String, ChatKind>,
    contacts: HashMap<String, String>,
    history: Mutex<HashMap<String, Vec<ChatMessage>>>,
    sent: Mutex<Vec<ChatMessage>>,
    events: Mutex<Option<mpsc::Sender<SessionEvent>>>,
}

impl MemorySession {
    fn new() -> Self {
        let mut session = Self::default();
        session.chats.insert(GROUP.into(), ChatKind::Group);
        session.chats.insert(OTHER_GROUP.into(), ChatKind::Group);
        session.contacts.insert("6281111@c.us".into(), "Alice".into());
        session.contacts.insert("6282222@c.us".into(), "Bob".into());
        session
    }

    /// A member posts in `chat`: stored in history and announced as an event.
    async fn post(&self, chat: &str, author: &str, id: &str, body: &str) -> ChatMessage {
        let message = chat_message(chat, Some(author), id, body, false);
        self.history
            .lock()
            .unwrap()
            .entry(chat.to_string())
            .or_default()
            .push(message.clone());
        self.announce(SessionEvent::MessageCreated {
            message: message.clone(),
        })
        .await;
        message
    }

    async fn announce(&self, event: SessionEvent) {
        let tx = self.events.lock().unwrap().clone();
        if let Some(tx) = tx {
            tx.send(event).await.unwrap();
        }
    }

    fn sent(&self) -> Vec<ChatMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ChatSession for MemorySession {
    fn name(&self) -> &str {
        "memory"
    }

    async fn events(&self) -> Result<mpsc::Receiver<SessionEvent>, SessionError> {
        let (tx, rx) = mpsc::channel(32);
        *self.events.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn chat(&self, message: &ChatMessage) -> Result<ChatInfo, SessionError> {
        let kind = self
            .chats
            .get(&message.key.remote)
            .copied()
            .ok_or_else(|| SessionError::NotFound(message.key.remote.clone()))?;
        Ok(ChatInfo {
            id: WaId::parse(&message.key.remote),
            kind,
            name: None,
        })
    }

    async fn fetch_messages(
        &self,
        chat: &WaId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        let history = self.history.lock().unwrap();
        let messages = history.get(&chat.serialized).cloned().unwrap_or_default();
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn contact(&self, participant: &WaId) -> Result<Contact, SessionError> {
        let push_name = self.contacts.get(&participant.serialized).cloned();
        Ok(Contact {
            id: participant.clone(),
            push_name,
            name: None,
        })
    }

    async fn reply(&self, to: &ChatMessage, content: &str) -> Result<ChatMessage, SessionError> {
        let id = format!("reply-{}", self.sent.lock().unwrap().len() + 1);
        let reply = chat_message(&to.key.remote, Some("6289999@c.us"), &id, content, true);
        self.sent.lock().unwrap().push(reply.clone());
        self.history
            .lock()
            .unwrap()
            .entry(to.key.remote.clone())
            .or_default()
            .push(reply.clone());
        self.announce(SessionEvent::MessageCreated {
            message: reply.clone(),
        })
        .await;
        Ok(reply)
    }
}

fn chat_message(
    chat: &str,
    author: Option<&str>,
    id: &str,
    body: &str,
    from_me: bool,
) -> ChatMessage {
    ChatMessage {
        key: MessageKey {
            from_me,
            remote: chat.to_string(),
            id: id.to_string(),
            participant: author.map(WaId::parse),
            serialized: format!("{from_me}_{chat}_{id}"),
        },
        body: body.to_string(),
        timestamp: None,
    }
}

// ── Wiring ───────────────────────────────────────────────────────────────

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.apply_env(|key| match key {
        "GROUP_WHITELIST_ID" => Some("120363041234567890".into()),
        "GOOGLE_AI_STUDIO_API_KEY" => Some("test-key".into()),
        _ => None,
    });
    config.persona.prompt = "You are a sarcastic friend.".into();
    config
}

fn wire(
    session: Arc<MemorySession>,
    provider: Arc<ScriptedProvider>,
    config: &AppConfig,
) -> Responder {
    let settings = AssemblerSettings::from_config(config).unwrap();
    let assembler = Arc::new(ContextAssembler::new(session, provider, settings));
    Responder::from_config(assembler, config)
}

/// Start the responder; sending on the returned switch stops it like Ctrl-C.
fn start(
    responder: Responder,
    events: mpsc::Receiver<SessionEvent>,
) -> (oneshot::Sender<()>, JoinHandle<RunSummary>) {
    let (stop, stopped) = oneshot::channel::<()>();
    let run = tokio::spawn(responder.run(events, async move {
        let _ = stopped.await;
    }));
    (stop, run)
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn conversation_in_whitelisted_group() {
    let session = Arc::new(MemorySession::new());
    let provider = Arc::new(ScriptedProvider::text("lol no"));
    let responder = wire(session.clone(), provider.clone(), &config());

    let events = session.events().await.unwrap();
    let (stop, run) = start(responder, events);

    session.announce(SessionEvent::Ready).await;
    session.post(GROUP, "6281111@c.us", "m1", "hi").await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    session.post(GROUP, "6282222@c.us", "m2", "bot, thoughts?").await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    stop.send(()).unwrap();
    let summary = run.await.unwrap();

    assert_eq!(
        summary,
        RunSummary {
            replied: 2,
            ignored: 0,
            failed: 0,
            skipped_own: 2,
        }
    );

    let sent = session.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|m| m.body == "lol no" && m.key.remote == GROUP));

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);

    // First trigger: window of one, which is the trigger itself.
    let first: Vec<&str> = requests[0].turns.iter().map(|t| t.text.as_str()).collect();
    assert_eq!(first, vec!["You are a sarcastic friend.", "Alice: hi", "hi"]);

    // Second trigger: window of two, the bot's own reply under its persona name.
    let second = &requests[1];
    assert_eq!(second.model, "gemini-2.0-flash-lite");
    assert_eq!(second.turns.len(), 4);
    assert_eq!(second.turns[0].role, Role::System);
    assert_eq!(second.turns[1].text, "groupclaw: lol no");
    assert_eq!(second.turns[2].text, "Bob: bot, thoughts?");
    assert_eq!(second.turns[3].role, Role::User);
    assert_eq!(second.turns[3].text, "bot, thoughts?");
}

#[tokio::test(start_paused = true)]
async fn other_groups_never_reach_the_provider() {
    let session = Arc::new(MemorySession::new());
    let provider = Arc::new(ScriptedProvider::text("unused"));
    let responder = wire(session.clone(), provider.clone(), &config());

    let events = session.events().await.unwrap();
    let (stop, run) = start(responder, events);

    session.post(OTHER_GROUP, "6281111@c.us", "x1", "anyone?").await;
    session.post(OTHER_GROUP, "6282222@c.us", "x2", "hello").await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    stop.send(()).unwrap();

    let summary = run.await.unwrap();
    assert_eq!(summary.ignored, 2);
    assert_eq!(summary.replied, 0);
    assert!(provider.requests().is_empty());
    assert!(session.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rate_limited_completion_is_retried_until_it_lands() {
    let session = Arc::new(MemorySession::new());
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ProviderError::RateLimited {
            retry_after_secs: 5,
        }),
        Err(ProviderError::ApiError {
            status_code: 503,
            message: "overloaded".into(),
        }),
        Ok("finally".into()),
    ]));
    let responder = wire(session.clone(), provider.clone(), &config());

    let events = session.events().await.unwrap();
    let (stop, run) = start(responder, events);

    session.post(GROUP, "6281111@c.us", "m1", "ping").await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    stop.send(()).unwrap();

    let summary = run.await.unwrap();
    assert_eq!(summary.replied, 1);
    assert_eq!(provider.requests().len(), 3);

    let sent = session.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, "finally");
}

#[tokio::test(start_paused = true)]
async fn rejected_api_key_fails_without_retrying() {
    let session = Arc::new(MemorySession::new());
    let provider = Arc::new(ScriptedProvider::new(vec![Err(
        ProviderError::AuthenticationFailed("API key not valid".into()),
    )]));
    let responder = wire(session.clone(), provider.clone(), &config());

    let events = session.events().await.unwrap();
    let (stop, run) = start(responder, events);

    session.post(GROUP, "6281111@c.us", "m1", "ping").await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    stop.send(()).unwrap();

    let summary = run.await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(provider.requests().len(), 1);
    assert!(session.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn bridge_drop_is_survived() {
    let session = Arc::new(MemorySession::new());
    let provider = Arc::new(ScriptedProvider::text("still here"));
    let responder = wire(session.clone(), provider.clone(), &config());

    let events = session.events().await.unwrap();
    let (stop, run) = start(responder, events);

    session
        .announce(SessionEvent::Disconnected {
            reason: "bridge restarted".into(),
        })
        .await;
    // Default reconnect delay is five seconds.
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(!run.is_finished());

    session.post(GROUP, "6281111@c.us", "m1", "you there?").await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    stop.send(()).unwrap();

    let summary = run.await.unwrap();
    assert_eq!(summary.replied, 1);
    assert_eq!(session.sent()[0].body, "still here");
}

#[test]
fn run_requires_a_whitelist() {
    let config = AppConfig::default();
    let err = AssemblerSettings::from_config(&config).unwrap_err();
    assert!(err.to_string().contains("GROUP_WHITELIST_ID"));
}
