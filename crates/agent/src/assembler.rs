//! Context assembly: admission, context gathering, request building, reply.
//!
//! One call to [`ContextAssembler::respond`] is one reply attempt:
//!
//! 1. Resolve the trigger's conversation and compare its user segment with
//!    the whitelist. Anything else is ignored.
//! 2. Widen the caller's window for that conversation by one.
//! 3. Fetch that many recent messages and resolve every author's display
//!    name concurrently. Our own messages carry the persona name; authors
//!    without a contact record fall back to their user segment.
//! 4. Build `[persona] + [one turn per entry] + [trigger body]`.
//! 5. Ask the provider for one completion.
//! 6. Send it as a reply quoting the trigger.

use crate::error::ReplyError;
use crate::window::WindowStep;
use futures::future::try_join_all;
use groupclaw_config::{AppConfig, ConfigError};
use groupclaw_core::error::SessionError;
use groupclaw_core::message::Turn;
use groupclaw_core::provider::{CompletionRequest, Provider};
use groupclaw_core::session::{ChatInfo, ChatKind, ChatMessage, ChatSession};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One attributed message from the context window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub author_name: String,
    pub text: String,
}

impl ContextEntry {
    /// `"<author_name>: <text>"` as a model turn.
    pub fn to_turn(&self) -> Turn {
        Turn::model(format!("{}: {}", self.author_name, self.text))
    }
}

/// Fixed inputs of every reply.
#[derive(Debug, Clone)]
pub struct AssemblerSettings {
    /// User segment of the only conversation we answer in
    pub whitelist: String,
    /// Persona turn text
    pub persona: String,
    /// Author name for our own messages in the context
    pub own_name: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl AssemblerSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            whitelist: config.whitelist()?.to_string(),
            persona: config.persona.prompt.clone(),
            own_name: config.persona.name.clone(),
            model: config.provider.model.clone(),
            temperature: config.provider.temperature,
            max_output_tokens: config.provider.max_output_tokens,
        })
    }
}

/// Result of the admission check.
#[derive(Debug, Clone)]
pub enum Admission {
    /// Not the whitelisted conversation
    Ignored,
    Admitted(ChatInfo),
}

/// What a reply attempt did.
#[derive(Debug, Clone)]
pub enum ReplyOutcome {
    Ignored,
    Replied(Reply),
}

/// A sent reply and the context that produced it.
#[derive(Debug, Clone)]
pub struct Reply {
    /// The message as sent by the session
    pub sent: ChatMessage,
    pub entries: Vec<ContextEntry>,
    pub turns: Vec<Turn>,
    /// Window size used for this reply
    pub window: usize,
}

pub struct ContextAssembler {
    session: Arc<dyn ChatSession>,
    provider: Arc<dyn Provider>,
    settings: AssemblerSettings,
}

impl ContextAssembler {
    pub fn new(
        session: Arc<dyn ChatSession>,
        provider: Arc<dyn Provider>,
        settings: AssemblerSettings,
    ) -> Self {
        Self {
            session,
            provider,
            settings,
        }
    }

    pub fn settings(&self) -> &AssemblerSettings {
        &self.settings
    }

    pub fn session(&self) -> &Arc<dyn ChatSession> {
        &self.session
    }

    /// Resolve the trigger's conversation and decide whether we serve it.
    ///
    /// A whitelisted conversation that turns out not to be a group is an
    /// error, not a silent skip.
    pub async fn admit(&self, trigger: &ChatMessage) -> Result<Admission, ReplyError> {
        let chat = self.session.chat(trigger).await?;

        if chat.id.user != self.settings.whitelist {
            debug!(chat = %chat.id, "Ignoring message outside the whitelisted chat");
            return Ok(Admission::Ignored);
        }

        if chat.kind != ChatKind::Group {
            warn!(chat = %chat.id, "Whitelisted chat is not a group");
            return Err(ReplyError::NotAGroup {
                chat: chat.id.serialized,
            });
        }

        Ok(Admission::Admitted(chat))
    }

    /// Fetch the `limit` most recent messages and attribute each one.
    ///
    /// Contact lookups run concurrently; entries keep the fetched order.
    /// An unknown contact is not an error.
    pub async fn gather(
        &self,
        chat: &ChatInfo,
        limit: usize,
    ) -> Result<Vec<ContextEntry>, ReplyError> {
        let messages = self.session.fetch_messages(&chat.id, limit).await?;
        let session = &self.session;
        let own_name = self.settings.own_name.as_str();

        let lookups = messages.into_iter().map(|message| async move {
            let author_name = match &message.key.participant {
                _ if message.key.from_me => own_name.to_string(),
                Some(participant) => match session.contact(participant).await {
                    Ok(contact) => contact.display_name().to_string(),
                    Err(SessionError::NotFound(_)) => {
                        debug!(participant = %participant, "No contact record, using user segment");
                        participant.user.clone()
                    }
                    Err(e) => return Err(ReplyError::from(e)),
                },
                None => message.chat_id().user,
            };
            Ok::<_, ReplyError>(ContextEntry {
                author_name,
                text: message.body,
            })
        });

        try_join_all(lookups).await
    }

    /// Persona turn, one turn per entry, then the trigger body.
    pub fn build_request(&self, entries: &[ContextEntry], trigger_body: &str) -> CompletionRequest {
        let mut turns = Vec::with_capacity(entries.len() + 2);
        turns.push(Turn::system(self.settings.persona.clone()));
        turns.extend(entries.iter().map(ContextEntry::to_turn));
        turns.push(Turn::user(trigger_body));

        CompletionRequest {
            model: self.settings.model.clone(),
            turns,
            temperature: self.settings.temperature,
            max_output_tokens: self.settings.max_output_tokens,
        }
    }

    /// Run one full reply attempt for `trigger`.
    ///
    /// The window only moves once the trigger has been admitted.
    pub async fn respond<W>(
        &self,
        trigger: &ChatMessage,
        window: &mut W,
    ) -> Result<ReplyOutcome, ReplyError>
    where
        W: WindowStep + Send + ?Sized,
    {
        let chat = match self.admit(trigger).await? {
            Admission::Ignored => return Ok(ReplyOutcome::Ignored),
            Admission::Admitted(chat) => chat,
        };

        let limit = window.advance_for(&chat.id);
        info!(chat = %chat.id, window = limit, "Answering message");

        let entries = self.gather(&chat, limit).await?;
        let request = self.build_request(&entries, &trigger.body);
        let turns = request.turns.clone();

        let completion = self.provider.complete(request).await?;
        let sent = self.session.reply(trigger, &completion.text).await?;

        debug!(
            turns = %serde_json::to_string_pretty(&turns).unwrap_or_default(),
            "Reply sent with context"
        );

        Ok(ReplyOutcome::Replied(Reply {
            sent,
            entries,
            turns,
            window: limit,
        }))
    }
}
