//! The responder: consumes session events and answers admitted messages.
//!
//! Every `MessageCreated` event gets its own task. The task waits out the
//! trigger delay, then runs [`Responder::respond_with_retry`] independently
//! of every other trigger. Per-conversation windows live in a shared
//! [`ChatWindows`] registry that is only locked for the increment.
//!
//! A dropped session is re-opened after a fixed delay. Only the shutdown
//! signal ends [`Responder::run`]; in-flight triggers are cancelled then.

use crate::assembler::{ContextAssembler, ReplyOutcome};
use crate::error::RetryError;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::window::{ChatWindows, ContextWindow, WindowStep};
use groupclaw_config::AppConfig;
use groupclaw_core::session::{ChatMessage, SessionEvent};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Called with the raw pairing code whenever the session asks to be linked.
pub type PairingHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// How many of our own reply ids are remembered for echo suppression.
const RECENT_REPLY_CAPACITY: usize = 128;

/// Counters reported when [`Responder::run`] returns.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub replied: usize,
    pub ignored: usize,
    pub failed: usize,
    /// Echoes of our own replies that were not answered
    pub skipped_own: usize,
}

pub struct Responder {
    assembler: Arc<ContextAssembler>,
    retry: RetryPolicy,
    trigger_delay: Duration,
    reconnect_delay: Duration,
    window_ceiling: usize,
    on_pairing: Option<PairingHandler>,
}

/// State shared by all trigger tasks of one run.
struct RunState {
    windows: ChatWindows,
    own_replies: Mutex<RecentIds>,
    summary: Mutex<RunSummary>,
}

impl RunState {
    fn new(window_ceiling: usize) -> Self {
        Self {
            windows: ChatWindows::new(window_ceiling),
            own_replies: Mutex::new(RecentIds::new(RECENT_REPLY_CAPACITY)),
            summary: Mutex::new(RunSummary::default()),
        }
    }

    fn is_own_reply(&self, id: &str) -> bool {
        self.own_replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }

    fn remember_reply(&self, id: String) {
        self.own_replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id);
    }

    fn count(&self, update: impl FnOnce(&mut RunSummary)) {
        update(&mut self.summary.lock().unwrap_or_else(|e| e.into_inner()));
    }

    fn summary(&self) -> RunSummary {
        *self.summary.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// What the event loop does next.
enum Step {
    Shutdown,
    Event(Option<SessionEvent>),
    Reaped,
}

impl Responder {
    pub const DEFAULT_TRIGGER_DELAY: Duration = Duration::from_secs(3);
    pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

    pub fn new(assembler: Arc<ContextAssembler>, retry: RetryPolicy) -> Self {
        Self {
            assembler,
            retry,
            trigger_delay: Self::DEFAULT_TRIGGER_DELAY,
            reconnect_delay: Self::DEFAULT_RECONNECT_DELAY,
            window_ceiling: ContextWindow::DEFAULT_CEILING,
            on_pairing: None,
        }
    }

    /// Build a responder with delays, retry bounds and window ceiling from config.
    pub fn from_config(assembler: Arc<ContextAssembler>, config: &AppConfig) -> Self {
        Self::new(assembler, RetryPolicy::from_config(&config.timing))
            .with_trigger_delay(Duration::from_millis(config.timing.trigger_delay_ms))
            .with_reconnect_delay(Duration::from_millis(config.timing.reconnect_delay_ms))
            .with_window_ceiling(config.context.max_window)
    }

    pub fn with_trigger_delay(mut self, delay: Duration) -> Self {
        self.trigger_delay = delay;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_window_ceiling(mut self, ceiling: usize) -> Self {
        self.window_ceiling = ceiling;
        self
    }

    pub fn with_pairing_handler(mut self, handler: PairingHandler) -> Self {
        self.on_pairing = Some(handler);
        self
    }

    /// Run reply attempts for `trigger` until one succeeds or the policy gives up.
    pub async fn respond_with_retry<W>(
        &self,
        trigger: &ChatMessage,
        window: &mut W,
    ) -> Result<ReplyOutcome, RetryError>
    where
        W: WindowStep + Send + ?Sized,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let err = match self.assembler.respond(trigger, window).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) => err,
            };

            match self.retry.decide(attempt, &err) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        msg_id = %trigger.key.serialized,
                        attempt,
                        delay = ?delay,
                        error = %err,
                        "Error processing message, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp if err.is_retryable() => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        source: err,
                    });
                }
                RetryDecision::GiveUp => {
                    return Err(RetryError::Terminal {
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }

    /// Consume session events until `shutdown` resolves.
    ///
    /// A disconnect or the end of the event stream re-opens the session after
    /// the reconnect delay. Triggers still waiting or retrying when `shutdown`
    /// resolves are cancelled.
    pub async fn run<F>(self, events: mpsc::Receiver<SessionEvent>, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()> + Send,
    {
        let this = Arc::new(self);
        let state = Arc::new(RunState::new(this.window_ceiling));
        let whitelist = this.assembler.settings().whitelist.clone();
        let mut triggers = JoinSet::new();
        let mut events = Some(events);
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            let Some(stream) = events.as_mut() else {
                let reopened = tokio::select! {
                    _ = &mut shutdown => break,
                    reopened = this.reconnect() => reopened,
                };
                events = Some(reopened);
                continue;
            };

            let step = tokio::select! {
                _ = &mut shutdown => Step::Shutdown,
                Some(done) = triggers.join_next() => {
                    if let Err(e) = done
                        && e.is_panic()
                    {
                        error!("Trigger task panicked: {e}");
                    }
                    Step::Reaped
                }
                event = stream.recv() => Step::Event(event),
            };

            match step {
                Step::Shutdown => break,
                Step::Reaped => {}
                Step::Event(None) => {
                    warn!("Session event stream ended");
                    events = None;
                }
                Step::Event(Some(SessionEvent::Disconnected { reason })) => {
                    let reason = if reason.is_empty() { "unknown" } else { reason.as_str() };
                    warn!(reason, "Session disconnected");
                    events = None;
                }
                Step::Event(Some(SessionEvent::PairingCode { code })) => match &this.on_pairing {
                    Some(handler) => handler(&code),
                    None => info!("Pairing code received; no handler attached"),
                },
                Step::Event(Some(SessionEvent::Ready)) => {
                    info!(whitelist = %whitelist, "Session ready");
                }
                Step::Event(Some(SessionEvent::MessageCreated { message })) => {
                    triggers.spawn(this.clone().handle(message, state.clone()));
                }
            }
        }

        if !triggers.is_empty() {
            info!(pending = triggers.len(), "Cancelling in-flight triggers");
        }
        triggers.shutdown().await;

        let summary = state.summary();
        info!(
            replied = summary.replied,
            ignored = summary.ignored,
            failed = summary.failed,
            "Responder stopped"
        );
        summary
    }

    /// Re-open the session's event stream, retrying at the reconnect delay.
    async fn reconnect(&self) -> mpsc::Receiver<SessionEvent> {
        let session = self.assembler.session();
        loop {
            tokio::time::sleep(self.reconnect_delay).await;
            match session.events().await {
                Ok(events) => {
                    info!(session = session.name(), "Session reconnected");
                    return events;
                }
                Err(e) => warn!(delay = ?self.reconnect_delay, "Reconnect failed: {e}"),
            }
        }
    }

    /// One trigger's pipeline: delay, echo check, retrying reply.
    async fn handle(self: Arc<Self>, trigger: ChatMessage, state: Arc<RunState>) {
        tokio::time::sleep(self.trigger_delay).await;

        if state.is_own_reply(&trigger.key.serialized) {
            debug!(msg_id = %trigger.key.serialized, "Skipping echo of our own reply");
            state.count(|s| s.skipped_own += 1);
            return;
        }

        let mut windows = state.windows.clone();
        match self.respond_with_retry(&trigger, &mut windows).await {
            Ok(ReplyOutcome::Replied(reply)) => {
                state.remember_reply(reply.sent.key.serialized);
                state.count(|s| s.replied += 1);
            }
            Ok(ReplyOutcome::Ignored) => state.count(|s| s.ignored += 1),
            Err(err) => {
                error!(msg_id = %trigger.key.serialized, "{err}");
                state.count(|s| s.failed += 1);
            }
        }
    }
}

/// Insertion-ordered set that forgets its oldest entry once full.
struct RecentIds {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    fn insert(&mut self, id: String) {
        if !self.members.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.members.remove(&oldest);
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }
}
