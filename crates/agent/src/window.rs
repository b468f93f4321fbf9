//! Growing context window.
//!
//! Starts empty and widens by one message per processed trigger until it
//! reaches its ceiling. It never shrinks and never resets; a fresh window
//! only comes with a fresh process.

use groupclaw_core::session::WaId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Per-conversation window size state, owned by the caller of the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    size: usize,
    ceiling: usize,
}

impl ContextWindow {
    pub const DEFAULT_CEILING: usize = 8;

    /// An empty window that grows up to `ceiling` (at least 1).
    pub fn new(ceiling: usize) -> Self {
        Self {
            size: 0,
            ceiling: ceiling.max(1),
        }
    }

    /// Widen by one, saturating at the ceiling. Returns the new size.
    pub fn advance(&mut self) -> usize {
        if self.size < self.ceiling {
            self.size += 1;
        }
        self.size
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn is_full(&self) -> bool {
        self.size >= self.ceiling
    }
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CEILING)
    }
}

/// Hands out the window size for the next reply attempt in a conversation.
pub trait WindowStep {
    fn advance_for(&mut self, chat: &WaId) -> usize;
}

impl WindowStep for ContextWindow {
    fn advance_for(&mut self, _chat: &WaId) -> usize {
        self.advance()
    }
}

/// Per-conversation windows shared by concurrently running reply pipelines.
///
/// Clones share state. The lock is held only for the increment, never across
/// a network call.
#[derive(Debug, Clone)]
pub struct ChatWindows {
    inner: Arc<Mutex<HashMap<String, ContextWindow>>>,
    ceiling: usize,
}

impl ChatWindows {
    pub fn new(ceiling: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ceiling,
        }
    }

    /// Widen `chat`'s window by one and return its new size.
    pub fn advance(&self, chat: &str) -> usize {
        let mut windows = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        windows
            .entry(chat.to_string())
            .or_insert_with(|| ContextWindow::new(self.ceiling))
            .advance()
    }

    /// Current size for `chat`; 0 if it was never answered in.
    pub fn size(&self, chat: &str) -> usize {
        let windows = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        windows.get(chat).map_or(0, ContextWindow::size)
    }

    /// Number of conversations holding a window.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WindowStep for ChatWindows {
    fn advance_for(&mut self, chat: &WaId) -> usize {
        self.advance(&chat.serialized)
    }
}
