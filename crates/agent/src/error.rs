//! Errors raised while answering a message.

use groupclaw_core::error::{ProviderError, SessionError};
use thiserror::Error;

/// A single reply attempt failed.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("Completion failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Session operation failed: {0}")]
    Session(#[from] SessionError),

    #[error("Chat {chat} matches the whitelist but is not a group conversation")]
    NotAGroup { chat: String },
}

impl ReplyError {
    /// Whether re-running the whole attempt can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::Session(e) => e.is_retryable(),
            Self::NotAGroup { .. } => false,
        }
    }
}

/// The retry driver stopped without a reply.
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("Terminal failure on attempt {attempts}: {source}")]
    Terminal { attempts: u32, source: ReplyError },

    #[error("Gave up after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: ReplyError },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Terminal { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// The error from the final attempt.
    pub fn last_error(&self) -> &ReplyError {
        match self {
            Self::Terminal { source, .. } | Self::Exhausted { source, .. } => source,
        }
    }
}
