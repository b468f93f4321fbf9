//! # groupclaw core
//!
//! Domain types, traits, and error definitions for the groupclaw chat
//! responder. This crate has **no transport dependencies**: it defines the
//! model that the provider, channel and agent crates implement against.
//!
//! ## Seams
//!
//! Both external services are traits here:
//! - [`Provider`]: a generative completion backend (Gemini in production)
//! - [`ChatSession`]: an authenticated messaging session (WhatsApp bridge)
//!
//! Everything above them can be exercised with in-memory fakes.

pub mod error;
pub mod message;
pub mod provider;
pub mod session;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, SessionError};
pub use message::{Role, Turn};
pub use provider::{Completion, CompletionRequest, Provider, Usage};
pub use session::{
    ChatInfo, ChatKind, ChatMessage, ChatSession, Contact, MessageKey, SessionEvent, WaId,
};
