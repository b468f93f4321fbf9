//! Completion provider implementations for groupclaw.
//!
//! All providers implement the `groupclaw_core::Provider` trait.

pub mod gemini;

pub use gemini::GeminiProvider;
