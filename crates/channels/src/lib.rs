//! Messaging session implementations for groupclaw.
//!
//! Each session connects to a messaging network and exposes it through the
//! `groupclaw_core::ChatSession` trait.
//!
//! Available sessions:
//! - **WhatsApp** — WhatsApp Web through a session bridge (WebSocket + HTTP)

pub mod whatsapp;

pub use whatsapp::{WhatsAppBridge, WhatsAppConfig};
