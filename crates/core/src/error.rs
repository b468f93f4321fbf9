//! Error types for the groupclaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each external collaborator has its own error enum, and each enum knows
//! whether a failure is worth retrying.

use thiserror::Error;

/// The top-level error type for all groupclaw operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Session errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the generative completion backend.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider returned no completion text: {0}")]
    EmptyCompletion(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether repeating the same request later can plausibly succeed.
    ///
    /// Bad credentials, unknown models and rejected (4xx) payloads are
    /// terminal. Server errors, throttling and transport failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 408,
            Self::RateLimited { .. }
            | Self::EmptyCompletion(_)
            | Self::Timeout(_)
            | Self::Network(_) => true,
            Self::AuthenticationFailed(_) | Self::ModelNotFound(_) => false,
        }
    }
}

/// Failures talking to the messaging session.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Session not connected: {0}")]
    NotConnected(String),

    #[error("Session request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Session rejected credentials: {0}")]
    Unauthorized(String),

    #[error("Invalid session payload: {0}")]
    InvalidPayload(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl SessionError {
    /// Whether repeating the same operation later can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status_code, .. } => *status_code >= 500 || *status_code == 429,
            Self::NotConnected(_) | Self::InvalidPayload(_) | Self::Network(_) => true,
            Self::NotFound(_) | Self::Unauthorized(_) => false,
        }
    }
}
