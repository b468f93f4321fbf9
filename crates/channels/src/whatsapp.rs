//! WhatsApp session adapter.
//!
//! Implements [`ChatSession`] against a WhatsApp Web bridge: a sidecar
//! process that keeps the browser session alive and exposes it over
//! WebSocket (events) and HTTP (operations).
//!
//! | Operation        | Bridge call                                   |
//! |------------------|-----------------------------------------------|
//! | events           | `WS  <events_url>` — JSON frames tagged `event` |
//! | chat             | `GET  /chats/{chat}`                          |
//! | fetch_messages   | `GET  /chats/{chat}/messages?limit=N`         |
//! | contact          | `GET  /contacts/{participant}`                |
//! | reply            | `POST /messages/{message}/reply`              |
//! | health_check     | `GET  /health`                                |

use async_trait::async_trait;
use futures::StreamExt;
use groupclaw_config::BridgeConfig;
use groupclaw_core::error::SessionError;
use groupclaw_core::session::{
    ChatInfo, ChatKind, ChatMessage, ChatSession, Contact, SessionEvent, WaId,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, info, warn};

/// WhatsApp bridge configuration.
#[derive(Clone)]
pub struct WhatsAppConfig {
    /// HTTP base URL of the bridge.
    pub base_url: String,
    /// WebSocket URL streaming session events.
    pub events_url: String,
    /// Optional bearer token.
    pub token: Option<String>,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
}

impl WhatsAppConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
}

impl std::fmt::Debug for WhatsAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppConfig")
            .field("base_url", &self.base_url)
            .field("events_url", &self.events_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl From<&BridgeConfig> for WhatsAppConfig {
    fn from(bridge: &BridgeConfig) -> Self {
        Self {
            base_url: bridge.base_url.trim_end_matches('/').to_string(),
            events_url: bridge.resolved_events_url(),
            token: bridge.token.clone(),
            timeout: Duration::from_secs(bridge.timeout_secs),
        }
    }
}

/// WhatsApp session backed by a bridge.
pub struct WhatsAppBridge {
    config: WhatsAppConfig,
    client: reqwest::Client,
    shutdown: Arc<Notify>,
}

impl WhatsAppBridge {
    pub fn new(config: WhatsAppConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            config,
            client,
            shutdown: Arc::new(Notify::new()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        let response = self
            .authorized(self.client.get(self.url(path)))
            .send()
            .await
            .map_err(|e| SessionError::Network(e.to_string()))?;
        Self::decode(response, path).await
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        path: &str,
    ) -> Result<T, SessionError> {
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, path));
        }
        response
            .json()
            .await
            .map_err(|e| SessionError::InvalidPayload(format!("{path}: {e}")))
    }
}

/// Map a non-success bridge status to a session error.
fn classify_status(status: u16, body: &str, path: &str) -> SessionError {
    match status {
        404 => SessionError::NotFound(path.to_string()),
        401 | 403 => SessionError::Unauthorized(body.to_string()),
        _ => SessionError::Api {
            status_code: status,
            message: body.to_string(),
        },
    }
}

/// Decode one event frame; `None` for frames we do not understand.
fn parse_frame(text: &str) -> Option<SessionEvent> {
    match serde_json::from_str::<SessionEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "Skipping malformed session frame");
            None
        }
    }
}

#[async_trait]
impl ChatSession for WhatsAppBridge {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn events(&self) -> Result<mpsc::Receiver<SessionEvent>, SessionError> {
        let mut request = self
            .config
            .events_url
            .as_str()
            .into_client_request()
            .map_err(|e| SessionError::NotConnected(e.to_string()))?;

        if let Some(token) = &self.config.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| SessionError::InvalidPayload(e.to_string()))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SessionError::NotConnected(e.to_string()))?;

        info!(url = %self.config.events_url, "WhatsApp bridge connected");

        let (tx, rx) = mpsc::channel(64);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let (_sink, mut stream) = ws.split();
            loop {
                let frame = tokio::select! {
                    frame = stream.next() => frame,
                    _ = shutdown.notified() => {
                        debug!("Event stream shutting down");
                        break;
                    }
                };

                let event = match frame {
                    Some(Ok(WsMessage::Text(text))) => match parse_frame(&text) {
                        Some(event) => event,
                        None => continue,
                    },
                    Some(Ok(WsMessage::Close(close))) => SessionEvent::Disconnected {
                        reason: close
                            .map(|c| c.reason.to_string())
                            .unwrap_or_else(|| "bridge closed the connection".into()),
                    },
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => SessionEvent::Disconnected {
                        reason: e.to_string(),
                    },
                    None => SessionEvent::Disconnected {
                        reason: "event stream ended".into(),
                    },
                };

                let ended = matches!(event, SessionEvent::Disconnected { .. });
                if tx.send(event).await.is_err() || ended {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn chat(&self, message: &ChatMessage) -> Result<ChatInfo, SessionError> {
        let chat: ApiChat = self
            .get_json(&format!("/chats/{}", message.key.remote))
            .await?;
        Ok(chat.into())
    }

    async fn fetch_messages(
        &self,
        chat: &WaId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.get_json(&format!("/chats/{}/messages?limit={limit}", chat.serialized))
            .await
    }

    async fn contact(&self, participant: &WaId) -> Result<Contact, SessionError> {
        self.get_json(&format!("/contacts/{}", participant.serialized))
            .await
    }

    async fn reply(&self, to: &ChatMessage, content: &str) -> Result<ChatMessage, SessionError> {
        let path = format!("/messages/{}/reply", to.key.serialized);
        let response = self
            .authorized(self.client.post(self.url(&path)))
            .json(&ApiReply { content })
            .send()
            .await
            .map_err(|e| SessionError::Network(e.to_string()))?;
        Self::decode(response, &path).await
    }

    async fn stop(&self) -> Result<(), SessionError> {
        info!("WhatsApp bridge stopping");
        self.shutdown.notify_one();
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, SessionError> {
        let response = self
            .authorized(self.client.get(self.url("/health")))
            .send()
            .await
            .map_err(|e| SessionError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

// ── Bridge wire types ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiChat {
    id: WaId,
    #[serde(default)]
    is_group: bool,
    #[serde(default)]
    name: Option<String>,
}

impl From<ApiChat> for ChatInfo {
    fn from(chat: ApiChat) -> Self {
        Self {
            id: chat.id,
            kind: if chat.is_group {
                ChatKind::Group
            } else {
                ChatKind::Direct
            },
            name: chat.name,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiReply<'a> {
    content: &'a str,
}
