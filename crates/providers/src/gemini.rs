//! Google Gemini provider implementation.
//!
//! Talks to the Generative Language API (`generateContent`) with an
//! AI Studio API key. Turns map onto Gemini `contents`:
//! persona and context turns are sent as `model`, the triggering message as
//! `user`.

use async_trait::async_trait;
use groupclaw_config::AppConfig;
use groupclaw_core::error::ProviderError;
use groupclaw_core::message::{Role, Turn};
use groupclaw_core::provider::{Completion, CompletionRequest, Usage};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// A Gemini completion provider.
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a provider against the public endpoint with the default timeout (120s).
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_timeout(api_key, Duration::from_secs(120))
    }

    /// Create a provider with a custom request timeout.
    pub fn with_timeout(api_key: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Point the provider at another endpoint (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build from application config; a missing key becomes the sentinel.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_timeout(
            config.api_key_or_sentinel(),
            Duration::from_secs(config.provider.timeout_secs),
        )
        .with_base_url(&config.provider.api_url)
    }

    fn generate_endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    fn models_endpoint(&self) -> String {
        format!("{}/v1beta/models", self.base_url)
    }

    /// Convert our turns to Gemini `contents`.
    fn to_api_contents(turns: &[Turn]) -> Vec<ApiContent> {
        turns
            .iter()
            .map(|t| ApiContent {
                role: match t.role {
                    Role::User => "user".into(),
                    Role::System | Role::Model => "model".into(),
                },
                parts: vec![ApiPart {
                    text: t.text.clone(),
                }],
            })
            .collect()
    }

    fn to_api_request(request: &CompletionRequest) -> ApiRequest {
        let generation_config =
            if request.temperature.is_none() && request.max_output_tokens.is_none() {
                None
            } else {
                Some(ApiGenerationConfig {
                    temperature: request.temperature,
                    max_output_tokens: request.max_output_tokens,
                })
            };

        ApiRequest {
            contents: Self::to_api_contents(&request.turns),
            generation_config,
        }
    }

    /// Map a non-success HTTP status to a provider error.
    fn classify_error(status: u16, body: &str, model: &str) -> ProviderError {
        let message = serde_json::from_str::<ApiErrorEnvelope>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.to_string());

        match status {
            429 => ProviderError::RateLimited {
                retry_after_secs: 5,
            },
            401 | 403 => ProviderError::AuthenticationFailed(message),
            400 if body.contains("API_KEY_INVALID") || message.contains("API key not valid") => {
                ProviderError::AuthenticationFailed(message)
            }
            404 => ProviderError::ModelNotFound(model.to_string()),
            _ => ProviderError::ApiError {
                status_code: status,
                message,
            },
        }
    }

    /// Turn a decoded response into a completion.
    fn into_completion(response: ApiResponse, model: &str) -> Result<Completion, ProviderError> {
        let usage = response.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        let Some(candidate) = response.candidates.into_iter().next() else {
            let reason = response
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".into());
            return Err(ProviderError::EmptyCompletion(reason));
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyCompletion(
                candidate
                    .finish_reason
                    .unwrap_or_else(|| "empty candidate".into()),
            ));
        }

        Ok(Completion {
            text,
            model: response.model_version.unwrap_or_else(|| model.to_string()),
            usage,
            finish_reason: candidate.finish_reason,
        })
    }
}

#[async_trait]
impl groupclaw_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<Completion, ProviderError> {
        let url = self.generate_endpoint(&request.model);
        let body = Self::to_api_request(&request);

        debug!(
            provider = "gemini",
            model = %request.model,
            turns = request.turns.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(Self::classify_error(status, &error_body, &request.model));
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: status,
                message: format!("Failed to parse response: {e}"),
            })?;

        Self::into_completion(api_response, &request.model)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let response = self
            .client
            .get(self.models_endpoint())
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// ── Gemini API types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest {
    contents: Vec<ApiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<ApiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    usage_metadata: Option<ApiUsage>,
    prompt_feedback: Option<ApiPromptFeedback>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCandidate {
    content: Option<ApiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use groupclaw_core::Provider;

    fn request(turns: Vec<Turn>) -> CompletionRequest {
        CompletionRequest {
            model: "gemini-2.0-flash-lite".into(),
            turns,
            temperature: None,
            max_output_tokens: None,
        }
    }

    #[test]
    fn provider_name() {
        assert_eq!(GeminiProvider::new("key").name(), "gemini");
    }

    #[test]
    fn endpoints() {
        let p = GeminiProvider::new("key").with_base_url("http://localhost:8080/");
        assert_eq!(
            p.generate_endpoint("gemini-2.0-flash-lite"),
            "http://localhost:8080/v1beta/models/gemini-2.0-flash-lite:generateContent"
        );
        assert_eq!(p.models_endpoint(), "http://localhost:8080/v1beta/models");
    }

    #[test]
    fn from_config_uses_sentinel_and_endpoint() {
        let mut config = AppConfig::default();
        config.provider.api_url = "http://proxy:9000".into();
        let p = GeminiProvider::from_config(&config);
        assert_eq!(p.api_key, groupclaw_config::MISSING_API_KEY);
        assert!(p.generate_endpoint("m").starts_with("http://proxy:9000/"));
    }

    #[test]
    fn turns_map_to_gemini_roles() {
        let body = GeminiProvider::to_api_request(&request(vec![
            Turn::system("be terse"),
            Turn::model("Alice: sup"),
            Turn::user("what's up?"),
        ]));
        let roles: Vec<&str> = body.contents.iter().map(|c| c.role.as_str()).collect();
        assert_eq!(roles, vec!["model", "model", "user"]);
        assert_eq!(body.contents[1].parts[0].text, "Alice: sup");
        assert!(body.generation_config.is_none());
    }

    #[test]
    fn generation_config_serialized_when_set() {
        let mut req = request(vec![Turn::user("hi")]);
        req.temperature = Some(0.9);
        req.max_output_tokens = Some(256);
        let json = serde_json::to_value(GeminiProvider::to_api_request(&req)).unwrap();
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 256);
        assert!(json["generationConfig"]["temperature"].is_number());
    }

    #[test]
    fn completion_from_response() {
        let response: ApiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "hello "}, {"text": "there"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3, "totalTokenCount": 15},
            "modelVersion": "gemini-2.0-flash-lite-001"
        }))
        .unwrap();

        let completion = GeminiProvider::into_completion(response, "gemini-2.0-flash-lite").unwrap();
        assert_eq!(completion.text, "hello there");
        assert_eq!(completion.model, "gemini-2.0-flash-lite-001");
        assert_eq!(completion.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(completion.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn blocked_prompt_is_empty_completion() {
        let response: ApiResponse = serde_json::from_value(serde_json::json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();

        match GeminiProvider::into_completion(response, "m") {
            Err(ProviderError::EmptyCompletion(reason)) => assert_eq!(reason, "SAFETY"),
            other => panic!("Expected EmptyCompletion, got: {other:?}"),
        }
    }

    #[test]
    fn candidate_without_text_is_empty_completion() {
        let response: ApiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"finishReason": "MAX_TOKENS"}]
        }))
        .unwrap();
        assert!(matches!(
            GeminiProvider::into_completion(response, "m"),
            Err(ProviderError::EmptyCompletion(_))
        ));
    }

    #[test]
    fn error_classification() {
        let invalid_key = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            GeminiProvider::classify_error(400, invalid_key, "m"),
            ProviderError::AuthenticationFailed(_)
        ));

        assert!(matches!(
            GeminiProvider::classify_error(429, "", "m"),
            ProviderError::RateLimited { .. }
        ));

        assert!(matches!(
            GeminiProvider::classify_error(404, "", "gemini-0"),
            ProviderError::ModelNotFound(ref m) if m == "gemini-0"
        ));

        let overloaded = r#"{"error":{"code":503,"message":"The model is overloaded."}}"#;
        match GeminiProvider::classify_error(503, overloaded, "m") {
            ProviderError::ApiError {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 503);
                assert_eq!(message, "The model is overloaded.");
            }
            other => panic!("Expected ApiError, got: {other:?}"),
        }
    }
}
