//! Gemini `generateContent` provider.
//!
//! Media parts travel inline as base64 `inlineData`. The API key goes in
//! the `x-goog-api-key` header and never appears in the URL.
//!
//! Request labels are only accepted by Vertex AI. They are sent when the
//! base URL is an `aiplatform.googleapis.com` endpoint or the `vertex`
//! option is set, and left out of the body otherwise.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource},
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, MessagePart, ProviderError,
    ResponseFormat, TokenUsage,
};

/// Environment variable holding the Gemini API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const VERTEX_HOST_SUFFIX: &str = "aiplatform.googleapis.com";

/// Google Gemini provider.
pub struct GeminiProvider {
    credential: ApiCredential,
    base_url: String,
    vertex: bool,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("vertex", &self.vertex)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_credential(ApiCredential::new(
            api_key,
            CredentialSource::Programmatic,
            "Gemini API key",
        ))
    }

    /// Create from `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_env(GEMINI_API_KEY_ENV, "Gemini API key")?;
        Ok(Self::with_credential(credential))
    }

    /// Create from JSON configuration, falling back to the environment for the key.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            GEMINI_API_KEY_ENV,
            "Gemini API key",
        )?;
        let mut provider = Self::with_credential(credential);
        if let Some(url) = config["base_url"].as_str() {
            provider = provider.with_base_url(url.trim_end_matches('/'));
        }
        if config["vertex"].as_bool() == Some(true) {
            provider.vertex = true;
        }
        Ok(provider)
    }

    fn with_credential(credential: ApiCredential) -> Self {
        Self {
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
            vertex: false,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self.vertex = is_vertex_url(&self.base_url);
        self
    }

    /// Whether requests carry labels.
    pub fn is_vertex(&self) -> bool {
        self.vertex
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Inline {
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

fn to_parts(parts: Vec<MessagePart>) -> Vec<Part> {
    parts
        .into_iter()
        .map(|part| match part {
            MessagePart::Text(text) => Part::Text { text },
            MessagePart::Media { mime_type, data } => Part::Inline {
                inline_data: InlineData {
                    mime_type,
                    data: STANDARD.encode(data),
                },
            },
        })
        .collect()
}

fn is_vertex_url(url: &str) -> bool {
    let host = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest)
        .split(['/', ':'])
        .next()
        .unwrap_or_default();
    host == VERTEX_HOST_SUFFIX || host.ends_with(&format!("-{}", VERTEX_HOST_SUFFIX))
}

fn build_request(
    messages: Vec<ChatMessage>,
    config: &CompletionConfig,
    with_labels: bool,
) -> GenerateRequest {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for msg in messages {
        match msg.role.as_str() {
            "system" => system_parts.extend(to_parts(msg.parts)),
            "assistant" => contents.push(Content {
                role: Some("model".to_string()),
                parts: to_parts(msg.parts),
            }),
            _ => contents.push(Content {
                role: Some("user".to_string()),
                parts: to_parts(msg.parts),
            }),
        }
    }

    GenerateRequest {
        contents,
        system_instruction: (!system_parts.is_empty()).then_some(Content {
            role: None,
            parts: system_parts,
        }),
        generation_config: GenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_tokens,
            response_mime_type: match config.response_format {
                ResponseFormat::Json => Some("application/json"),
                ResponseFormat::Text => None,
            },
        },
        labels: if with_labels {
            config.labels.clone()
        } else {
            BTreeMap::new()
        },
    }
}

fn parse_response(body: GenerateResponse, requested_model: &str) -> CompletionResponse {
    let mut stop_reason = None;
    let mut content = String::new();

    if let Some(candidate) = body.candidates.into_iter().next() {
        stop_reason = candidate.finish_reason;
        if let Some(candidate_content) = candidate.content {
            for part in candidate_content.parts {
                if let Some(text) = part.text {
                    content.push_str(&text);
                }
            }
        }
    }

    let usage = body
        .usage_metadata
        .map(|meta| TokenUsage {
            prompt_tokens: meta.prompt_token_count,
            completion_tokens: meta.candidates_token_count,
        })
        .unwrap_or_default();

    CompletionResponse {
        content,
        usage,
        model: body
            .model_version
            .unwrap_or_else(|| requested_model.to_string()),
        stop_reason,
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = build_request(messages, config, self.vertex);

        tracing::debug!(
            model = %config.model,
            contents = request.contents.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(self.endpoint(&config.model))
            .header("x-goog-api-key", self.credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<GeminiError>(&text) {
                Ok(err) => match err.error.status {
                    Some(code) => format!("{}: {}", code, err.error.message),
                    None => err.error.message,
                },
                Err(_) => text,
            };
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(parse_response(body, &config.model))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Factory for Gemini providers.
///
/// ```json
/// {
///   "api_key": "AIza...",      // optional, falls back to GEMINI_API_KEY
///   "base_url": "https://...", // optional
///   "vertex": true             // optional, sends request labels
/// }
/// ```
pub struct GeminiProviderFactory;

impl ProviderFactory for GeminiProviderFactory {
    fn kind(&self) -> &'static str {
        "gemini"
    }

    fn check(&self, options: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(options, "api_key", GEMINI_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "Gemini API key missing: set 'api_key' in provider options or {}",
                GEMINI_API_KEY_ENV
            )));
        }
        if let Some(url) = options.get("base_url").and_then(JsonValue::as_str) {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(format!(
                    "base_url '{}' is not an http(s) URL",
                    url
                )));
            }
        }
        Ok(())
    }

    fn build(&self, options: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(GeminiProvider::from_config(options)?))
    }
}
