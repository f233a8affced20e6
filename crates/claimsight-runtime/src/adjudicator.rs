//! The adjudication call: consolidated context plus ruleset in, raw text out.
//!
//! The adjudicator never decodes. Whatever text comes back, empty or not,
//! goes to the `ResponseDecoder` so decode failures stay soft.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use claimsight_core::{ConsolidatedContext, InvocationError, Ruleset};

use crate::config::ModelSettings;
use crate::prompts::PromptLibrary;
use crate::providers::{ChatMessage, LlmProvider, ProviderError, ResponseFormat, TokenUsage};

/// Raw adjudicator output.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAdjudication {
    pub text: String,
    pub usage: Option<TokenUsage>,
    pub model: Option<String>,
}

impl From<String> for RawAdjudication {
    fn from(text: String) -> Self {
        Self {
            text,
            usage: None,
            model: None,
        }
    }
}

impl From<&str> for RawAdjudication {
    fn from(text: &str) -> Self {
        Self::from(text.to_string())
    }
}

#[async_trait]
pub trait Adjudicator: Send + Sync {
    async fn adjudicate(
        &self,
        context: &ConsolidatedContext,
        ruleset: &Ruleset,
    ) -> Result<RawAdjudication, InvocationError>;
}

impl From<ProviderError> for InvocationError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Timeout(after) => InvocationError::Timeout { after },
            ProviderError::ApiError { status, message } => {
                InvocationError::Service { status, message }
            }
            ProviderError::RateLimited { .. } => InvocationError::Service {
                status: 429,
                message: err.to_string(),
            },
            ProviderError::AuthError => InvocationError::Service {
                status: 401,
                message: err.to_string(),
            },
            ProviderError::NotConfigured(message) => InvocationError::NotConfigured { message },
            ProviderError::HttpError(_) | ProviderError::ParseError(_) => {
                InvocationError::transport(err.to_string())
            }
        }
    }
}

/// Model-backed adjudicator. Always deterministic and JSON-constrained.
pub struct LlmAdjudicator {
    provider: Arc<dyn LlmProvider>,
    prompts: PromptLibrary,
    model: ModelSettings,
    timeout: Duration,
    labels: BTreeMap<String, String>,
}

impl LlmAdjudicator {
    pub fn new(provider: Arc<dyn LlmProvider>, prompts: PromptLibrary) -> Self {
        Self {
            provider,
            prompts,
            model: ModelSettings::new("gemini-2.5-pro"),
            timeout: Duration::from_secs(300),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, model: ModelSettings) -> Self {
        self.model = model;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }
}

#[async_trait]
impl Adjudicator for LlmAdjudicator {
    async fn adjudicate(
        &self,
        context: &ConsolidatedContext,
        ruleset: &Ruleset,
    ) -> Result<RawAdjudication, InvocationError> {
        let prompt = self.prompts.build_adjudication_prompt(ruleset, context);
        let mut config =
            self.model
                .completion_config(self.timeout, ResponseFormat::Json, &self.labels);
        config.temperature = 0.0;

        tracing::debug!(
            model = %config.model,
            prompt_chars = prompt.len(),
            ruleset = %ruleset.name,
            "Sending adjudication request"
        );

        let response = self
            .provider
            .complete(vec![ChatMessage::user(prompt)], &config)
            .await?;

        Ok(RawAdjudication {
            text: response.content,
            usage: Some(response.usage),
            model: Some(response.model),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionConfig, CompletionResponse};
    use claimsight_core::{CaseRequest, ContextConsolidator, EvidenceRef, Modality, Payload, TaskKey, TaskResult};
    use parking_lot::Mutex;

    struct ScriptedProvider {
        reply: Mutex<Option<Result<String, ProviderError>>>,
        seen: Mutex<Option<(String, CompletionConfig)>>,
    }

    impl ScriptedProvider {
        fn new(reply: Result<String, ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(reply)),
                seen: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            *self.seen.lock() = Some((messages[0].text(), config.clone()));
            let reply = self
                .reply
                .lock()
                .take()
                .unwrap_or_else(|| Err(ProviderError::HttpError("called twice".into())));
            reply.map(|content| CompletionResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: 900,
                    completion_tokens: 100,
                },
                model: config.model.clone(),
                stop_reason: None,
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn context() -> ConsolidatedContext {
        let request = CaseRequest::new().with_visual(EvidenceRef::uri("gs://b/p.jpg"));
        ContextConsolidator::new().consolidate(
            vec![(
                TaskKey::new(Modality::Visual, 0),
                TaskResult::success(Payload::text("side impact")),
            )],
            &request.shape(),
        )
    }

    #[tokio::test]
    async fn test_requests_deterministic_json() {
        let provider = ScriptedProvider::new(Ok("{\"decision\":\"A liable\"}".to_string()));
        let adjudicator = LlmAdjudicator::new(provider.clone(), PromptLibrary::default())
            .with_model(ModelSettings {
                temperature: 0.7,
                ..ModelSettings::new("gemini-2.5-pro")
            });

        let raw = adjudicator
            .adjudicate(&context(), &Ruleset::new("matrix", "R1"))
            .await
            .unwrap();

        assert_eq!(raw.text, "{\"decision\":\"A liable\"}");
        assert_eq!(raw.usage.unwrap().total(), 1000);

        let seen = provider.seen.lock();
        let (prompt, config) = seen.as_ref().unwrap();
        assert!(prompt.contains("side impact"));
        assert!(prompt.contains("R1"));
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.response_format, ResponseFormat::Json);
        assert_eq!(config.model, "gemini-2.5-pro");
    }

    #[tokio::test]
    async fn test_empty_text_is_not_an_invocation_error() {
        let adjudicator =
            LlmAdjudicator::new(ScriptedProvider::new(Ok(String::new())), PromptLibrary::default());
        let raw = adjudicator
            .adjudicate(&context(), &Ruleset::new("matrix", "R1"))
            .await
            .unwrap();
        assert!(raw.text.is_empty());
    }

    #[tokio::test]
    async fn test_provider_errors_become_invocation_errors() {
        let adjudicator = LlmAdjudicator::new(
            ScriptedProvider::new(Err(ProviderError::ApiError {
                status: 503,
                message: "overloaded".to_string(),
            })),
            PromptLibrary::default(),
        );
        let err = adjudicator
            .adjudicate(&context(), &Ruleset::new("matrix", "R1"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            InvocationError::Service {
                status: 503,
                message: "overloaded".to_string()
            }
        );
    }

    #[test]
    fn test_provider_error_mapping() {
        assert_eq!(
            InvocationError::from(ProviderError::Timeout(Duration::from_secs(3))),
            InvocationError::Timeout {
                after: Duration::from_secs(3)
            }
        );
        assert!(matches!(
            InvocationError::from(ProviderError::HttpError("reset".into())),
            InvocationError::Transport { .. }
        ));
        assert!(matches!(
            InvocationError::from(ProviderError::NotConfigured("no key".into())),
            InvocationError::NotConfigured { .. }
        ));
    }
}
