//! Modality processors: one evidence item in, one payload out.
//!
//! The orchestrator only knows the [`ModalityProcessor`] trait. The
//! shipped implementation, [`LlmModalityProcessor`], fetches the evidence
//! bytes from a store and sends them with the modality prompt to a model.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use claimsight_core::{EvidenceRef, Modality, Payload, ProcessingError};

use crate::config::ModelSettings;
use crate::prompts::PromptLibrary;
use crate::providers::{ChatMessage, LlmProvider, MessagePart, ResponseFormat, TokenUsage};
use crate::store::EvidenceStore;

/// What a processor produced for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorOutput {
    pub payload: Payload,

    /// Set when a model call was made
    pub usage: Option<TokenUsage>,

    /// Model that produced the payload
    pub model: Option<String>,
}

impl From<Payload> for ProcessorOutput {
    fn from(payload: Payload) -> Self {
        Self {
            payload,
            usage: None,
            model: None,
        }
    }
}

/// Turns one evidence item of a modality into a payload.
///
/// Implementations must not share mutable per-case state: units of the
/// same case run concurrently against the same processor.
#[async_trait]
pub trait ModalityProcessor: Send + Sync {
    fn modality(&self) -> Modality;

    async fn process(&self, evidence: &EvidenceRef) -> Result<ProcessorOutput, ProcessingError>;
}

/// Model-backed processor.
pub struct LlmModalityProcessor {
    modality: Modality,
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn EvidenceStore>,
    prompt: String,
    model: ModelSettings,
    timeout: Duration,
    labels: BTreeMap<String, String>,
}

impl LlmModalityProcessor {
    pub fn new(
        modality: Modality,
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn EvidenceStore>,
        prompts: &PromptLibrary,
    ) -> Self {
        Self {
            modality,
            provider,
            store,
            prompt: prompts.for_modality(modality).to_string(),
            model: ModelSettings::default(),
            timeout: Duration::from_secs(120),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, model: ModelSettings) -> Self {
        self.model = model;
        self
    }

    /// Provider-side request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// One processor per modality, sharing provider and store.
    pub fn for_all_modalities(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn EvidenceStore>,
        prompts: &PromptLibrary,
        model: &ModelSettings,
        timeout: Duration,
        labels: &BTreeMap<String, String>,
    ) -> Vec<Arc<dyn ModalityProcessor>> {
        Modality::ALL
            .iter()
            .map(|&modality| {
                Arc::new(
                    Self::new(modality, provider.clone(), store.clone(), prompts)
                        .with_model(model.clone())
                        .with_timeout(timeout)
                        .with_labels(labels.clone()),
                ) as Arc<dyn ModalityProcessor>
            })
            .collect()
    }
}

#[async_trait]
impl ModalityProcessor for LlmModalityProcessor {
    fn modality(&self) -> Modality {
        self.modality
    }

    async fn process(&self, evidence: &EvidenceRef) -> Result<ProcessorOutput, ProcessingError> {
        let data = self
            .store
            .fetch(evidence)
            .await
            .map_err(|e| ProcessingError::Fetch(e.to_string()))?;
        if data.is_empty() {
            return Err(ProcessingError::Fetch(format!(
                "{} is empty",
                evidence.locator()
            )));
        }

        let mime_type = evidence.resolve_media_type(self.modality);
        tracing::debug!(
            modality = %self.modality,
            locator = %evidence.locator(),
            %mime_type,
            bytes = data.len(),
            "Sending evidence to model"
        );

        let message = ChatMessage::user_parts(vec![
            MessagePart::Text(self.prompt.clone()),
            MessagePart::Media { mime_type, data },
        ]);
        let config = self
            .model
            .completion_config(self.timeout, ResponseFormat::Text, &self.labels);

        let response = self
            .provider
            .complete(vec![message], &config)
            .await
            .map_err(|e| ProcessingError::Model(e.to_string()))?;

        if response.content.trim().is_empty() {
            return Err(ProcessingError::EmptyOutput);
        }

        Ok(ProcessorOutput {
            payload: Payload::Text(response.content),
            usage: Some(response.usage),
            model: Some(response.model),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionConfig, CompletionResponse, ProviderError};
    use crate::store::InlineStore;
    use parking_lot::Mutex;

    /// Records the messages it was sent and replies with canned text.
    struct RecordingProvider {
        reply: Result<String, u16>,
        seen: Mutex<Vec<(Vec<ChatMessage>, CompletionConfig)>>,
    }

    impl RecordingProvider {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(status),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.seen.lock().push((messages, config.clone()));
            match &self.reply {
                Ok(text) => Ok(CompletionResponse {
                    content: text.clone(),
                    usage: TokenUsage {
                        prompt_tokens: 10,
                        completion_tokens: 5,
                    },
                    model: config.model.clone(),
                    stop_reason: Some("STOP".to_string()),
                }),
                Err(status) => Err(ProviderError::ApiError {
                    status: *status,
                    message: "boom".to_string(),
                }),
            }
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_sends_prompt_and_media() {
        let provider = RecordingProvider::replying("Front bumper dented.");
        let processor = LlmModalityProcessor::new(
            Modality::Visual,
            provider.clone(),
            Arc::new(InlineStore),
            &PromptLibrary::default(),
        )
        .with_labels(BTreeMap::from([("team".to_string(), "claims".to_string())]));

        let output = processor
            .process(&EvidenceRef::inline(b"%PDF-1.7".to_vec(), "application/pdf"))
            .await
            .unwrap();

        assert_eq!(output.payload, Payload::text("Front bumper dented."));
        assert_eq!(output.usage.unwrap().total(), 15);

        let seen = provider.seen.lock();
        let (messages, config) = &seen[0];
        assert_eq!(messages.len(), 1);
        assert!(messages[0].text().contains("road signs"));
        assert_eq!(
            messages[0].parts[1],
            MessagePart::Media {
                mime_type: "application/pdf".to_string(),
                data: b"%PDF-1.7".to_vec()
            }
        );
        assert_eq!(config.response_format, ResponseFormat::Text);
        assert_eq!(config.labels["team"], "claims");
    }

    #[tokio::test]
    async fn test_blank_model_output_is_an_error() {
        let processor = LlmModalityProcessor::new(
            Modality::Audio,
            RecordingProvider::replying("   "),
            Arc::new(InlineStore),
            &PromptLibrary::default(),
        );
        let err = processor
            .process(&EvidenceRef::inline(b"RIFF".to_vec(), "audio/wav"))
            .await
            .unwrap_err();
        assert_eq!(err, ProcessingError::EmptyOutput);
    }

    #[tokio::test]
    async fn test_provider_failure_maps_to_model_error() {
        let processor = LlmModalityProcessor::new(
            Modality::Video,
            RecordingProvider::failing(500),
            Arc::new(InlineStore),
            &PromptLibrary::default(),
        );
        let err = processor
            .process(&EvidenceRef::inline(b"mp4".to_vec(), "video/mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Model(msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_model_call() {
        let provider = RecordingProvider::replying("unused");
        let processor = LlmModalityProcessor::new(
            Modality::Visual,
            provider.clone(),
            Arc::new(InlineStore),
            &PromptLibrary::default(),
        );
        let err = processor
            .process(&EvidenceRef::uri("gs://claims/photo.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Fetch(_)));
        assert!(provider.seen.lock().is_empty());
    }

    #[test]
    fn test_one_processor_per_modality() {
        let processors = LlmModalityProcessor::for_all_modalities(
            RecordingProvider::replying("x"),
            Arc::new(InlineStore),
            &PromptLibrary::default(),
            &ModelSettings::default(),
            Duration::from_secs(30),
            &BTreeMap::new(),
        );
        let modalities: Vec<_> = processors.iter().map(|p| p.modality()).collect();
        assert_eq!(modalities, Modality::ALL.to_vec());
    }
}
