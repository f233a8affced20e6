//! Building a provider from `ProviderSettings` by kind.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{LlmProvider, ProviderError};
use crate::config::ProviderSettings;

/// Knows how to build one kind of provider from its options.
pub trait ProviderFactory: Send + Sync {
    /// The `provider.kind` this factory answers to.
    fn kind(&self) -> &'static str;

    /// Reject unusable options before anything is built.
    fn check(&self, _options: &JsonValue) -> Result<(), ProviderError> {
        Ok(())
    }

    fn build(&self, options: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;
}

/// Factories by kind.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<&'static str, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every backend compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "gemini")]
        registry.register(Arc::new(super::GeminiProviderFactory));
        registry
    }

    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(factory.kind(), factory);
    }

    pub fn supports(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    pub fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let factory = self.factories.get(settings.kind.as_str()).ok_or_else(|| {
            let known: Vec<_> = self.kinds().collect();
            ProviderError::NotConfigured(format!(
                "no provider of kind '{}' in this build (known: {})",
                settings.kind,
                if known.is_empty() { "none".to_string() } else { known.join(", ") }
            ))
        })?;
        factory.check(&settings.options)?;
        let provider = factory.build(&settings.options)?;
        tracing::debug!(kind = %settings.kind, provider = provider.name(), "Provider created");
        Ok(provider)
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatMessage, CompletionConfig, CompletionResponse, TokenUsage};
    use async_trait::async_trait;
    use serde_json::json;

    struct Canned(String);

    #[async_trait]
    impl LlmProvider for Canned {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                content: "{}".to_string(),
                usage: TokenUsage::default(),
                model: config.model.clone(),
                stop_reason: None,
            })
        }

        fn name(&self) -> &str {
            &self.0
        }
    }

    /// Requires a non-empty `region` option.
    struct RegionalFactory;

    impl ProviderFactory for RegionalFactory {
        fn kind(&self) -> &'static str {
            "regional"
        }

        fn check(&self, options: &JsonValue) -> Result<(), ProviderError> {
            match options.get("region").and_then(JsonValue::as_str) {
                Some(region) if !region.is_empty() => Ok(()),
                _ => Err(ProviderError::NotConfigured("region is required".into())),
            }
        }

        fn build(&self, options: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
            let region = options["region"].as_str().unwrap_or_default();
            Ok(Arc::new(Canned(format!("regional-{}", region))))
        }
    }

    fn settings(kind: &str, options: JsonValue) -> ProviderSettings {
        ProviderSettings {
            kind: kind.to_string(),
            options,
        }
    }

    #[test]
    fn test_creates_registered_kind() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(RegionalFactory));

        assert!(registry.supports("regional"));
        let provider = registry
            .create(&settings("regional", json!({ "region": "europe-west1" })))
            .unwrap();
        assert_eq!(provider.name(), "regional-europe-west1");
    }

    #[test]
    fn test_check_runs_before_build() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(RegionalFactory));

        let err = registry.create(&settings("regional", json!({}))).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(msg) if msg.contains("region")));
    }

    #[test]
    fn test_unknown_kind_lists_known_ones() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(RegionalFactory));

        let err = registry.create(&settings("vertex", json!({}))).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(msg) if msg.contains("'vertex'") && msg.contains("regional")));
        assert_eq!(format!("{:?}", registry), "[\"regional\"]");
    }
}
