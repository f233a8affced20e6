//! # claimsight-runtime
//!
//! Concurrent evidence processing and model-backed adjudication.
//!
//! `claimsight-core` decides what a case looks like and how results are
//! merged and decoded. This crate does the I/O around it:
//! - fetching evidence bytes ([`store`])
//! - one model call per evidence item, fanned out with a concurrency cap
//!   and per-unit timeout ([`fanout`], [`processors`])
//! - a single adjudication call per case ([`adjudicator`])
//! - circuit breaking, retry and usage accounting around model calls
//!
//! Model access goes through [`providers::LlmProvider`]. The Gemini
//! backend is behind the `gemini` feature; HTTP and GCS evidence
//! download is behind `http-store`; the HTTP job service client is behind
//! `http-jobs`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use claimsight_core::{CaseRequest, EvidenceRef, Ruleset};
//! use claimsight_runtime::prelude::*;
//!
//! let provider: Arc<dyn LlmProvider> = Arc::new(GeminiProvider::from_env()?);
//! let store: Arc<dyn EvidenceStore> = Arc::new(CompositeStore::with_defaults());
//! let prompts = PromptLibrary::default();
//! let config = RuntimeConfig::default();
//!
//! let orchestrator = CaseOrchestrator::builder()
//!     .processors(LlmModalityProcessor::for_all_modalities(
//!         provider.clone(),
//!         store,
//!         &prompts,
//!         &config.processing_model,
//!         config.unit_timeout,
//!         &config.labels,
//!     ))
//!     .adjudicator(Arc::new(LlmAdjudicator::new(provider, prompts)))
//!     .ruleset(Ruleset::from_file("rules/circumstances.md")?)
//!     .config(config)
//!     .build()?;
//!
//! let outcome = orchestrator
//!     .submit(CaseRequest::new().with_visual(EvidenceRef::uri("gs://claims/front.jpg")))
//!     .await;
//! ```

pub mod adjudicator;
pub mod cache;
pub mod config;
pub mod fanout;
pub mod jobs;
pub mod orchestrator;
pub mod processors;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod store;

pub use adjudicator::{Adjudicator, LlmAdjudicator, RawAdjudication};
pub use cache::{CacheConfig, ProcessingCache};
pub use config::{ConfigError, ModelSettings, ProviderSettings, RuntimeConfig};
pub use fanout::FanOutExecutor;
pub use orchestrator::{CaseOrchestrator, CaseOrchestratorBuilder, RuntimeError};
pub use processors::{LlmModalityProcessor, ModalityProcessor, ProcessorOutput};
pub use prompts::PromptLibrary;
pub use store::{CompositeStore, EvidenceStore, StoreError};

/// Everything needed to assemble an orchestrator.
pub mod prelude {
    pub use crate::adjudicator::{Adjudicator, LlmAdjudicator};
    pub use crate::config::RuntimeConfig;
    #[cfg(feature = "http-jobs")]
    pub use crate::jobs::HttpJobBackend;
    pub use crate::jobs::{JobAdjudicator, JobBackend, JobPoller, JobProcessor};
    pub use crate::orchestrator::CaseOrchestrator;
    pub use crate::processors::{LlmModalityProcessor, ModalityProcessor};
    pub use crate::prompts::PromptLibrary;
    #[cfg(feature = "gemini")]
    pub use crate::providers::GeminiProvider;
    pub use crate::providers::{LlmProvider, ProviderRegistry, RetryingProvider};
    pub use crate::store::{CompositeStore, EvidenceStore};
}
