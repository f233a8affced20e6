//! Case orchestrator: validate, fan out, consolidate, adjudicate, decode.
//!
//! - Fan-out runs one unit per evidence item through [`FanOutExecutor`]
//! - Fan-in is the deterministic [`ContextConsolidator`]
//! - Per-modality circuit breaker and optional payload cache around units
//! - Exactly one adjudication call per case, then the fixed decode chain
//!
//! `submit` always returns a [`CaseOutcome`]; every failure is data.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use claimsight_core::{
    validate_request, AdjudicationResult, CaseOutcome, CaseRequest, ConsolidatedContext,
    ContextConsolidator, EvidenceRef, InvocationError, Modality, OutcomeReport, Payload, ProcessingError,
    ResponseDecoder, Ruleset, StageTimings, TaskKey,
};
use thiserror::Error;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::adjudicator::{Adjudicator, RawAdjudication};
use crate::cache::{CacheKey, ProcessingCache};
use crate::config::{ConfigError, RuntimeConfig};
use crate::fanout::FanOutExecutor;
use crate::processors::ModalityProcessor;
use crate::resilience::{CircuitBreaker, UsageTracker};

/// Errors building an orchestrator.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("no adjudicator configured")]
    MissingAdjudicator,

    #[error("no ruleset configured")]
    MissingRuleset,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Runs cases end to end. Cheap to share behind an `Arc`; cases submitted
/// concurrently do not share per-case state.
pub struct CaseOrchestrator {
    processors: BTreeMap<Modality, Arc<dyn ModalityProcessor>>,
    adjudicator: Arc<dyn Adjudicator>,
    ruleset: Arc<Ruleset>,
    config: RuntimeConfig,
    executor: FanOutExecutor,
    circuit_breaker: CircuitBreaker,
    cache: Option<ProcessingCache>,
    consolidator: ContextConsolidator,
    decoder: ResponseDecoder,
}

impl CaseOrchestrator {
    pub fn builder() -> CaseOrchestratorBuilder {
        CaseOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub fn cache(&self) -> Option<&ProcessingCache> {
        self.cache.as_ref()
    }

    /// Run one case to its outcome.
    pub async fn submit(&self, request: CaseRequest) -> CaseOutcome {
        let case_id = request
            .supplied_case_id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        let span = tracing::info_span!("case", case_id = %case_id);
        self.run_case(case_id, request).instrument(span).await
    }

    async fn run_case(&self, case_id: String, request: CaseRequest) -> CaseOutcome {
        let started = Instant::now();
        let mut timings = StageTimings::default();

        // Validating
        let shape = match validate_request(&request) {
            Ok(shape) => shape,
            Err(error) => {
                timings.validation = started.elapsed();
                timings.total = timings.validation;
                tracing::warn!(%error, "Case rejected");
                return CaseOutcome::rejected(
                    case_id,
                    error,
                    OutcomeReport {
                        timings,
                        ..OutcomeReport::default()
                    },
                );
            }
        };
        timings.validation = started.elapsed();
        let deadline = self.config.case_deadline.map(|limit| Instant::now() + limit);

        // Dispatching
        let usage = UsageTracker::new();
        let mut tasks = Vec::with_capacity(shape.total());
        for modality in Modality::ALL {
            for (ordinal, evidence) in request.evidence(modality).iter().enumerate() {
                let usage = &usage;
                tasks.push((TaskKey::new(modality, ordinal), move || {
                    self.process_unit(modality, evidence, usage)
                }));
            }
        }
        let dispatched_units = tasks.len();
        tracing::info!(
            units = dispatched_units,
            visual = shape.visual,
            audio = shape.audio,
            video = shape.video,
            "Dispatching units"
        );

        // AwaitingFanOut
        let fan_out_started = Instant::now();
        let results = self.executor.run_until(tasks, deadline).await;
        timings.fan_out = fan_out_started.elapsed();

        // Consolidating
        let consolidation_started = Instant::now();
        let context = self.consolidator.consolidate(results, &shape);
        timings.consolidation = consolidation_started.elapsed();
        let failed_units = context.failed_count();
        tracing::info!(
            failed_units,
            elapsed = ?timings.fan_out,
            "Fan-out settled"
        );

        // Adjudicating
        let adjudication_started = Instant::now();
        let invocation = self.invoke_adjudicator(&context, deadline).await;
        timings.adjudication = adjudication_started.elapsed();

        let raw = match invocation {
            Ok(raw) => raw,
            Err(error) => {
                timings.total = started.elapsed();
                tracing::error!(%error, "Adjudication failed");
                return CaseOutcome::failed(
                    case_id,
                    error,
                    context,
                    OutcomeReport {
                        timings,
                        dispatched_units,
                        failed_units,
                        usage: usage.snapshot(),
                    },
                );
            }
        };
        if let Some(call_usage) = &raw.usage {
            let model = raw
                .model
                .as_deref()
                .unwrap_or(&self.config.adjudication_model.model);
            usage.record(call_usage, model);
        }

        // Decoding
        let decode_started = Instant::now();
        let adjudication = match self.decoder.decode_with_step(&raw.text) {
            Ok((decision, step)) => {
                tracing::debug!(?step, "Adjudication decoded");
                AdjudicationResult::Decided { decision }
            }
            Err(error) => {
                tracing::warn!(cause = %error.cause, "Adjudication response did not decode");
                AdjudicationResult::Undecodable { error }
            }
        };
        timings.decode = decode_started.elapsed();
        timings.total = started.elapsed();

        tracing::info!(
            dispatched_units,
            failed_units,
            elapsed = ?timings.total,
            "Case completed"
        );

        CaseOutcome::completed(
            case_id,
            adjudication,
            context,
            OutcomeReport {
                timings,
                dispatched_units,
                failed_units,
                usage: usage.snapshot(),
            },
        )
    }

    async fn invoke_adjudicator(
        &self,
        context: &ConsolidatedContext,
        deadline: Option<Instant>,
    ) -> Result<RawAdjudication, InvocationError> {
        let limit = match deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(self.config.adjudication_timeout),
            None => self.config.adjudication_timeout,
        };
        if limit.is_zero() {
            return Err(InvocationError::Timeout {
                after: Duration::ZERO,
            });
        }

        match tokio::time::timeout(limit, self.adjudicator.adjudicate(context, &self.ruleset)).await
        {
            Ok(result) => result,
            Err(_) => Err(InvocationError::Timeout { after: limit }),
        }
    }

    async fn process_unit(
        &self,
        modality: Modality,
        evidence: &EvidenceRef,
        usage: &UsageTracker,
    ) -> Result<Payload, ProcessingError> {
        let processor = self
            .processors
            .get(&modality)
            .ok_or(ProcessingError::NoProcessor(modality))?;

        if self.circuit_breaker.is_open(modality) {
            return Err(ProcessingError::CircuitOpen(modality));
        }

        let cache_key = CacheKey::new(modality, evidence);
        if let Some(cache) = &self.cache {
            if let Some(payload) = cache.get(&cache_key).await {
                tracing::debug!(%modality, locator = %evidence.locator(), "Cache hit");
                return Ok(payload);
            }
        }

        // A unit cancelled by its timeout counts as a failure.
        let mut guard = BreakerGuard::new(&self.circuit_breaker, modality);
        let output = processor.process(evidence).await;
        guard.settle(output.is_ok());
        let output = output?;

        if let Some(call_usage) = &output.usage {
            let model = output
                .model
                .as_deref()
                .unwrap_or(&self.config.processing_model.model);
            usage.record(call_usage, model);
        }
        if let Some(cache) = &self.cache {
            cache.insert(cache_key, output.payload.clone()).await;
        }
        Ok(output.payload)
    }
}

/// Records exactly one breaker outcome for a unit, including when the
/// unit is dropped mid-flight.
struct BreakerGuard<'a> {
    breaker: &'a CircuitBreaker,
    modality: Modality,
    settled: bool,
}

impl<'a> BreakerGuard<'a> {
    fn new(breaker: &'a CircuitBreaker, modality: Modality) -> Self {
        Self {
            breaker,
            modality,
            settled: false,
        }
    }

    fn settle(&mut self, success: bool) {
        if success {
            self.breaker.record_success(self.modality);
        } else {
            self.breaker.record_failure(self.modality);
        }
        self.settled = true;
    }
}

impl Drop for BreakerGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record_failure(self.modality);
        }
    }
}

/// Builder for [`CaseOrchestrator`].
pub struct CaseOrchestratorBuilder {
    processors: BTreeMap<Modality, Arc<dyn ModalityProcessor>>,
    adjudicator: Option<Arc<dyn Adjudicator>>,
    ruleset: Option<Arc<Ruleset>>,
    config: RuntimeConfig,
    cache: Option<ProcessingCache>,
}

impl CaseOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            processors: BTreeMap::new(),
            adjudicator: None,
            ruleset: None,
            config: RuntimeConfig::default(),
            cache: None,
        }
    }

    /// Register a processor for its modality, replacing any previous one.
    pub fn processor(mut self, processor: Arc<dyn ModalityProcessor>) -> Self {
        self.processors.insert(processor.modality(), processor);
        self
    }

    pub fn processors(mut self, processors: impl IntoIterator<Item = Arc<dyn ModalityProcessor>>) -> Self {
        for processor in processors {
            self.processors.insert(processor.modality(), processor);
        }
        self
    }

    pub fn adjudicator(mut self, adjudicator: Arc<dyn Adjudicator>) -> Self {
        self.adjudicator = Some(adjudicator);
        self
    }

    pub fn ruleset(mut self, ruleset: Ruleset) -> Self {
        self.ruleset = Some(Arc::new(ruleset));
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this cache instead of one built from `config.cache`.
    pub fn cache(mut self, cache: ProcessingCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<CaseOrchestrator, RuntimeError> {
        self.config.validate()?;
        let adjudicator = self.adjudicator.ok_or(RuntimeError::MissingAdjudicator)?;
        let ruleset = self.ruleset.ok_or(RuntimeError::MissingRuleset)?;

        for modality in Modality::ALL {
            if !self.processors.contains_key(&modality) {
                tracing::warn!(%modality, "No processor registered; its units will fail");
            }
        }

        let cache = self
            .cache
            .or_else(|| ProcessingCache::from_config(&self.config.cache));

        Ok(CaseOrchestrator {
            processors: self.processors,
            adjudicator,
            ruleset,
            executor: FanOutExecutor::new(self.config.max_concurrency, self.config.unit_timeout),
            circuit_breaker: CircuitBreaker::new(self.config.circuit_breaker.clone()),
            cache,
            consolidator: ContextConsolidator::new(),
            decoder: ResponseDecoder::new(),
            config: self.config,
        })
    }
}

impl Default for CaseOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
