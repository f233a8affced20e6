use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use claimsight_core::{
    ConsolidatedContext, EvidenceRef, InvocationError, Modality, Payload, ProcessingError, Ruleset,
};

use super::{JobBackend, JobKind, JobPoller, JobSpec};
use crate::adjudicator::{Adjudicator, RawAdjudication};
use crate::processors::{ModalityProcessor, ProcessorOutput};

/// Runs one modality analysis as an external job.
///
/// Job arguments: `uri` or base64 `data`, plus `media_type`.
pub struct JobProcessor {
    modality: Modality,
    backend: Arc<dyn JobBackend>,
    poller: JobPoller,
}

impl JobProcessor {
    pub fn new(modality: Modality, backend: Arc<dyn JobBackend>, poller: JobPoller) -> Self {
        Self {
            modality,
            backend,
            poller,
        }
    }

    /// One job processor per modality, sharing `backend`.
    pub fn for_all_modalities(
        backend: Arc<dyn JobBackend>,
        poller: JobPoller,
    ) -> Vec<Arc<dyn ModalityProcessor>> {
        Modality::ALL
            .iter()
            .map(|&modality| {
                Arc::new(Self::new(modality, backend.clone(), poller)) as Arc<dyn ModalityProcessor>
            })
            .collect()
    }

    fn spec_for(&self, evidence: &EvidenceRef) -> JobSpec {
        let spec = JobSpec::new(JobKind::Modality(self.modality))
            .arg("media_type", evidence.resolve_media_type(self.modality));
        match evidence {
            EvidenceRef::Uri { uri, .. } => spec.arg("uri", uri.clone()),
            EvidenceRef::Inline { data, .. } => spec.arg("data", STANDARD.encode(data)),
        }
    }
}

#[async_trait]
impl ModalityProcessor for JobProcessor {
    fn modality(&self) -> Modality {
        self.modality
    }

    async fn process(&self, evidence: &EvidenceRef) -> Result<ProcessorOutput, ProcessingError> {
        let output = self
            .poller
            .run(self.backend.as_ref(), self.spec_for(evidence))
            .await
            .map_err(|e| ProcessingError::Job(e.to_string()))?;

        if output.trim().is_empty() {
            return Err(ProcessingError::EmptyOutput);
        }
        Ok(Payload::Text(output).into())
    }
}

/// Runs adjudication as an external job.
///
/// Job arguments: `ruleset_name`, `ruleset`, `visual` (JSON) and `transcript`.
pub struct JobAdjudicator {
    backend: Arc<dyn JobBackend>,
    poller: JobPoller,
}

impl JobAdjudicator {
    pub fn new(backend: Arc<dyn JobBackend>, poller: JobPoller) -> Self {
        Self { backend, poller }
    }
}

#[async_trait]
impl Adjudicator for JobAdjudicator {
    async fn adjudicate(
        &self,
        context: &ConsolidatedContext,
        ruleset: &Ruleset,
    ) -> Result<RawAdjudication, InvocationError> {
        let spec = JobSpec::new(JobKind::Adjudication)
            .arg("ruleset_name", ruleset.name.clone())
            .arg("ruleset", ruleset.content.clone())
            .arg("visual", context.visual_json().to_string())
            .arg("transcript", context.transcript_text());

        let output = self
            .poller
            .run(self.backend.as_ref(), spec)
            .await
            .map_err(|e| InvocationError::Job {
                message: e.to_string(),
            })?;

        Ok(RawAdjudication::from(output))
    }
}
