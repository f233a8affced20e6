//! Case outcome: the single response artifact of one orchestration.
//!
//! Three caller-visible outcomes are kept distinct:
//! - `Rejected`: the request was invalid, nothing was dispatched
//! - `Failed`: the adjudicator produced no text
//! - `Completed` with `Undecodable`: text came back but did not parse

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::consolidator::ConsolidatedContext;
use crate::decoder::DecodeError;
use crate::errors::InvocationError;
use crate::validation::ValidationError;

/// Orchestration stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStage {
    Validating,
    Dispatching,
    AwaitingFanOut,
    Consolidating,
    Adjudicating,
    Decoding,
    Completed,
}

/// Result of the adjudication step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdjudicationResult {
    Decided { decision: JsonValue },
    Undecodable { error: DecodeError },
}

/// Terminal status of a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CaseStatus {
    Completed { adjudication: AdjudicationResult },
    Rejected { error: ValidationError },
    Failed { error: InvocationError },
}

/// Elapsed time per stage. Stages never reached stay at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    #[serde(with = "secs_f64")]
    pub validation: Duration,
    #[serde(with = "secs_f64")]
    pub fan_out: Duration,
    #[serde(with = "secs_f64")]
    pub consolidation: Duration,
    #[serde(with = "secs_f64")]
    pub adjudication: Duration,
    #[serde(with = "secs_f64")]
    pub decode: Duration,
    #[serde(with = "secs_f64")]
    pub total: Duration,
}

mod secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Model token usage accumulated over one case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub model_calls: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub estimated_cost_usd: f64,
}

/// Bookkeeping that accompanies every outcome.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutcomeReport {
    pub timings: StageTimings,
    pub dispatched_units: usize,
    pub failed_units: usize,
    pub usage: ModelUsage,
}

/// Final response for one submitted case. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseOutcome {
    ok: bool,
    case_id: String,
    stage: CaseStage,
    status: CaseStatus,
    timings: StageTimings,
    dispatched_units: usize,
    failed_units: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<ConsolidatedContext>,
    usage: ModelUsage,
    completed_at: DateTime<Utc>,
}

impl CaseOutcome {
    /// Adjudication produced text; decoding may still have failed.
    pub fn completed(
        case_id: impl Into<String>,
        adjudication: AdjudicationResult,
        context: ConsolidatedContext,
        report: OutcomeReport,
    ) -> Self {
        Self::build(
            true,
            case_id.into(),
            CaseStage::Completed,
            CaseStatus::Completed { adjudication },
            Some(context),
            report,
        )
    }

    /// The request was rejected before dispatch.
    pub fn rejected(
        case_id: impl Into<String>,
        error: ValidationError,
        report: OutcomeReport,
    ) -> Self {
        Self::build(
            false,
            case_id.into(),
            CaseStage::Validating,
            CaseStatus::Rejected { error },
            None,
            report,
        )
    }

    /// The adjudication call itself failed.
    pub fn failed(
        case_id: impl Into<String>,
        error: InvocationError,
        context: ConsolidatedContext,
        report: OutcomeReport,
    ) -> Self {
        Self::build(
            false,
            case_id.into(),
            CaseStage::Adjudicating,
            CaseStatus::Failed { error },
            Some(context),
            report,
        )
    }

    fn build(
        ok: bool,
        case_id: String,
        stage: CaseStage,
        status: CaseStatus,
        context: Option<ConsolidatedContext>,
        report: OutcomeReport,
    ) -> Self {
        Self {
            ok,
            case_id,
            stage,
            status,
            timings: report.timings,
            dispatched_units: report.dispatched_units,
            failed_units: report.failed_units,
            context,
            usage: report.usage,
            completed_at: Utc::now(),
        }
    }

    /// True when the case completed, even if the decision did not decode.
    pub fn ok(&self) -> bool {
        self.ok
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    /// Stage the case ended in.
    pub fn stage(&self) -> CaseStage {
        self.stage
    }

    pub fn status(&self) -> &CaseStatus {
        &self.status
    }

    pub fn timings(&self) -> &StageTimings {
        &self.timings
    }

    pub fn dispatched_units(&self) -> usize {
        self.dispatched_units
    }

    pub fn failed_units(&self) -> usize {
        self.failed_units
    }

    pub fn context(&self) -> Option<&ConsolidatedContext> {
        self.context.as_ref()
    }

    pub fn usage(&self) -> &ModelUsage {
        &self.usage
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Structured decision, when one exists.
    pub fn decision(&self) -> Option<&JsonValue> {
        match &self.status {
            CaseStatus::Completed {
                adjudication: AdjudicationResult::Decided { decision },
            } => Some(decision),
            _ => None,
        }
    }

    /// Decode failure of a soft-completed case.
    pub fn decode_error(&self) -> Option<&DecodeError> {
        match &self.status {
            CaseStatus::Completed {
                adjudication: AdjudicationResult::Undecodable { error },
            } => Some(error),
            _ => None,
        }
    }

    /// Raw adjudicator text kept for manual review.
    pub fn raw_response(&self) -> Option<&str> {
        self.decode_error().map(|e| e.raw.as_str())
    }

    pub fn validation_error(&self) -> Option<&ValidationError> {
        match &self.status {
            CaseStatus::Rejected { error } => Some(error),
            _ => None,
        }
    }

    pub fn invocation_error(&self) -> Option<&InvocationError> {
        match &self.status {
            CaseStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}
