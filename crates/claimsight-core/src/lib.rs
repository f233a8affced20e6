//! # claimsight-core
//!
//! Deterministic building blocks for multimodal claim adjudication.
//!
//! This crate owns everything about a case that does not need a model or
//! a network:
//! - the request data model ([`CaseRequest`], [`EvidenceRef`], [`TaskKey`])
//! - request validation, run before any dispatch
//! - consolidation of per-unit results into one [`ConsolidatedContext`]
//! - decoding of adjudicator text into structured data
//! - the [`CaseOutcome`] response artifact
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: consolidation and decoding are pure functions
//! 2. **No model calls**: fan-out and adjudication live in `claimsight-runtime`
//! 3. **Failures are data**: a failed unit is an entry, never a hole
//!
//! ## Example
//!
//! ```rust
//! use claimsight_core::{ResponseDecoder, DecodeCause};
//!
//! let decoder = ResponseDecoder::new();
//! let decision = decoder.decode("```json\n{\"fault\": \"A\"}\n```").unwrap();
//! assert_eq!(decision["fault"], "A");
//!
//! let err = decoder.decode("").unwrap_err();
//! assert_eq!(err.cause, DecodeCause::EmptyResponse);
//! ```

pub mod consolidator;
pub mod decoder;
pub mod errors;
pub mod outcome;
pub mod types;
pub mod validation;

pub use consolidator::{
    ConsolidatedContext, ContextConsolidator, EvidenceSlot, SlotEntry, NO_DATA_SENTINEL,
    TRANSCRIPT_SEPARATOR,
};
pub use decoder::{strip_code_fences, DecodeCause, DecodeError, DecodeStep, ResponseDecoder};
pub use errors::{InvocationError, ProcessingError};
pub use outcome::{
    AdjudicationResult, CaseOutcome, CaseStage, CaseStatus, ModelUsage, OutcomeReport,
    StageTimings,
};
pub use types::{
    CaseRequest, CaseShape, EvidenceRef, Modality, Payload, Ruleset, TaskKey, TaskResult,
};
pub use validation::{locator_scheme, validate_request, ValidationError, SUPPORTED_SCHEMES};
