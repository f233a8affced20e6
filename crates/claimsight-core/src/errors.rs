//! Failure taxonomy shared across the orchestration boundary.
//!
//! [`ProcessingError`] never escapes the fan-out: it is folded into a
//! `TaskResult::Failure`. [`InvocationError`] is fatal to a case.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Modality;

/// A single modality unit failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessingError {
    #[error("failed to fetch evidence: {0}")]
    Fetch(String),

    #[error("model call failed: {0}")]
    Model(String),

    #[error("model returned no output")]
    EmptyOutput,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("case deadline exceeded")]
    DeadlineExceeded,

    #[error("circuit open for {0} processing")]
    CircuitOpen(Modality),

    #[error("no processor registered for {0} evidence")]
    NoProcessor(Modality),

    #[error("unsupported evidence: {0}")]
    Unsupported(String),

    #[error("external job failed: {0}")]
    Job(String),

    #[error("unit panicked: {0}")]
    Panicked(String),
}

/// The adjudication call produced no text at all.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvocationError {
    #[error("transport failure: {message}")]
    Transport { message: String },

    #[error("service error {status}: {message}")]
    Service { status: u16, message: String },

    #[error("adjudication timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("adjudication job failed: {message}")]
    Job { message: String },

    #[error("adjudicator not configured: {message}")]
    NotConfigured { message: String },
}

impl InvocationError {
    pub fn transport(message: impl Into<String>) -> Self {
        InvocationError::Transport {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_error_messages_name_the_modality() {
        let err = ProcessingError::CircuitOpen(Modality::Audio);
        assert_eq!(err.to_string(), "circuit open for audio processing");
    }

    #[test]
    fn test_invocation_error_is_tagged_on_the_wire() {
        let err = InvocationError::transport("connection reset");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "transport");
        assert_eq!(json["message"], "connection reset");
    }
}
