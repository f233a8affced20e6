//! Response decoding: adjudicator text into structured data.
//!
//! The repair chain is fixed and bounded. First match wins:
//! 1. strict parse of the raw text
//! 2. strict parse after stripping enclosing code fences
//! 3. parse of the first `{` .. last `}` span of the fence-stripped text
//!
//! A bare `null` is not a decision and falls through to the next step.
//! Anything else is a [`DecodeError`] that keeps the raw text verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

const FENCE: &str = "```";

/// Why a response could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DecodeCause {
    #[error("empty response")]
    EmptyResponse,

    #[error("no JSON object found in response")]
    NoObject,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),
}

/// Adjudicator text that did not decode, kept for manual review.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("could not decode adjudication response: {cause}")]
pub struct DecodeError {
    pub cause: DecodeCause,
    /// The response exactly as received.
    pub raw: String,
}

/// Which step of the chain produced the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeStep {
    Direct,
    FenceStripped,
    BraceScan,
}

/// Decodes adjudicator output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseDecoder;

impl ResponseDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode `raw` into a JSON value.
    pub fn decode(&self, raw: &str) -> Result<JsonValue, DecodeError> {
        self.decode_with_step(raw).map(|(value, _)| value)
    }

    /// Decode `raw` and report which repair step succeeded.
    pub fn decode_with_step(&self, raw: &str) -> Result<(JsonValue, DecodeStep), DecodeError> {
        if raw.trim().is_empty() {
            return Err(DecodeError {
                cause: DecodeCause::EmptyResponse,
                raw: raw.to_string(),
            });
        }

        if let Some(value) = parse_non_null(raw) {
            return Ok((value, DecodeStep::Direct));
        }

        let stripped = strip_code_fences(raw);
        if let Some(value) = parse_non_null(stripped) {
            return Ok((value, DecodeStep::FenceStripped));
        }

        let cause = match (stripped.find('{'), stripped.rfind('}')) {
            (Some(start), Some(end)) if end > start => {
                match serde_json::from_str(&stripped[start..=end]) {
                    Ok(value) => return Ok((value, DecodeStep::BraceScan)),
                    Err(e) => DecodeCause::InvalidJson(e.to_string()),
                }
            }
            _ => DecodeCause::NoObject,
        };

        Err(DecodeError {
            cause,
            raw: raw.to_string(),
        })
    }
}

fn parse_non_null(text: &str) -> Option<JsonValue> {
    serde_json::from_str(text).ok().filter(|value: &JsonValue| !value.is_null())
}

/// Remove an enclosing Markdown code fence.
///
/// The opening fence line (with any language tag) is dropped only when a
/// newline follows it; a trailing fence is dropped independently.
pub fn strip_code_fences(text: &str) -> &str {
    let mut text = text.trim();
    if text.starts_with(FENCE) {
        if let Some(newline) = text.find('\n') {
            text = text[newline + 1..].trim();
        }
    }
    if let Some(body) = text.strip_suffix(FENCE) {
        text = body.trim();
    }
    text
}
