//! Request validation, run before anything is dispatched.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CaseRequest, CaseShape, EvidenceRef, Modality, TaskKey};

lazy_static! {
    /// `scheme://` prefix of a locator.
    static ref SCHEME_PATTERN: Regex = Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*)://").unwrap();
}

/// Locator schemes the evidence stores understand. Bare paths carry no scheme.
pub const SUPPORTED_SCHEMES: &[&str] = &["gs", "http", "https", "file"];

/// A request was rejected before dispatch.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("case contains no evidence in any modality")]
    NoEvidence,

    #[error("{key}: evidence locator is empty")]
    EmptyLocator { key: TaskKey },

    #[error("{key}: unsupported locator scheme '{scheme}'")]
    UnsupportedScheme { key: TaskKey, scheme: String },

    #[error("{key}: inline evidence payload is empty")]
    EmptyPayload { key: TaskKey },

    #[error("{key}: media type is empty")]
    EmptyMediaType { key: TaskKey },
}

/// Check a request and return its shape.
pub fn validate_request(request: &CaseRequest) -> Result<CaseShape, ValidationError> {
    if request.total_evidence() == 0 {
        return Err(ValidationError::NoEvidence);
    }

    for modality in Modality::ALL {
        for (ordinal, evidence) in request.evidence(modality).iter().enumerate() {
            validate_evidence(TaskKey::new(modality, ordinal), evidence)?;
        }
    }

    Ok(request.shape())
}

fn validate_evidence(key: TaskKey, evidence: &EvidenceRef) -> Result<(), ValidationError> {
    match evidence {
        EvidenceRef::Uri { uri, media_type } => {
            if uri.trim().is_empty() {
                return Err(ValidationError::EmptyLocator { key });
            }
            if let Some(scheme) = locator_scheme(uri) {
                if !SUPPORTED_SCHEMES.contains(&scheme.as_str()) {
                    return Err(ValidationError::UnsupportedScheme { key, scheme });
                }
            }
            if matches!(media_type, Some(m) if m.trim().is_empty()) {
                return Err(ValidationError::EmptyMediaType { key });
            }
        }
        EvidenceRef::Inline { data, media_type } => {
            if data.is_empty() {
                return Err(ValidationError::EmptyPayload { key });
            }
            if media_type.trim().is_empty() {
                return Err(ValidationError::EmptyMediaType { key });
            }
        }
    }
    Ok(())
}

/// Lowercased scheme of a locator, or `None` for a bare path.
pub fn locator_scheme(locator: &str) -> Option<String> {
    SCHEME_PATTERN
        .captures(locator.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_request_rejected() {
        let result = validate_request(&CaseRequest::new().with_case_id("C1"));
        assert_eq!(result, Err(ValidationError::NoEvidence));
    }

    #[test]
    fn test_valid_request_returns_shape() {
        let request = CaseRequest::new()
            .with_visual(EvidenceRef::uri("gs://bucket/evidence.pdf"))
            .with_audio(EvidenceRef::uri("/var/claims/call.mp3"))
            .with_audio(EvidenceRef::uri("https://cdn.example.com/a.mp3"));

        let shape = validate_request(&request).unwrap();
        assert_eq!(shape.visual, 1);
        assert_eq!(shape.audio, 2);
        assert_eq!(shape.video, 0);
    }

    #[test]
    fn test_unsupported_scheme_names_the_key() {
        let request = CaseRequest::new()
            .with_video(EvidenceRef::uri("gs://bucket/ok.mp4"))
            .with_video(EvidenceRef::uri("ftp://host/clip.mp4"));

        let err = validate_request(&request).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedScheme {
                key: TaskKey::new(Modality::Video, 1),
                scheme: "ftp".to_string(),
            }
        );
        assert_eq!(err.to_string(), "video#1: unsupported locator scheme 'ftp'");
    }

    #[test]
    fn test_blank_locator_and_empty_payload_rejected() {
        let request = CaseRequest::new().with_visual(EvidenceRef::uri("  "));
        assert!(matches!(
            validate_request(&request),
            Err(ValidationError::EmptyLocator { .. })
        ));

        let request = CaseRequest::new().with_audio(EvidenceRef::inline(Vec::new(), "audio/wav"));
        assert!(matches!(
            validate_request(&request),
            Err(ValidationError::EmptyPayload { .. })
        ));
    }

    #[test]
    fn test_locator_scheme() {
        assert_eq!(locator_scheme("GS://bucket/x"), Some("gs".to_string()));
        assert_eq!(locator_scheme("relative/path.jpg"), None);
        assert_eq!(locator_scheme("C:\\evidence\\x.jpg"), None);
    }
}
