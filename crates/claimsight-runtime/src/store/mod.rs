//! Evidence storage: turning an [`EvidenceRef`] into bytes.
//!
//! Processors never read storage directly; they go through an
//! [`EvidenceStore`]. [`CompositeStore`] picks a backend by locator:
//! inline payloads, the local filesystem, or HTTP(S) including `gs://`
//! objects served from the public storage endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use claimsight_core::{locator_scheme, EvidenceRef};
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

mod local;
#[cfg(feature = "http-store")]
mod http;

pub use local::LocalStore;
#[cfg(feature = "http-store")]
pub use http::{HttpStore, GCS_ACCESS_TOKEN_ENV};

/// Errors from evidence stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("evidence not found: {0}")]
    NotFound(String),

    #[error("failed to read {locator}: {source}")]
    Io {
        locator: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP {status} fetching {locator}")]
    Http { status: u16, locator: String },

    #[error("transport error fetching {locator}: {message}")]
    Transport { locator: String, message: String },

    #[error("unsupported locator: {0}")]
    Unsupported(String),
}

/// Reads evidence bytes.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn fetch(&self, evidence: &EvidenceRef) -> Result<Vec<u8>, StoreError>;
}

lazy_static! {
    static ref GCS_OBJECT_PATTERN: Regex = Regex::new(r"^([^/]+)/(.+)$").unwrap();
}

/// Where a URI locator points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Gcs { bucket: String, object: String },
    Http(String),
    File(String),
}

impl Locator {
    /// Surrounding whitespace is ignored and the scheme is matched
    /// case-insensitively, the same way request validation reads it.
    pub fn parse(uri: &str) -> Result<Self, StoreError> {
        let uri = uri.trim();
        let Some(scheme) = locator_scheme(uri) else {
            if uri.contains("://") {
                return Err(StoreError::Unsupported(uri.to_string()));
            }
            return Ok(Locator::File(uri.to_string()));
        };
        let rest = &uri[scheme.len() + "://".len()..];

        match scheme.as_str() {
            "gs" => match GCS_OBJECT_PATTERN.captures(rest) {
                Some(caps) => Ok(Locator::Gcs {
                    bucket: caps[1].to_string(),
                    object: caps[2].to_string(),
                }),
                None => Err(StoreError::Unsupported(format!(
                    "{} (expected gs://bucket/object)",
                    uri
                ))),
            },
            "http" | "https" => Ok(Locator::Http(format!("{}://{}", scheme, rest))),
            "file" => Ok(Locator::File(rest.to_string())),
            _ => Err(StoreError::Unsupported(uri.to_string())),
        }
    }
}

/// Serves inline payloads; refuses URI references.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineStore;

#[async_trait]
impl EvidenceStore for InlineStore {
    async fn fetch(&self, evidence: &EvidenceRef) -> Result<Vec<u8>, StoreError> {
        match evidence {
            EvidenceRef::Inline { data, .. } => Ok(data.clone()),
            EvidenceRef::Uri { uri, .. } => Err(StoreError::Unsupported(uri.clone())),
        }
    }
}

/// Dispatches by locator to the configured backends.
#[derive(Clone)]
pub struct CompositeStore {
    local: Arc<dyn EvidenceStore>,
    remote: Option<Arc<dyn EvidenceStore>>,
}

impl CompositeStore {
    /// Local filesystem only.
    pub fn local_only() -> Self {
        Self {
            local: Arc::new(LocalStore::new()),
            remote: None,
        }
    }

    /// Every backend compiled into this build.
    pub fn with_defaults() -> Self {
        #[cfg(feature = "http-store")]
        {
            Self::local_only().with_remote(Arc::new(HttpStore::from_env()))
        }
        #[cfg(not(feature = "http-store"))]
        {
            Self::local_only()
        }
    }

    /// Backend for `http(s)://` and `gs://` locators.
    pub fn with_remote(mut self, remote: Arc<dyn EvidenceStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_local(mut self, local: Arc<dyn EvidenceStore>) -> Self {
        self.local = local;
        self
    }
}

impl std::fmt::Debug for CompositeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeStore")
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

#[async_trait]
impl EvidenceStore for CompositeStore {
    async fn fetch(&self, evidence: &EvidenceRef) -> Result<Vec<u8>, StoreError> {
        let uri = match evidence {
            EvidenceRef::Inline { .. } => return InlineStore.fetch(evidence).await,
            EvidenceRef::Uri { uri, .. } => uri,
        };

        match Locator::parse(uri)? {
            Locator::File(_) => self.local.fetch(evidence).await,
            Locator::Gcs { .. } | Locator::Http(_) => match &self.remote {
                Some(remote) => remote.fetch(evidence).await,
                None => Err(StoreError::Unsupported(format!(
                    "{} (no remote evidence store configured)",
                    uri
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_parsing() {
        assert_eq!(
            Locator::parse("gs://claims-bucket/case-1/photo.jpg").unwrap(),
            Locator::Gcs {
                bucket: "claims-bucket".to_string(),
                object: "case-1/photo.jpg".to_string()
            }
        );
        assert_eq!(
            Locator::parse("https://cdn.example.com/a.mp4").unwrap(),
            Locator::Http("https://cdn.example.com/a.mp4".to_string())
        );
        assert_eq!(
            Locator::parse("file:///tmp/a.wav").unwrap(),
            Locator::File("/tmp/a.wav".to_string())
        );
        assert_eq!(
            Locator::parse("evidence/a.png").unwrap(),
            Locator::File("evidence/a.png".to_string())
        );
        assert!(Locator::parse("gs://bucket-only").is_err());
        assert!(Locator::parse("ftp://host/file").is_err());
    }

    #[test]
    fn test_locator_agrees_with_validation() {
        use claimsight_core::{validate_request, CaseRequest};

        let accepted = [
            ("GS://claims/a.jpg", Locator::Gcs { bucket: "claims".into(), object: "a.jpg".into() }),
            (" gs://b/x ", Locator::Gcs { bucket: "b".into(), object: "x".into() }),
            ("HTTPS://cdn.example.com/A.mp4", Locator::Http("https://cdn.example.com/A.mp4".into())),
            ("File:///tmp/a.wav", Locator::File("/tmp/a.wav".into())),
        ];
        for (uri, expected) in accepted {
            let request = CaseRequest::new().with_visual(EvidenceRef::uri(uri));
            assert!(validate_request(&request).is_ok(), "validation rejected {:?}", uri);
            assert_eq!(Locator::parse(uri).unwrap(), expected, "store parsed {:?}", uri);
        }

        let request = CaseRequest::new().with_visual(EvidenceRef::uri("FTP://host/file"));
        assert!(validate_request(&request).is_err());
        assert!(Locator::parse("FTP://host/file").is_err());
    }

    #[tokio::test]
    async fn test_inline_store() {
        let bytes = InlineStore
            .fetch(&EvidenceRef::inline(b"abc".to_vec(), "image/png"))
            .await
            .unwrap();
        assert_eq!(bytes, b"abc");

        let err = InlineStore
            .fetch(&EvidenceRef::uri("gs://b/o"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_composite_without_remote_rejects_gcs() {
        let store = CompositeStore::local_only();
        let err = store
            .fetch(&EvidenceRef::uri("gs://claims/photo.jpg"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no remote evidence store"));

        let inline = store
            .fetch(&EvidenceRef::inline(b"xyz".to_vec(), "audio/wav"))
            .await
            .unwrap();
        assert_eq!(inline, b"xyz");
    }

    #[tokio::test]
    async fn test_composite_routes_remote_locators() {
        struct Canned;

        #[async_trait]
        impl EvidenceStore for Canned {
            async fn fetch(&self, _evidence: &EvidenceRef) -> Result<Vec<u8>, StoreError> {
                Ok(b"remote".to_vec())
            }
        }

        let store = CompositeStore::local_only().with_remote(Arc::new(Canned));
        let bytes = store
            .fetch(&EvidenceRef::uri("gs://claims/clip.mp4"))
            .await
            .unwrap();
        assert_eq!(bytes, b"remote");
    }
}
