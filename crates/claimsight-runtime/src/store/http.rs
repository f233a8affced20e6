use std::time::Duration;

use async_trait::async_trait;
use claimsight_core::EvidenceRef;

use super::{EvidenceStore, Locator, StoreError};
use crate::providers::{ApiCredential, CredentialSource};

/// Optional OAuth bearer token for private `gs://` objects.
pub const GCS_ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

const GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Downloads `http(s)://` evidence and `gs://` objects.
pub struct HttpStore {
    client: reqwest::Client,
    token: Option<ApiCredential>,
    gcs_endpoint: String,
    timeout: Duration,
}

impl HttpStore {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            token: None,
            gcs_endpoint: GCS_ENDPOINT.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Picks up a bearer token from `GOOGLE_OAUTH_ACCESS_TOKEN` when set.
    pub fn from_env() -> Self {
        let mut store = Self::new();
        store.token = ApiCredential::from_env(GCS_ACCESS_TOKEN_ENV, "storage access token").ok();
        store
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(ApiCredential::new(
            token,
            CredentialSource::Programmatic,
            "storage access token",
        ));
        self
    }

    pub fn with_gcs_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.gcs_endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Download URL for a locator.
    fn url_for(&self, uri: &str) -> Result<String, StoreError> {
        match Locator::parse(uri)? {
            Locator::Gcs { bucket, object } => {
                Ok(format!("{}/{}/{}", self.gcs_endpoint, bucket, object))
            }
            Locator::Http(url) => Ok(url),
            Locator::File(_) => Err(StoreError::Unsupported(uri.to_string())),
        }
    }
}

impl Default for HttpStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStore")
            .field("token", &self.token)
            .field("gcs_endpoint", &self.gcs_endpoint)
            .finish()
    }
}

#[async_trait]
impl EvidenceStore for HttpStore {
    async fn fetch(&self, evidence: &EvidenceRef) -> Result<Vec<u8>, StoreError> {
        let uri = match evidence {
            EvidenceRef::Inline { data, .. } => return Ok(data.clone()),
            EvidenceRef::Uri { uri, .. } => uri,
        };
        let url = self.url_for(uri)?;

        let mut request = self.client.get(&url).timeout(self.timeout);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose());
        }

        let started = std::time::Instant::now();
        let response = request.send().await.map_err(|e| StoreError::Transport {
            locator: uri.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(StoreError::NotFound(uri.clone()));
        }
        if !status.is_success() {
            return Err(StoreError::Http {
                status: status.as_u16(),
                locator: uri.clone(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| StoreError::Transport {
            locator: uri.clone(),
            message: e.to_string(),
        })?;

        tracing::debug!(
            locator = %uri,
            bytes = bytes.len(),
            elapsed = ?started.elapsed(),
            "Downloaded evidence"
        );
        Ok(bytes.to_vec())
    }
}
