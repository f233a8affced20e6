//! Job backend for an HTTP job service.
//!
//! `POST {base}/jobs` takes a [`JobSpec`] and answers `{"id": "..."}`.
//! `GET {base}/jobs/{id}` answers a [`JobStatus`], for example
//! `{"state": "completed", "output": "..."}`.

use std::time::Duration;

use async_trait::async_trait;

use super::{JobBackend, JobError, JobHandle, JobSpec, JobStatus};
use crate::providers::{ApiCredential, CredentialSource};

/// Optional bearer token for the job service.
pub const JOBS_TOKEN_ENV: &str = "CLAIMSIGHT_JOBS_TOKEN";

pub struct HttpJobBackend {
    client: reqwest::Client,
    base_url: String,
    token: Option<ApiCredential>,
    timeout: Duration,
}

impl HttpJobBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Picks up a bearer token from `CLAIMSIGHT_JOBS_TOKEN` when set.
    pub fn from_env(base_url: impl Into<String>) -> Self {
        let mut backend = Self::new(base_url);
        backend.token = ApiCredential::from_env(JOBS_TOKEN_ENV, "job service token").ok();
        backend
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(ApiCredential::new(
            token,
            CredentialSource::Programmatic,
            "job service token",
        ));
        self
    }

    /// Per-request timeout for submit and status calls.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn submit_url(&self) -> String {
        format!("{}/jobs", self.base_url)
    }

    fn status_url(&self, handle: &JobHandle) -> String {
        format!("{}/jobs/{}", self.base_url, handle.id)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.timeout(self.timeout);
        match &self.token {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        }
    }
}

impl std::fmt::Debug for HttpJobBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpJobBackend")
            .field("base_url", &self.base_url)
            .field("token", &self.token)
            .finish()
    }
}

#[async_trait]
impl JobBackend for HttpJobBackend {
    async fn submit(&self, spec: JobSpec) -> Result<JobHandle, JobError> {
        let response = self
            .authorized(self.client.post(self.submit_url()).json(&spec))
            .send()
            .await
            .map_err(|e| JobError::Submit(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JobError::Submit(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let handle: JobHandle = response
            .json()
            .await
            .map_err(|e| JobError::Submit(format!("unreadable job handle: {}", e)))?;
        if handle.id.is_empty() || handle.id.contains('/') {
            return Err(JobError::Submit(format!("invalid job id '{}'", handle.id)));
        }
        Ok(handle)
    }

    async fn status(&self, handle: &JobHandle) -> Result<JobStatus, JobError> {
        let status_error = |message: String| JobError::Status {
            id: handle.id.clone(),
            message,
        };

        let response = self
            .authorized(self.client.get(self.status_url(handle)))
            .send()
            .await
            .map_err(|e| status_error(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(status_error("unknown job".to_string()));
        }
        if !status.is_success() {
            return Err(status_error(format!("HTTP {}", status.as_u16())));
        }

        response
            .json::<JobStatus>()
            .await
            .map_err(|e| status_error(format!("unreadable status: {}", e)))
    }
}
