//! External job dispatch with bounded polling.
//!
//! Some deployments run each modality analysis and the adjudication as a
//! separate batch job instead of an in-process call. A [`JobBackend`]
//! submits and inspects such jobs; [`JobPoller`] drives one job to a
//! terminal state with a fixed interval and a hard cap on polls. The
//! adapters in this module expose a backend through the same processor
//! and adjudicator traits the orchestrator already uses.
//!
//! [`HttpJobBackend`] (feature `http-jobs`) talks to a job service over
//! HTTP and is selected by `job_endpoint` in the runtime configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use claimsight_core::Modality;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::human_duration;

mod adapters;
#[cfg(feature = "http-jobs")]
mod http;

pub use adapters::{JobAdjudicator, JobProcessor};
#[cfg(feature = "http-jobs")]
pub use http::{HttpJobBackend, JOBS_TOKEN_ENV};

/// What a job is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "modality", rename_all = "snake_case")]
pub enum JobKind {
    Modality(Modality),
    Adjudication,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Modality(modality) => write!(f, "{}", modality),
            JobKind::Adjudication => f.write_str("adjudication"),
        }
    }
}

/// A job submission: kind plus string arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub kind: JobKind,
    pub args: BTreeMap<String, String>,
}

impl JobSpec {
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind,
            args: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

/// Opaque identifier of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed { output: String },
    Failed { reason: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Failed { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("job submission failed: {0}")]
    Submit(String),

    #[error("status check for job {id} failed: {message}")]
    Status { id: String, message: String },

    #[error("job {id} failed: {reason}")]
    Failed { id: String, reason: String },

    #[error("job {id} still running after {polls} polls")]
    PollLimit { id: String, polls: u32 },
}

/// Submits and inspects external jobs.
#[async_trait]
pub trait JobBackend: Send + Sync {
    async fn submit(&self, spec: JobSpec) -> Result<JobHandle, JobError>;

    async fn status(&self, handle: &JobHandle) -> Result<JobStatus, JobError>;
}

/// Polling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    #[serde(with = "human_duration")]
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_polls: 120,
        }
    }
}

/// Drives one job to a terminal state.
///
/// Polls at most `max_polls` times and sleeps `interval` between polls,
/// never after the last one.
#[derive(Debug, Clone, Copy)]
pub struct JobPoller {
    interval: Duration,
    max_polls: u32,
}

impl JobPoller {
    pub fn new(interval: Duration, max_polls: u32) -> Self {
        Self {
            interval,
            max_polls: max_polls.max(1),
        }
    }

    pub fn from_config(config: &PollingConfig) -> Self {
        Self::new(config.interval, config.max_polls)
    }

    /// Submit `spec` and wait for its output.
    pub async fn run(&self, backend: &dyn JobBackend, spec: JobSpec) -> Result<String, JobError> {
        let kind = spec.kind;
        let handle = backend.submit(spec).await?;
        tracing::debug!(job = %handle, %kind, "Job submitted");
        self.await_completion(backend, &handle).await
    }

    pub async fn await_completion(
        &self,
        backend: &dyn JobBackend,
        handle: &JobHandle,
    ) -> Result<String, JobError> {
        for poll in 1..=self.max_polls {
            match backend.status(handle).await? {
                JobStatus::Completed { output } => {
                    tracing::debug!(job = %handle, polls = poll, "Job completed");
                    return Ok(output);
                }
                JobStatus::Failed { reason } => {
                    return Err(JobError::Failed {
                        id: handle.id.clone(),
                        reason,
                    });
                }
                JobStatus::Pending | JobStatus::Running => {
                    if poll < self.max_polls {
                        tokio::time::sleep(self.interval).await;
                    }
                }
            }
        }

        tracing::warn!(job = %handle, polls = self.max_polls, "Job poll limit reached");
        Err(JobError::PollLimit {
            id: handle.id.clone(),
            polls: self.max_polls,
        })
    }
}

impl Default for JobPoller {
    fn default() -> Self {
        Self::from_config(&PollingConfig::default())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedBackend;
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_completes_after_running() {
        let backend = ScriptedBackend::new(vec![
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed {
                output: "transcript".to_string(),
            },
        ]);
        let started = tokio::time::Instant::now();

        let output = JobPoller::new(Duration::from_secs(2), 10)
            .run(&backend, JobSpec::new(JobKind::Modality(Modality::Audio)))
            .await
            .unwrap();

        assert_eq!(output, "transcript");
        assert_eq!(*backend.polls.lock(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_stops_polling() {
        let backend = ScriptedBackend::new(vec![
            JobStatus::Running,
            JobStatus::Failed {
                reason: "OOM".to_string(),
            },
        ]);

        let err = JobPoller::new(Duration::from_secs(1), 10)
            .run(&backend, JobSpec::new(JobKind::Adjudication))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            JobError::Failed {
                id: "job-1".to_string(),
                reason: "OOM".to_string()
            }
        );
        assert_eq!(*backend.polls.lock(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_cap_without_trailing_sleep() {
        let backend = ScriptedBackend::new(vec![JobStatus::Running]);
        let started = tokio::time::Instant::now();

        let err = JobPoller::new(Duration::from_secs(3), 4)
            .run(&backend, JobSpec::new(JobKind::Modality(Modality::Video)))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            JobError::PollLimit {
                id: "job-1".to_string(),
                polls: 4
            }
        );
        assert_eq!(*backend.polls.lock(), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(9));
    }

    #[test]
    fn test_spec_serializes_kind() {
        let spec = JobSpec::new(JobKind::Modality(Modality::Visual)).arg("uri", "gs://b/o.jpg");
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["kind"]["kind"], "modality");
        assert_eq!(json["kind"]["modality"], "visual");
        assert_eq!(json["args"]["uri"], "gs://b/o.jpg");
    }
}
