//! Runtime configuration.
//!
//! Loaded from YAML. Every field has a default, so an empty file is a
//! valid configuration. Durations are written the human way (`"45s"`,
//! `"2m 30s"`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::jobs::PollingConfig;
use crate::providers::{CompletionConfig, ResponseFormat, RetryPolicy};
use crate::resilience::CircuitBreakerConfig;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Model selection for one kind of call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ModelSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Completion settings for one call.
    pub fn completion_config(
        &self,
        timeout: Duration,
        response_format: ResponseFormat,
        labels: &BTreeMap<String, String>,
    ) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout,
            response_format,
            labels: labels.clone(),
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            max_tokens: 8192,
            temperature: 0.0,
        }
    }
}

/// Which provider the CLI builds, and its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Registered provider type, e.g. "gemini"
    pub kind: String,

    /// Passed verbatim to the provider factory
    pub options: serde_json::Value,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: "gemini".to_string(),
            options: serde_json::Value::Object(Default::default()),
        }
    }
}

/// Settings for the whole runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on modality units in flight for one case
    pub max_concurrency: usize,

    #[serde(with = "human_duration")]
    pub unit_timeout: Duration,

    #[serde(with = "human_duration")]
    pub adjudication_timeout: Duration,

    /// Bounds fan-out plus adjudication when set
    #[serde(with = "human_duration::option", skip_serializing_if = "Option::is_none")]
    pub case_deadline: Option<Duration>,

    pub processing_model: ModelSettings,
    pub adjudication_model: ModelSettings,

    /// Forwarded to the provider on every call
    pub labels: BTreeMap<String, String>,

    pub provider: ProviderSettings,
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
    pub cache: CacheConfig,
    pub polling: PollingConfig,

    /// Job service base URL; analyses and adjudication run as jobs when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_endpoint: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            unit_timeout: Duration::from_secs(120),
            adjudication_timeout: Duration::from_secs(300),
            case_deadline: None,
            processing_model: ModelSettings::new("gemini-2.5-flash"),
            adjudication_model: ModelSettings::new("gemini-2.5-pro"),
            labels: BTreeMap::new(),
            provider: ProviderSettings::default(),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            polling: PollingConfig::default(),
            job_endpoint: None,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.unit_timeout.is_zero() {
            return Err(ConfigError::Invalid("unit_timeout must be non-zero".to_string()));
        }
        if self.adjudication_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "adjudication_timeout must be non-zero".to_string(),
            ));
        }
        if matches!(self.case_deadline, Some(d) if d.is_zero()) {
            return Err(ConfigError::Invalid("case_deadline must be non-zero".to_string()));
        }
        if self.polling.max_polls == 0 {
            return Err(ConfigError::Invalid("polling.max_polls must be at least 1".to_string()));
        }
        if let Some(endpoint) = &self.job_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "job_endpoint '{}' is not an http(s) URL",
                    endpoint
                )));
            }
        }
        for (name, settings) in [
            ("processing_model", &self.processing_model),
            ("adjudication_model", &self.adjudication_model),
        ] {
            if settings.model.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{}.model must be set", name)));
            }
        }
        Ok(())
    }
}

/// Serde adapter for `humantime` durations.
pub mod human_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|text| humantime::parse_duration(&text).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
