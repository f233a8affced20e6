//! Credentials for model providers and evidence stores.
//!
//! Keys and bearer tokens are wrapped in `secrecy` as soon as they are
//! read. Debug and Display print only the credential's label and origin.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;

use super::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Config,
    Environment,
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialSource::Config => "config",
            CredentialSource::Environment => "environment",
            CredentialSource::Programmatic => "caller",
        })
    }
}

/// An API key or access token.
pub struct ApiCredential {
    secret: SecretString,
    source: CredentialSource,
    label: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, label: &'static str) -> Self {
        Self {
            secret: SecretString::from(value.into()),
            source,
            label,
        }
    }

    /// Read `env_var`. Unset and blank are both treated as missing.
    pub fn from_env(env_var: &str, label: &'static str) -> Result<Self, ProviderError> {
        env_value(env_var)
            .map(|value| Self::new(value, CredentialSource::Environment, label))
            .ok_or_else(|| ProviderError::NotConfigured(format!("{} missing: set {}", label, env_var)))
    }

    /// Prefer `config[key]`, then `env_var`.
    pub fn from_config_or_env(
        config: &JsonValue,
        key: &str,
        env_var: &str,
        label: &'static str,
    ) -> Result<Self, ProviderError> {
        if let Some(value) = config_value(config, key) {
            return Ok(Self::new(value, CredentialSource::Config, label));
        }
        env_value(env_var)
            .map(|value| Self::new(value, CredentialSource::Environment, label))
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "{} missing: set '{}' in provider options or {}",
                    label, key, env_var
                ))
            })
    }

    pub fn is_available(config: &JsonValue, key: &str, env_var: &str) -> bool {
        config_value(config, key).is_some() || env_value(env_var).is_some()
    }

    /// The raw value, for a request header.
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

fn config_value<'a>(config: &'a JsonValue, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .and_then(JsonValue::as_str)
        .filter(|v| !v.trim().is_empty())
}

fn env_value(env_var: &str) -> Option<String> {
    std::env::var(env_var).ok().filter(|v| !v.trim().is_empty())
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiCredential({}, from {}, [REDACTED])", self.label, self.source)
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.source)
    }
}
