//! In-memory cache of modality payloads.
//!
//! The same photo or recording often shows up again when a claim is
//! resubmitted. Successful payloads are kept per `(modality, evidence)`
//! so a resubmission skips the model call. Failures are never stored.

use std::time::Duration;

use claimsight_core::{EvidenceRef, Modality, Payload};
use moka::future::Cache;
use serde::{Deserialize, Serialize};

use crate::config::human_duration;

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,
    #[serde(with = "human_duration")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Cache key: modality plus the evidence fingerprint. Inline evidence is
/// fingerprinted by content, so identical bytes share an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    modality: Modality,
    fingerprint: u64,
}

impl CacheKey {
    pub fn new(modality: Modality, evidence: &EvidenceRef) -> Self {
        Self {
            modality,
            fingerprint: evidence.fingerprint(),
        }
    }
}

/// Payload cache backed by moka.
#[derive(Clone)]
pub struct ProcessingCache {
    cache: Cache<CacheKey, Payload>,
}

impl ProcessingCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    /// Build from config; `None` when caching is disabled.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.max_entries, config.ttl))
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Payload> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: CacheKey, payload: Payload) {
        self.cache.insert(key, payload).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for ProcessingCache {
    fn default() -> Self {
        let config = CacheConfig::default();
        Self::new(config.max_entries, config.ttl)
    }
}

impl std::fmt::Debug for ProcessingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_hit_and_miss() {
        let cache = ProcessingCache::default();
        let evidence = EvidenceRef::uri("gs://claims/scene.jpg");
        let key = CacheKey::new(Modality::Visual, &evidence);

        assert!(cache.get(&key).await.is_none());
        cache.insert(key, Payload::text("dented bumper")).await;
        assert_eq!(cache.get(&key).await, Some(Payload::text("dented bumper")));
    }

    #[tokio::test]
    async fn test_key_separates_modalities() {
        let cache = ProcessingCache::default();
        let evidence = EvidenceRef::uri("gs://claims/clip.mp4");
        cache
            .insert(CacheKey::new(Modality::Video, &evidence), Payload::text("video"))
            .await;

        assert!(cache
            .get(&CacheKey::new(Modality::Audio, &evidence))
            .await
            .is_none());
    }

    #[test]
    fn test_inline_keys_follow_content() {
        let a = EvidenceRef::inline(b"same".to_vec(), "audio/wav");
        let b = EvidenceRef::inline(b"same".to_vec(), "audio/wav");
        let c = EvidenceRef::inline(b"other".to_vec(), "audio/wav");
        assert_eq!(CacheKey::new(Modality::Audio, &a), CacheKey::new(Modality::Audio, &b));
        assert_ne!(CacheKey::new(Modality::Audio, &a), CacheKey::new(Modality::Audio, &c));
    }

    #[test]
    fn test_disabled_by_default() {
        assert!(ProcessingCache::from_config(&CacheConfig::default()).is_none());
        let enabled = CacheConfig {
            enabled: true,
            ..CacheConfig::default()
        };
        assert!(ProcessingCache::from_config(&enabled).is_some());
    }
}
