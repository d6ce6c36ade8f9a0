//! In-memory [`CacheStore`] backed by [`DashMap`].
//!
//! Entries expire lazily: an expired entry is dropped by the read that finds
//! it. Suitable for tests, demos, and single-process deployments.

use std::time::Duration;

use async_trait::async_trait;
use crudkit_core::filter::like_matches;
use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

use crate::traits::CacheStore;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// TTL-aware result cache keyed by string.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let now = Instant::now();
        let hit = self.entries.get(key).map(|e| (e.value.clone(), e.expired(now)));
        match hit {
            Some((value, false)) => Ok(Some(value)),
            Some((_, true)) => {
                self.entries.remove_if(key, |_, e| e.expired(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> anyhow::Result<()> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> anyhow::Result<u64> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !like_matches(key, pattern, false));
        Ok(u64::try_from(before.saturating_sub(self.entries.len())).unwrap_or(u64::MAX))
    }
}

/// Cache store whose every call fails. Proves cache failures stay invisible.
#[cfg(test)]
pub(crate) struct FailingCacheStore;

#[cfg(test)]
#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn get(&self, _key: &str) -> anyhow::Result<Option<Value>> {
        anyhow::bail!("cache unavailable")
    }

    async fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> anyhow::Result<()> {
        anyhow::bail!("cache unavailable")
    }

    async fn delete_matching(&self, _pattern: &str) -> anyhow::Result<u64> {
        anyhow::bail!("cache unavailable")
    }
}
