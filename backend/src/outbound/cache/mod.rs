//! Process-local response cache adapter.
//!
//! Entries are held in a mutexed map keyed by the content-addressed digest
//! and expire by TTL only; correctness never depends on this cache, so a
//! full map is handled with a simple sweep rather than an eviction policy.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use crate::domain::ports::{ResponseCache, ResponseCacheError, ResponseCacheKey};

/// Entries allowed before a write triggers an expiry sweep.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// In-memory TTL cache implementing the `ResponseCache` port.
#[derive(Debug, Default)]
pub struct MemoryResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryResponseCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, key: &ResponseCacheKey) -> Result<Option<Value>, ResponseCacheError> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key.as_str()) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_expired) => {
                entries.remove(key.as_str());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &ResponseCacheKey,
        value: Value,
        ttl: Duration,
    ) -> Result<(), ResponseCacheError> {
        let now = Instant::now();
        let mut entries = self.lock();
        if entries.len() >= SWEEP_THRESHOLD {
            entries.retain(|_, entry| entry.expires_at > now);
        }
        entries.insert(
            key.as_str().to_owned(),
            CacheEntry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::domain::Operation;

    fn key(domain: &str) -> ResponseCacheKey {
        let mut params = serde_json::Map::new();
        params.insert("domain".to_owned(), json!(domain));
        ResponseCacheKey::derive("surfe", Operation::EnrichCompany, &params, None)
    }

    #[tokio::test(start_paused = true)]
    async fn get_after_put_round_trips_until_expiry() {
        let cache = MemoryResponseCache::new();
        let value = json!({ "name": "ACME", "domain": "acme.com" });
        cache
            .put(&key("acme.com"), value.clone(), Duration::from_secs(60))
            .await
            .expect("put");

        assert_eq!(
            cache.get(&key("acme.com")).await.expect("get"),
            Some(value)
        );

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(
            cache.get(&key("acme.com")).await.expect("get"),
            None,
            "expired entries read as misses"
        );
    }

    #[tokio::test]
    async fn distinct_keys_do_not_collide() {
        let cache = MemoryResponseCache::new();
        cache
            .put(&key("acme.com"), json!(1), Duration::from_secs(60))
            .await
            .expect("put");
        assert_eq!(cache.get(&key("other.com")).await.expect("get"), None);
    }
}
