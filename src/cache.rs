// src/cache.rs
//! TTL-aware cache over the generic key/value [`CacheBackend`] collaborator.
//!
//! Expired entries are treated as absent and purged on read. A cached empty
//! list is a valid hit, distinct from a miss. Backend failures degrade to a
//! miss on read and a no-op on write; aggregation proceeds without cache.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::model::{CacheEntry, NewsItem, Source};
use crate::store::CacheBackend;

/// Default TTL for aggregated results, 30 minutes.
pub const DEFAULT_RESULT_TTL_SECONDS: u64 = 1800;

#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Deterministic key for one `(artist, sources)` aggregation.
    /// Sources are sorted and deduplicated so request order cannot split the
    /// cache.
    pub fn cache_key(artist_name: &str, sources: &[Source]) -> String {
        let mut sorted: Vec<Source> = sources.to_vec();
        sorted.sort();
        sorted.dedup();
        let joined: Vec<&str> = sorted.iter().map(Source::as_str).collect();
        format!("news:{}:{}", artist_name, joined.join(","))
    }

    pub async fn get(&self, key: &str) -> Option<Vec<NewsItem>> {
        self.get_at(key, Utc::now()).await
    }

    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Vec<NewsItem>> {
        let entry = match self.backend.get_entry(key).await {
            Ok(found) => found?,
            Err(error) => {
                warn!(target: "cache", %key, ?error, "cache read failed, treating as miss");
                return None;
            }
        };

        if entry.is_valid_at(now) {
            return Some(entry.data);
        }

        // lazy expiry: drop the stale entry now rather than waiting
        if let Err(error) = self.backend.delete_entry(key).await {
            warn!(target: "cache", %key, ?error, "failed to purge expired entry");
        }
        None
    }

    pub async fn set(&self, key: &str, items: Vec<NewsItem>, ttl_seconds: u64) {
        self.set_at(key, items, ttl_seconds, Utc::now()).await
    }

    /// Overwrites any existing entry for `key`.
    pub async fn set_at(
        &self,
        key: &str,
        items: Vec<NewsItem>,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) {
        let entry = CacheEntry {
            data: items,
            created_at: now,
            ttl_seconds,
        };
        if let Err(error) = self.backend.put_entry(key, entry).await {
            warn!(target: "cache", %key, ?error, "cache write failed, continuing without cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCache;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    fn store() -> CacheStore {
        CacheStore::new(Arc::new(MemoryCache::new()))
    }

    #[test]
    fn cache_key_is_order_insensitive() {
        let a = CacheStore::cache_key("IVE", &[Source::Feed, Source::Catalog]);
        let b = CacheStore::cache_key("IVE", &[Source::Catalog, Source::Feed]);
        assert_eq!(a, b);
        assert_eq!(a, "news:IVE:catalog,feed");
    }

    #[tokio::test]
    async fn entry_expires_at_ttl() {
        let cache = store();
        let t0 = Utc::now();
        cache.set_at("k", vec![], 60, t0).await;

        assert!(cache.get_at("k", t0 + chrono::Duration::seconds(59)).await.is_some());
        assert!(cache.get_at("k", t0 + chrono::Duration::seconds(60)).await.is_none());
        // purged on the expired read, still absent afterwards
        assert!(cache.get_at("k", t0).await.is_none());
    }

    #[tokio::test]
    async fn cached_empty_list_is_a_hit() {
        let cache = store();
        let t0 = Utc::now();
        cache.set_at("k", vec![], 60, t0).await;
        let hit = cache.get_at("k", t0).await;
        assert_eq!(hit, Some(vec![]));
    }

    #[tokio::test]
    async fn set_overwrites_existing_entry() {
        let cache = store();
        let t0 = Utc::now();
        cache.set_at("k", vec![], 1, t0).await;
        // rewrite with a longer ttl; the old entry must not shadow it
        cache.set_at("k", vec![], 600, t0 + chrono::Duration::seconds(30)).await;
        assert!(cache.get_at("k", t0 + chrono::Duration::seconds(120)).await.is_some());
    }

    struct FailingBackend;

    #[async_trait]
    impl CacheBackend for FailingBackend {
        async fn get_entry(&self, _key: &str) -> Result<Option<CacheEntry>> {
            Err(anyhow!("backend down"))
        }
        async fn put_entry(&self, _key: &str, _entry: CacheEntry) -> Result<()> {
            Err(anyhow!("backend down"))
        }
        async fn delete_entry(&self, _key: &str) -> Result<()> {
            Err(anyhow!("backend down"))
        }
    }

    #[tokio::test]
    async fn backend_errors_degrade_to_miss_and_noop() {
        let cache = CacheStore::new(Arc::new(FailingBackend));
        cache.set("k", vec![], 60).await; // must not panic
        assert!(cache.get("k").await.is_none());
    }
}
