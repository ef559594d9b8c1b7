// src/store.rs
//! Persistence collaborators consumed by the pipeline, expressed as traits.
//!
//! Production deployments back these with the app's datastore; the default
//! binary and the test suite use the in-memory implementations below.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{CacheEntry, FollowedArtist, NewsItem, Source};

/// Generic key/value cache contract backing [`crate::cache::CacheStore`].
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>>;
    async fn put_entry(&self, key: &str, entry: CacheEntry) -> Result<()>;
    async fn delete_entry(&self, key: &str) -> Result<()>;
}

/// Append/query contract for the fetch log, keyed by
/// `(artist_name, source, tier)`. Entries are updated, never deleted.
#[async_trait]
pub trait FetchLogStore: Send + Sync {
    async fn last_fetched(
        &self,
        artist_name: &str,
        source: Source,
        tier: &str,
    ) -> Result<Option<DateTime<Utc>>>;

    async fn record_fetch(
        &self,
        artist_name: &str,
        source: Source,
        tier: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Durable news storage.
#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Idempotent upsert keyed by `(source, source_url)`; duplicate keys keep
    /// the already-stored record.
    async fn upsert_items(&self, items: &[NewsItem]) -> Result<()>;
}

/// Followed-artists lookup.
#[async_trait]
pub trait FollowedArtistsStore: Send + Sync {
    /// Active follows for one user, bounded by `limit`.
    async fn followed_artists(&self, user_id: &str, limit: usize) -> Result<Vec<FollowedArtist>>;

    /// Distinct artists followed across all users, bounded by `limit`.
    /// Drives the background refresh scheduler.
    async fn top_followed_artists(&self, limit: usize) -> Result<Vec<FollowedArtist>>;
}

// ---- In-memory implementations ----

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let entries = self.entries.lock().expect("cache mutex poisoned");
        Ok(entries.get(key).cloned())
    }

    async fn put_entry(&self, key: &str, entry: CacheEntry) -> Result<()> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete_entry(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryFetchLog {
    entries: Mutex<HashMap<(String, Source, String), DateTime<Utc>>>,
}

impl MemoryFetchLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FetchLogStore for MemoryFetchLog {
    async fn last_fetched(
        &self,
        artist_name: &str,
        source: Source,
        tier: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let entries = self.entries.lock().expect("fetch log mutex poisoned");
        Ok(entries
            .get(&(artist_name.to_string(), source, tier.to_string()))
            .copied())
    }

    async fn record_fetch(
        &self,
        artist_name: &str,
        source: Source,
        tier: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut entries = self.entries.lock().expect("fetch log mutex poisoned");
        entries.insert((artist_name.to_string(), source, tier.to_string()), at);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryNewsStore {
    items: Mutex<HashMap<(Source, String), NewsItem>>,
}

impl MemoryNewsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("news store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<NewsItem> {
        self.items
            .lock()
            .expect("news store mutex poisoned")
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NewsStore for MemoryNewsStore {
    async fn upsert_items(&self, items: &[NewsItem]) -> Result<()> {
        let mut stored = self.items.lock().expect("news store mutex poisoned");
        for item in items {
            let key = (item.source, item.source_url.clone());
            // ignore-duplicates semantics: first stored record wins
            stored.entry(key).or_insert_with(|| item.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryFollows {
    follows: Mutex<HashMap<String, Vec<FollowedArtist>>>,
}

impl MemoryFollows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_follow(&self, user_id: &str, artist: FollowedArtist) {
        let mut follows = self.follows.lock().expect("follows mutex poisoned");
        follows.entry(user_id.to_string()).or_default().push(artist);
    }
}

#[async_trait]
impl FollowedArtistsStore for MemoryFollows {
    async fn followed_artists(&self, user_id: &str, limit: usize) -> Result<Vec<FollowedArtist>> {
        let follows = self.follows.lock().expect("follows mutex poisoned");
        Ok(follows
            .get(user_id)
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn top_followed_artists(&self, limit: usize) -> Result<Vec<FollowedArtist>> {
        let follows = self.follows.lock().expect("follows mutex poisoned");
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for artist in follows.values().flatten() {
            if out.len() >= limit {
                break;
            }
            if seen.insert(artist.artist_name.clone()) {
                out.push(artist.clone());
            }
        }
        Ok(out)
    }
}
