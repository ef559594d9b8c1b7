// src/aggregate.rs
//! # Aggregation orchestrator
//!
//! Entry point of the pipeline: consults the cache, the rate limiter, and
//! the fetch scheduler, fans out concurrently to the source adapters, then
//! merges, filters, dedupes, caches, and persists the results.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::model::{ArtistQuery, FollowedArtist, NewsItem, PriorityFilter, Source};
use crate::rate_limit::RateLimiter;
use crate::scheduler::FetchScheduler;
use crate::sources::SourceAdapter;
use crate::store::{FollowedArtistsStore, NewsStore};

/// Follows consulted when resolving `is_followed` (the app caps active
/// follows per user at three).
const FOLLOW_LOOKUP_LIMIT: usize = 3;

/// One-time metrics registration so the series show up on /metrics.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("aggregate_requests_total", "Aggregation requests handled.");
        describe_counter!("aggregate_cache_hits_total", "Requests served from cache.");
        describe_counter!(
            "aggregate_rate_limited_total",
            "Sources skipped because their window was exhausted."
        );
        describe_counter!(
            "source_fetch_errors_total",
            "Adapter fetch failures resolved to empty results."
        );
        describe_counter!("source_events_total", "Items normalized by adapters.");
        describe_counter!(
            "source_provider_errors_total",
            "Upstream fetch/parse errors inside adapters."
        );
        describe_histogram!("aggregate_fan_out_ms", "Adapter fan-out wall time.");
        describe_histogram!("feed_parse_ms", "RSS parse time in milliseconds.");
        describe_gauge!(
            "aggregate_last_run_ts",
            "Unix ts when an aggregation pass last completed."
        );
    });
}

#[derive(Debug, Clone)]
pub struct AggregateRequest {
    pub artist_name: String,
    pub artist_id: Option<String>,
    pub sources: Vec<Source>,
    pub user_id: Option<String>,
    pub priority_filter: PriorityFilter,
    pub use_cache: bool,
}

#[derive(Debug, Error)]
pub enum AggregateError {
    /// Rejected before any external call; maps to HTTP 400.
    #[error("{0}")]
    InvalidRequest(String),
    /// Unhandled fault; maps to HTTP 500.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct Aggregator {
    cache: CacheStore,
    limiter: RateLimiter,
    scheduler: FetchScheduler,
    adapters: HashMap<Source, Arc<dyn SourceAdapter>>,
    news: Arc<dyn NewsStore>,
    follows: Arc<dyn FollowedArtistsStore>,
    result_ttl_seconds: u64,
}

impl Aggregator {
    pub fn new(
        cache: CacheStore,
        limiter: RateLimiter,
        scheduler: FetchScheduler,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        news: Arc<dyn NewsStore>,
        follows: Arc<dyn FollowedArtistsStore>,
        result_ttl_seconds: u64,
    ) -> Self {
        let adapters = adapters.into_iter().map(|a| (a.source(), a)).collect();
        Self {
            cache,
            limiter,
            scheduler,
            adapters,
            news,
            follows,
            result_ttl_seconds,
        }
    }

    /// Passthrough for the background refresh scheduler.
    pub async fn top_followed_artists(&self, limit: usize) -> Result<Vec<FollowedArtist>> {
        self.follows.top_followed_artists(limit).await
    }

    /// Run one aggregation pass. Source failures degrade to empty results;
    /// the only hard error paths are request validation and unhandled faults.
    pub async fn aggregate(&self, req: AggregateRequest) -> Result<Vec<NewsItem>, AggregateError> {
        ensure_metrics_described();
        counter!("aggregate_requests_total").increment(1);

        let artist_name = req.artist_name.trim();
        if artist_name.is_empty() {
            return Err(AggregateError::InvalidRequest(
                "artistName is required".to_string(),
            ));
        }

        let requested: Vec<Source> = {
            let mut seen = HashSet::new();
            req.sources
                .iter()
                .copied()
                .filter(|s| seen.insert(*s))
                .collect()
        };

        let cache_key = CacheStore::cache_key(artist_name, &requested);
        if req.use_cache {
            if let Some(cached) = self.cache.get(&cache_key).await {
                counter!("aggregate_cache_hits_total").increment(1);
                info!(
                    target: "aggregate",
                    artist = artist_name,
                    items = cached.len(),
                    "cache hit"
                );
                // The cache key ignores the priority filter, so re-apply it:
                // a hit written by a broader request may hold more tiers than
                // this caller wants.
                let items = apply_filter(cached, req.priority_filter);
                self.persist(&items).await;
                return Ok(items);
            }
        }

        // Rate-limited sources are dropped from this pass, not an error.
        let mut eligible = Vec::with_capacity(requested.len());
        for source in requested {
            if self.limiter.allow(source) {
                eligible.push(source);
            } else {
                counter!("aggregate_rate_limited_total").increment(1);
                warn!(
                    target: "aggregate",
                    artist = artist_name,
                    source = %source,
                    "rate limit exhausted, skipping source"
                );
            }
        }

        let is_followed = self.resolve_followed(artist_name, req.user_id.as_deref()).await;
        let query = ArtistQuery {
            artist_name: artist_name.to_string(),
            artist_id: req.artist_id.clone(),
            is_followed,
        };

        let merged = self.fan_out(&eligible, &query).await;
        let items = apply_filter(dedupe(merged), req.priority_filter);

        if req.use_cache && !items.is_empty() {
            self.cache
                .set(&cache_key, items.clone(), self.result_ttl_seconds)
                .await;
        }
        self.persist(&items).await;

        gauge!("aggregate_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        info!(
            target: "aggregate",
            artist = artist_name,
            sources = eligible.len(),
            items = items.len(),
            "aggregation pass complete"
        );
        Ok(items)
    }

    /// Concurrent fan-out to the eligible adapters, waiting for all of them
    /// to settle. A failed or panicked adapter contributes an empty list.
    async fn fan_out(&self, eligible: &[Source], query: &ArtistQuery) -> Vec<NewsItem> {
        let t0 = std::time::Instant::now();

        let mut handles = Vec::with_capacity(eligible.len());
        for source in eligible {
            let Some(adapter) = self.adapters.get(source) else {
                warn!(target: "aggregate", source = %source, "no adapter registered");
                continue;
            };

            // Medium-tier sources additionally go through the fetch throttle.
            if !self.scheduler.should_fetch(&query.artist_name, *source).await {
                info!(
                    target: "aggregate",
                    artist = %query.artist_name,
                    source = %source,
                    "fetch throttled by scheduler"
                );
                continue;
            }

            let adapter = Arc::clone(adapter);
            let query = query.clone();
            let source = *source;
            handles.push(tokio::spawn(async move {
                (source, adapter.fetch(&query).await)
            }));
        }

        let mut merged = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((_, Ok(mut items))) => merged.append(&mut items),
                Ok((source, Err(error))) => {
                    counter!("source_fetch_errors_total").increment(1);
                    warn!(target: "aggregate", source = %source, ?error, "adapter error");
                }
                Err(join_error) => {
                    counter!("source_fetch_errors_total").increment(1);
                    warn!(target: "aggregate", ?join_error, "adapter task failed");
                }
            }
        }

        histogram!("aggregate_fan_out_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        merged
    }

    async fn resolve_followed(&self, artist_name: &str, user_id: Option<&str>) -> bool {
        let Some(user_id) = user_id else {
            return false;
        };
        match self.follows.followed_artists(user_id, FOLLOW_LOOKUP_LIMIT).await {
            Ok(follows) => follows
                .iter()
                .any(|f| f.artist_name.eq_ignore_ascii_case(artist_name)),
            Err(error) => {
                warn!(target: "aggregate", user = user_id, ?error, "follow lookup failed");
                false
            }
        }
    }

    async fn persist(&self, items: &[NewsItem]) {
        if items.is_empty() {
            return;
        }
        if let Err(error) = self.news.upsert_items(items).await {
            // storage trouble must not fail the request
            warn!(target: "aggregate", ?error, "news upsert failed");
        }
    }
}

/// Drop items whose `(source, source_url)` key was already seen, preserving
/// relative order.
fn dedupe(items: Vec<NewsItem>) -> Vec<NewsItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert((item.source, item.source_url.clone())))
        .collect()
}

fn apply_filter(items: Vec<NewsItem>, filter: PriorityFilter) -> Vec<NewsItem> {
    items
        .into_iter()
        .filter(|item| filter.allows(item.priority))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewsType, Priority};

    fn item(source: Source, url: &str, priority: Priority) -> NewsItem {
        NewsItem {
            artist_id: None,
            artist_name: "IVE".into(),
            title: "t".into(),
            description: "d".into(),
            source,
            source_url: url.into(),
            image_url: None,
            news_type: NewsType::News,
            priority,
            event_date: None,
            metadata: Default::default(),
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence_and_order() {
        let items = vec![
            item(Source::Feed, "https://n.test/1", Priority::High),
            item(Source::Catalog, "https://n.test/1", Priority::Low),
            item(Source::Feed, "https://n.test/1", Priority::Normal),
            item(Source::Feed, "https://n.test/2", Priority::Low),
        ];
        let out = dedupe(items);
        // same URL under a different source is a different key
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].priority, Priority::High);
        assert_eq!(out[2].source_url, "https://n.test/2");
    }

    #[test]
    fn filter_preserves_relative_order() {
        let items = vec![
            item(Source::Feed, "u1", Priority::Low),
            item(Source::Feed, "u2", Priority::Urgent),
            item(Source::Feed, "u3", Priority::Normal),
            item(Source::Feed, "u4", Priority::High),
        ];
        let out = apply_filter(items, PriorityFilter::High);
        let urls: Vec<&str> = out.iter().map(|i| i.source_url.as_str()).collect();
        assert_eq!(urls, vec!["u2", "u4"]);
    }
}
