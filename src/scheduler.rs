// src/scheduler.rs
//! Fetch scheduling: per-tier throttling of outbound source fetches, plus the
//! background task that refreshes news for the most-followed artists.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::aggregate::{AggregateRequest, Aggregator};
use crate::model::{PriorityFilter, Source};
use crate::store::FetchLogStore;

/// Medium-tier sources are re-fetched at most once per this interval.
pub const MEDIUM_TIER_MIN_INTERVAL_HOURS: i64 = 6;

/// Fetch-frequency class of a source. High-tier sources are always eligible;
/// medium-tier sources go through the fetch log throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTier {
    High,
    Medium,
}

impl FetchTier {
    pub fn for_source(source: Source) -> FetchTier {
        match source {
            Source::Catalog | Source::Feed => FetchTier::High,
            Source::Ticketing => FetchTier::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchTier::High => "high",
            FetchTier::Medium => "medium",
        }
    }
}

/// Decides whether enough time has passed to justify a new fetch for
/// `(artist, source)`, recording intent in the fetch log when it allows one.
pub struct FetchScheduler {
    log: Arc<dyn FetchLogStore>,
}

impl FetchScheduler {
    pub fn new(log: Arc<dyn FetchLogStore>) -> Self {
        Self { log }
    }

    pub async fn should_fetch(&self, artist_name: &str, source: Source) -> bool {
        self.should_fetch_at(artist_name, source, Utc::now()).await
    }

    pub async fn should_fetch_at(
        &self,
        artist_name: &str,
        source: Source,
        now: DateTime<Utc>,
    ) -> bool {
        let tier = FetchTier::for_source(source);
        if tier == FetchTier::High {
            return true;
        }

        match self.log.last_fetched(artist_name, source, tier.as_str()).await {
            Ok(None) => {
                self.record(artist_name, source, tier, now).await;
                true
            }
            Ok(Some(last)) => {
                let elapsed = now.signed_duration_since(last);
                if elapsed >= Duration::hours(MEDIUM_TIER_MIN_INTERVAL_HOURS) {
                    self.record(artist_name, source, tier, now).await;
                    true
                } else {
                    false
                }
            }
            Err(error) => {
                // fail-open: an extra fetch beats silently starving the pipeline
                warn!(
                    target: "scheduler",
                    artist = artist_name,
                    source = %source,
                    ?error,
                    "fetch log lookup failed, allowing fetch"
                );
                true
            }
        }
    }

    async fn record(&self, artist_name: &str, source: Source, tier: FetchTier, at: DateTime<Utc>) {
        if let Err(error) = self
            .log
            .record_fetch(artist_name, source, tier.as_str(), at)
            .await
        {
            warn!(
                target: "scheduler",
                artist = artist_name,
                source = %source,
                ?error,
                "failed to record fetch"
            );
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RefreshSchedulerCfg {
    pub interval_secs: u64,
    pub artist_limit: usize,
}

/// Spawn the background refresh loop: on each tick, re-aggregate news for the
/// most-followed artists. Catalog and feed run with the `high` filter; the
/// ticketing pass goes through the medium-tier throttle inside `aggregate`.
pub fn spawn_refresh_scheduler(
    cfg: RefreshSchedulerCfg,
    aggregator: Arc<Aggregator>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(cfg.interval_secs));
        loop {
            ticker.tick().await;

            let artists = match aggregator.top_followed_artists(cfg.artist_limit).await {
                Ok(artists) => artists,
                Err(error) => {
                    warn!(target: "refresh", ?error, "followed-artists lookup failed");
                    continue;
                }
            };

            let mut refreshed = 0usize;
            let mut item_total = 0usize;
            for artist in artists {
                let passes = [
                    (vec![Source::Catalog, Source::Feed], PriorityFilter::High),
                    (vec![Source::Ticketing], PriorityFilter::MediumHigh),
                ];
                for (sources, priority_filter) in passes {
                    let req = AggregateRequest {
                        artist_name: artist.artist_name.clone(),
                        artist_id: artist.artist_id.clone(),
                        sources,
                        user_id: None,
                        priority_filter,
                        use_cache: true,
                    };
                    match aggregator.aggregate(req).await {
                        Ok(items) => {
                            refreshed += 1;
                            item_total += items.len();
                        }
                        Err(error) => {
                            warn!(
                                target: "refresh",
                                artist = %artist.artist_name,
                                ?error,
                                "refresh aggregation failed"
                            );
                        }
                    }
                }
            }

            counter!("refresh_runs_total").increment(1);
            info!(
                target: "refresh",
                refreshed,
                items = item_total,
                "scheduled refresh tick"
            );
        }
    })
}
