//! Idol News Aggregator — Binary Entrypoint
//! Boots the Axum HTTP server, wiring config, shared state, and middleware.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use idol_news_aggregator::aggregate::Aggregator;
use idol_news_aggregator::api::{self, AppState};
use idol_news_aggregator::cache::CacheStore;
use idol_news_aggregator::config::AppConfig;
use idol_news_aggregator::metrics::Metrics;
use idol_news_aggregator::priority::PriorityKeywords;
use idol_news_aggregator::rate_limit::RateLimiter;
use idol_news_aggregator::scheduler::{spawn_refresh_scheduler, FetchScheduler};
use idol_news_aggregator::sources::catalog::CatalogAdapter;
use idol_news_aggregator::sources::feed::FeedAdapter;
use idol_news_aggregator::sources::ticketing::TicketingAdapter;
use idol_news_aggregator::sources::SourceAdapter;
use idol_news_aggregator::store::{MemoryCache, MemoryFetchLog, MemoryFollows, MemoryNewsStore};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env();
    let metrics = Metrics::init();
    let keywords = Arc::new(PriorityKeywords::from_env());

    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(CatalogAdapter::from_config(&cfg.catalog, Arc::clone(&keywords))),
        Arc::new(FeedAdapter::from_config(cfg.feed_urls.clone(), Arc::clone(&keywords))),
        Arc::new(TicketingAdapter::from_config(&cfg.ticketing, Arc::clone(&keywords))),
    ];

    let aggregator = Arc::new(Aggregator::new(
        CacheStore::new(Arc::new(MemoryCache::new())),
        RateLimiter::with_default_policies(),
        FetchScheduler::new(Arc::new(MemoryFetchLog::new())),
        adapters,
        Arc::new(MemoryNewsStore::new()),
        Arc::new(MemoryFollows::new()),
        cfg.result_ttl_seconds,
    ));

    if let Some(refresh_cfg) = cfg.refresh {
        let _refresh = spawn_refresh_scheduler(refresh_cfg, Arc::clone(&aggregator));
        tracing::info!(?refresh_cfg, "background refresh enabled");
    }

    let app = api::router(AppState { aggregator }).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, "listening");
    axum::serve(listener, app).await.context("serving http")?;
    Ok(())
}
