// src/config.rs
//! Environment-driven configuration. Every setting has a default so the
//! service boots with no env at all; credential-less upstream calls simply
//! fail at the adapter boundary and resolve to empty results.

use std::env;
use std::str::FromStr;

use crate::scheduler::RefreshSchedulerCfg;

pub const ENV_BIND_ADDR: &str = "BIND_ADDR";
pub const ENV_CATALOG_TOKEN_URL: &str = "CATALOG_TOKEN_URL";
pub const ENV_CATALOG_API_BASE: &str = "CATALOG_API_BASE";
pub const ENV_CATALOG_CLIENT_ID: &str = "CATALOG_CLIENT_ID";
pub const ENV_CATALOG_CLIENT_SECRET: &str = "CATALOG_CLIENT_SECRET";
pub const ENV_TICKETING_API_BASE: &str = "TICKETING_API_BASE";
pub const ENV_TICKETING_API_KEY: &str = "TICKETING_API_KEY";
pub const ENV_TICKETING_CITY: &str = "TICKETING_CITY";
pub const ENV_TICKETING_PAGE_SIZE: &str = "TICKETING_PAGE_SIZE";
pub const ENV_NEWS_FEED_URLS: &str = "NEWS_FEED_URLS";
pub const ENV_RESULT_TTL_SECS: &str = "NEWS_RESULT_TTL_SECS";
pub const ENV_REFRESH_ENABLED: &str = "REFRESH_ENABLED";
pub const ENV_REFRESH_INTERVAL_SECS: &str = "REFRESH_INTERVAL_SECS";
pub const ENV_REFRESH_ARTIST_LIMIT: &str = "REFRESH_ARTIST_LIMIT";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_CATALOG_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const DEFAULT_CATALOG_API_BASE: &str = "https://api.spotify.com/v1";
const DEFAULT_TICKETING_API_BASE: &str = "https://app.ticketmaster.com/discovery/v2";
const DEFAULT_TICKETING_PAGE_SIZE: usize = 5;
const DEFAULT_RESULT_TTL_SECS: u64 = crate::cache::DEFAULT_RESULT_TTL_SECONDS;
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 1800;
const DEFAULT_REFRESH_ARTIST_LIMIT: usize = 30;

const DEFAULT_FEED_URLS: [&str; 3] = [
    "https://www.allkpop.com/feed",
    "https://www.soompi.com/feed",
    "https://www.koreaboo.com/feed/",
];

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub token_url: String,
    pub api_base: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct TicketingConfig {
    pub api_base: String,
    pub api_key: String,
    pub city: Option<String>,
    pub page_size: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub catalog: CatalogConfig,
    pub ticketing: TicketingConfig,
    pub feed_urls: Vec<String>,
    pub result_ttl_seconds: u64,
    /// Background refresh of followed artists; `None` disables the task.
    pub refresh: Option<RefreshSchedulerCfg>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let refresh = if env_flag(ENV_REFRESH_ENABLED) {
            Some(RefreshSchedulerCfg {
                interval_secs: env_parse(ENV_REFRESH_INTERVAL_SECS, DEFAULT_REFRESH_INTERVAL_SECS),
                artist_limit: env_parse(ENV_REFRESH_ARTIST_LIMIT, DEFAULT_REFRESH_ARTIST_LIMIT),
            })
        } else {
            None
        };

        Self {
            bind_addr: env_or(ENV_BIND_ADDR, DEFAULT_BIND_ADDR),
            catalog: CatalogConfig {
                token_url: env_or(ENV_CATALOG_TOKEN_URL, DEFAULT_CATALOG_TOKEN_URL),
                api_base: env_or(ENV_CATALOG_API_BASE, DEFAULT_CATALOG_API_BASE),
                client_id: env_or(ENV_CATALOG_CLIENT_ID, ""),
                client_secret: env_or(ENV_CATALOG_CLIENT_SECRET, ""),
            },
            ticketing: TicketingConfig {
                api_base: env_or(ENV_TICKETING_API_BASE, DEFAULT_TICKETING_API_BASE),
                api_key: env_or(ENV_TICKETING_API_KEY, ""),
                city: env::var(ENV_TICKETING_CITY).ok().filter(|c| !c.is_empty()),
                page_size: env_parse(ENV_TICKETING_PAGE_SIZE, DEFAULT_TICKETING_PAGE_SIZE),
            },
            feed_urls: feed_urls_from_env(),
            result_ttl_seconds: env_parse(ENV_RESULT_TTL_SECS, DEFAULT_RESULT_TTL_SECS),
            refresh,
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr + Copy>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str) -> bool {
    env::var(name).ok().as_deref() == Some("1")
}

fn feed_urls_from_env() -> Vec<String> {
    match env::var(ENV_NEWS_FEED_URLS) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => DEFAULT_FEED_URLS.map(String::from).to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_boot_without_env() {
        let cfg = AppConfig::from_env();
        assert!(!cfg.bind_addr.is_empty());
        assert_eq!(cfg.feed_urls.len(), 3);
        assert_eq!(cfg.ticketing.page_size, DEFAULT_TICKETING_PAGE_SIZE);
        assert_eq!(cfg.result_ttl_seconds, DEFAULT_RESULT_TTL_SECS);
    }
}
