// src/sources/mod.rs
//! Source adapters: each fetches one upstream API and normalizes its payload
//! into [`NewsItem`]s. Failures are reported as `Err` and converted to empty
//! results at the orchestrator boundary, so one bad source never aborts the
//! others.

pub mod catalog;
pub mod feed;
pub mod ticketing;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::OnceCell;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::model::{ArtistQuery, NewsItem, Source};

/// Bounded timeout for outbound HTTP calls; a slow upstream becomes an
/// adapter failure instead of hanging the whole request.
pub const OUTBOUND_TIMEOUT_SECS: u64 = 8;

/// Descriptions are truncated to this many chars before storage.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    /// Fetch and normalize this source's news for one artist.
    async fn fetch(&self, query: &ArtistQuery) -> Result<Vec<NewsItem>>;
}

/// Shared HTTP client with the outbound timeout applied. Construction only
/// fails on a broken TLS backend, and a client without the timeout is worse
/// than not starting.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(OUTBOUND_TIMEOUT_SECS))
        .build()
        .expect("building outbound http client")
}

/// Normalize upstream text: decode HTML entities, strip tags, collapse
/// whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Char-bounded truncation (descriptions are capped at
/// [`MAX_DESCRIPTION_CHARS`]).
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

/// RFC2822 `pubDate` (the RSS convention) to a UTC instant.
pub fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// Hostname of a URL, without pulling in a URL parser; used for feed
/// provenance metadata.
pub fn host_of(url: &str) -> &str {
    let rest = url.split_once("//").map(|(_, r)| r).unwrap_or(url);
    rest.split(['/', '?', '#']).next().unwrap_or(rest)
}
