// src/model.rs
//! Normalized data model shared by the adapters, the cache, and the API.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upstream integration a news item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Catalog,
    Feed,
    Ticketing,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Catalog, Source::Feed, Source::Ticketing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Catalog => "catalog",
            Source::Feed => "feed",
            Source::Ticketing => "ticketing",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsType {
    Release,
    Concert,
    News,
}

/// Display/fetch priority, ordered urgent > high > normal > low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    Normal,
    Low,
}

impl Priority {
    /// Numeric rank for ordering; higher is more important.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Urgent => 3,
            Priority::High => 2,
            Priority::Normal => 1,
            Priority::Low => 0,
        }
    }
}

/// Caller-requested filter over merged results.
///
/// `medium_high` keeps {urgent, high, normal} — the name suggests it should
/// exclude more, but the historical behavior is preserved as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityFilter {
    #[default]
    All,
    High,
    MediumHigh,
}

impl PriorityFilter {
    pub fn allows(&self, priority: Priority) -> bool {
        match self {
            PriorityFilter::All => true,
            PriorityFilter::High => matches!(priority, Priority::Urgent | Priority::High),
            PriorityFilter::MediumHigh => !matches!(priority, Priority::Low),
        }
    }
}

/// A normalized unit of information about an artist. Serialized in
/// camelCase to match the rest of the API surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist_id: Option<String>,
    pub artist_name: String,
    pub title: String,
    pub description: String,
    pub source: Source,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub news_type: NewsType,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl NewsItem {
    /// Natural dedupe key; storing two items with the same key keeps one.
    pub fn dedupe_key(&self) -> (Source, &str) {
        (self.source, self.source_url.as_str())
    }
}

/// Parse an ISO-8601 timestamp or bare date (upstreams emit both;
/// the catalog API in particular returns `YYYY-MM-DD` release dates).
pub fn parse_event_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}

/// One cached aggregation result; replaced wholesale, never patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Vec<NewsItem>,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    /// Valid strictly before `ttl_seconds` have elapsed; an entry exactly at
    /// its TTL is already stale.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age < chrono::Duration::seconds(self.ttl_seconds as i64)
    }
}

/// An artist the requesting user actively tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowedArtist {
    pub artist_name: String,
    #[serde(default)]
    pub artist_id: Option<String>,
}

/// What a source adapter needs to know about the artist being fetched.
#[derive(Debug, Clone)]
pub struct ArtistQuery {
    pub artist_name: String,
    pub artist_id: Option<String>,
    pub is_followed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ranks_are_strictly_ordered() {
        assert!(Priority::Urgent.rank() > Priority::High.rank());
        assert!(Priority::High.rank() > Priority::Normal.rank());
        assert!(Priority::Normal.rank() > Priority::Low.rank());
    }

    #[test]
    fn high_filter_keeps_urgent_and_high_only() {
        let f = PriorityFilter::High;
        assert!(f.allows(Priority::Urgent));
        assert!(f.allows(Priority::High));
        assert!(!f.allows(Priority::Normal));
        assert!(!f.allows(Priority::Low));
    }

    #[test]
    fn medium_high_filter_excludes_low_only() {
        let f = PriorityFilter::MediumHigh;
        assert!(f.allows(Priority::Urgent));
        assert!(f.allows(Priority::High));
        assert!(f.allows(Priority::Normal));
        assert!(!f.allows(Priority::Low));
    }

    #[test]
    fn cache_entry_validity_boundary() {
        let created = Utc::now();
        let entry = CacheEntry {
            data: vec![],
            created_at: created,
            ttl_seconds: 60,
        };
        assert!(entry.is_valid_at(created + chrono::Duration::seconds(59)));
        assert!(!entry.is_valid_at(created + chrono::Duration::seconds(60)));
    }

    #[test]
    fn event_date_accepts_rfc3339_and_bare_dates() {
        assert!(parse_event_date("2025-08-01T12:30:00Z").is_some());
        assert!(parse_event_date("2025-08-01").is_some());
        assert!(parse_event_date("not a date").is_none());
    }

    #[test]
    fn source_round_trips_through_serde() {
        let s: Source = serde_json::from_str("\"ticketing\"").unwrap();
        assert_eq!(s, Source::Ticketing);
        assert_eq!(serde_json::to_string(&Source::Catalog).unwrap(), "\"catalog\"");
    }
}
