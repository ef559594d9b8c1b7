// src/priority.rs
//! # Priority classification
//!
//! Maps free-text content + news type + follow status to a priority tier,
//! with timing refinements for recent releases and upcoming events.
//!
//! - Keyword tiers load from TOML config (path via `PRIORITY_KEYWORDS_PATH`).
//! - Falls back to a built-in seed when no config is found.
//! - Matching is case-insensitive substring match.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::model::{NewsType, Priority};

pub const DEFAULT_KEYWORDS_CONFIG_PATH: &str = "config/priority_keywords.toml";
pub const ENV_KEYWORDS_CONFIG_PATH: &str = "PRIORITY_KEYWORDS_PATH";

/// A release is "recent" within this many days of now.
pub const RECENT_RELEASE_WINDOW_DAYS: i64 = 30;
/// An event is "upcoming" if it starts within this many days from now.
pub const UPCOMING_EVENT_WINDOW_DAYS: i64 = 30;

/// Keyword tiers driving the generic classification rules.
#[derive(Debug, Clone, Deserialize)]
pub struct PriorityKeywords {
    #[serde(default = "seed_high")]
    pub high: Vec<String>,
    #[serde(default = "seed_medium")]
    pub medium: Vec<String>,
    #[serde(default = "seed_low")]
    pub low: Vec<String>,
}

fn seed_high() -> Vec<String> {
    [
        "comeback",
        "album",
        "debut",
        "release",
        "mv",
        "music video",
        "single",
        "new song",
    ]
    .map(String::from)
    .to_vec()
}

fn seed_medium() -> Vec<String> {
    [
        "tour",
        "concert",
        "fanmeet",
        "interview",
        "performance",
        "award",
        "collaboration",
        "collab",
        "feature",
    ]
    .map(String::from)
    .to_vec()
}

fn seed_low() -> Vec<String> {
    [
        "mention", "spotted", "fashion", "airport", "instagram", "twitter", "social",
    ]
    .map(String::from)
    .to_vec()
}

impl Default for PriorityKeywords {
    fn default() -> Self {
        Self {
            high: seed_high(),
            medium: seed_medium(),
            low: seed_low(),
        }
    }
}

impl PriorityKeywords {
    /// Load keyword tiers from a TOML file.
    /// Falls back to the built-in seed on any read/parse error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let loaded = match fs::read_to_string(path) {
            Ok(s) => toml::from_str::<Self>(&s).unwrap_or_default(),
            Err(_) => Self::default(),
        };
        loaded.normalized()
    }

    /// Load from `PRIORITY_KEYWORDS_PATH` or the default location.
    pub fn from_env() -> Self {
        let path = std::env::var(ENV_KEYWORDS_CONFIG_PATH)
            .unwrap_or_else(|_| DEFAULT_KEYWORDS_CONFIG_PATH.to_string());
        Self::load_from_file(path)
    }

    /// Lowercase every keyword so `classify` can match on a lowercased haystack.
    fn normalized(mut self) -> Self {
        for list in [&mut self.high, &mut self.medium, &mut self.low] {
            for kw in list.iter_mut() {
                *kw = kw.trim().to_lowercase();
            }
            list.retain(|kw| !kw.is_empty());
        }
        self
    }
}

/// Timing signals a source adapter can layer on top of the keyword rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventTiming {
    pub recent_release: bool,
    pub upcoming_event: bool,
    pub presale_active: bool,
}

impl EventTiming {
    fn escalates(&self) -> bool {
        self.recent_release || self.upcoming_event || self.presale_active
    }
}

/// Classify a piece of content into a priority tier.
///
/// Rules in precedence order:
/// 1. followed artist + release/concert → urgent
/// 2. HIGH-tier keyword hit → high
/// 3. MEDIUM-tier keyword hit → normal
/// 4. LOW-tier keyword hit → low
/// 5. default → normal
///
/// A recent release, upcoming event, or active presale then upgrades a
/// `normal` result to `high` (`urgent` when the artist is followed).
pub fn classify(
    content: &str,
    news_type: NewsType,
    is_followed: bool,
    timing: Option<EventTiming>,
    keywords: &PriorityKeywords,
) -> Priority {
    let haystack = content.to_lowercase();
    let hit = |tier: &[String]| tier.iter().any(|kw| haystack.contains(kw.as_str()));

    let mut priority = if is_followed && matches!(news_type, NewsType::Release | NewsType::Concert)
    {
        Priority::Urgent
    } else if hit(&keywords.high) {
        Priority::High
    } else if hit(&keywords.medium) {
        Priority::Normal
    } else if hit(&keywords.low) {
        Priority::Low
    } else {
        Priority::Normal
    };

    if let Some(timing) = timing {
        if timing.escalates() && priority == Priority::Normal {
            priority = if is_followed {
                Priority::Urgent
            } else {
                Priority::High
            };
        }
    }

    priority
}

/// A release counts as recent when it happened within the last
/// [`RECENT_RELEASE_WINDOW_DAYS`] days (future-dated releases also qualify).
pub fn is_recent_release(release_date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(release_date) <= Duration::days(RECENT_RELEASE_WINDOW_DAYS)
}

/// An event is upcoming when it starts within the next
/// [`UPCOMING_EVENT_WINDOW_DAYS`] days.
pub fn is_upcoming_event(start_date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let until = start_date.signed_duration_since(now);
    until > Duration::zero() && until <= Duration::days(UPCOMING_EVENT_WINDOW_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw() -> PriorityKeywords {
        PriorityKeywords::default()
    }

    #[test]
    fn followed_release_is_urgent() {
        let p = classify("anything at all", NewsType::Release, true, None, &kw());
        assert_eq!(p, Priority::Urgent);
    }

    #[test]
    fn high_keyword_in_plain_news_is_high() {
        let p = classify(
            "IVE announces comeback album",
            NewsType::News,
            false,
            None,
            &kw(),
        );
        assert_eq!(p, Priority::High);
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let p = classify("NEW ALBUM OUT NOW", NewsType::News, false, None, &kw());
        assert_eq!(p, Priority::High);
    }

    #[test]
    fn medium_keyword_is_normal_and_low_keyword_is_low() {
        assert_eq!(
            classify("exclusive interview backstage", NewsType::News, false, None, &kw()),
            Priority::Normal
        );
        assert_eq!(
            classify("spotted at the airport", NewsType::News, false, None, &kw()),
            Priority::Low
        );
    }

    #[test]
    fn no_keyword_defaults_to_normal() {
        let p = classify("quarterly fan letter", NewsType::News, false, None, &kw());
        assert_eq!(p, Priority::Normal);
    }

    #[test]
    fn timing_upgrades_normal_to_high_or_urgent() {
        let timing = EventTiming {
            upcoming_event: true,
            ..Default::default()
        };
        let p = classify("fall tour dates", NewsType::Concert, false, Some(timing), &kw());
        assert_eq!(p, Priority::High);

        let p = classify("fall tour dates", NewsType::News, true, Some(timing), &kw());
        assert_eq!(p, Priority::Urgent);
    }

    #[test]
    fn timing_does_not_downgrade_or_touch_low() {
        let timing = EventTiming {
            recent_release: true,
            ..Default::default()
        };
        let p = classify("spotted in paris fashion week", NewsType::News, false, Some(timing), &kw());
        assert_eq!(p, Priority::Low);
    }

    #[test]
    fn recency_windows() {
        let now = Utc::now();
        assert!(is_recent_release(now - Duration::days(29), now));
        assert!(!is_recent_release(now - Duration::days(31), now));
        assert!(is_upcoming_event(now + Duration::days(10), now));
        assert!(!is_upcoming_event(now - Duration::days(1), now));
        assert!(!is_upcoming_event(now + Duration::days(45), now));
    }

    #[test]
    fn toml_config_overrides_seed() {
        let parsed: PriorityKeywords =
            toml::from_str("high = [\"Encore\"]\n").expect("parse inline toml");
        let parsed = parsed.normalized();
        assert_eq!(parsed.high, vec!["encore".to_string()]);
        // untouched tiers keep the seed
        assert!(parsed.medium.contains(&"tour".to_string()));
    }
}
