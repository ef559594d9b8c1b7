// src/sources/ticketing.rs
//! Ticketing adapter: events-discovery search by artist keyword, normalized
//! to `news_type = concert` with venue/price metadata.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use serde::Deserialize;

use crate::config::TicketingConfig;
use crate::model::{parse_event_date, ArtistQuery, NewsItem, NewsType, Source};
use crate::priority::{classify, is_upcoming_event, EventTiming, PriorityKeywords};
use crate::sources::{http_client, SourceAdapter};

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(rename = "_embedded")]
    embedded: Option<Embedded>,
}

#[derive(Debug, Deserialize)]
struct Embedded {
    #[serde(default)]
    events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct Event {
    id: String,
    name: String,
    url: Option<String>,
    #[serde(default)]
    images: Vec<Image>,
    dates: Option<Dates>,
    sales: Option<Sales>,
    #[serde(rename = "priceRanges", default)]
    price_ranges: Vec<serde_json::Value>,
    #[serde(rename = "_embedded")]
    embedded: Option<EventEmbedded>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

#[derive(Debug, Deserialize)]
struct Dates {
    start: Option<Start>,
}

#[derive(Debug, Deserialize)]
struct Start {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    #[serde(rename = "localDate")]
    local_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Sales {
    public: Option<PublicSale>,
    #[serde(default)]
    presales: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PublicSale {
    #[serde(rename = "startDateTime")]
    start_date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventEmbedded {
    #[serde(default)]
    venues: Vec<Venue>,
}

#[derive(Debug, Deserialize)]
struct Venue {
    name: Option<String>,
    city: Option<Named>,
    country: Option<Named>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: Option<String>,
}

enum Mode {
    Http {
        client: reqwest::Client,
        api_base: String,
        api_key: String,
        city: Option<String>,
        page_size: usize,
    },
    Fixture(String),
}

pub struct TicketingAdapter {
    mode: Mode,
    keywords: Arc<PriorityKeywords>,
}

impl TicketingAdapter {
    pub fn from_config(cfg: &TicketingConfig, keywords: Arc<PriorityKeywords>) -> Self {
        Self {
            mode: Mode::Http {
                client: http_client(),
                api_base: cfg.api_base.clone(),
                api_key: cfg.api_key.clone(),
                city: cfg.city.clone(),
                page_size: cfg.page_size,
            },
            keywords,
        }
    }

    pub fn from_fixture(events: &str, keywords: Arc<PriorityKeywords>) -> Self {
        Self {
            mode: Mode::Fixture(events.to_string()),
            keywords,
        }
    }

    fn items_from_events(&self, events: Vec<Event>, query: &ArtistQuery) -> Vec<NewsItem> {
        let now = Utc::now();
        let mut out = Vec::new();

        for event in events {
            let Some(source_url) = event.url.filter(|u| !u.trim().is_empty()) else {
                continue;
            };

            let start = event.dates.as_ref().and_then(|d| d.start.as_ref());
            let event_date = start
                .and_then(|s| s.date_time.as_deref().or(s.local_date.as_deref()))
                .and_then(parse_event_date);

            let presale_active = event
                .sales
                .as_ref()
                .map(|s| !s.presales.is_empty())
                .unwrap_or(false);
            let timing = EventTiming {
                upcoming_event: event_date.map(|d| is_upcoming_event(d, now)).unwrap_or(false),
                presale_active,
                ..Default::default()
            };

            let venue = event
                .embedded
                .as_ref()
                .and_then(|e| e.venues.first());
            let venue_name = venue.and_then(|v| v.name.as_deref()).unwrap_or("TBA");
            let venue_city = venue
                .and_then(|v| v.city.as_ref())
                .and_then(|c| c.name.as_deref())
                .unwrap_or("TBA");

            let title = format!("Concert: {}", event.name);
            let description = format!(
                "{} concert at {} in {}",
                query.artist_name, venue_name, venue_city
            );
            let priority = classify(
                &format!("{} {}", title, description),
                NewsType::Concert,
                query.is_followed,
                Some(timing),
                &self.keywords,
            );

            let mut metadata = BTreeMap::new();
            metadata.insert("ticketing_id".to_string(), event.id.clone().into());
            metadata.insert("venue_name".to_string(), venue_name.into());
            metadata.insert("venue_city".to_string(), venue_city.into());
            if let Some(country) = venue
                .and_then(|v| v.country.as_ref())
                .and_then(|c| c.name.as_deref())
            {
                metadata.insert("venue_country".to_string(), country.into());
            }
            if let Some(sale_start) = event
                .sales
                .as_ref()
                .and_then(|s| s.public.as_ref())
                .and_then(|p| p.start_date_time.as_deref())
            {
                metadata.insert("sale_start".to_string(), sale_start.into());
            }
            if let Some(price_range) = event.price_ranges.first() {
                metadata.insert("price_range".to_string(), price_range.clone());
            }

            out.push(NewsItem {
                artist_id: query.artist_id.clone(),
                artist_name: query.artist_name.clone(),
                title,
                description,
                source: Source::Ticketing,
                source_url,
                image_url: event.images.first().map(|i| i.url.clone()),
                news_type: NewsType::Concert,
                priority,
                event_date,
                metadata,
            });
        }

        counter!("source_events_total").increment(out.len() as u64);
        out
    }
}

#[async_trait]
impl SourceAdapter for TicketingAdapter {
    fn source(&self) -> Source {
        Source::Ticketing
    }

    async fn fetch(&self, query: &ArtistQuery) -> Result<Vec<NewsItem>> {
        match &self.mode {
            Mode::Fixture(body) => {
                let resp: EventsResponse =
                    serde_json::from_str(body).context("parsing ticketing fixture")?;
                let events = resp.embedded.map(|e| e.events).unwrap_or_default();
                Ok(self.items_from_events(events, query))
            }
            Mode::Http {
                client,
                api_base,
                api_key,
                city,
                page_size,
            } => {
                let size = page_size.to_string();
                let mut params = vec![
                    ("keyword", query.artist_name.as_str()),
                    ("apikey", api_key.as_str()),
                    ("size", size.as_str()),
                    ("sort", "date,asc"),
                ];
                if let Some(city) = city.as_deref() {
                    params.push(("city", city));
                }

                let resp: EventsResponse = client
                    .get(format!("{}/events.json", api_base))
                    .query(&params)
                    .send()
                    .await
                    .context("ticketing events request")?
                    .error_for_status()
                    .context("ticketing events status")?
                    .json()
                    .await
                    .context("ticketing events body")?;

                let events = resp.embedded.map(|e| e.events).unwrap_or_default();
                Ok(self.items_from_events(events, query))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;

    fn events_json(start_date: &str, presales: &str) -> String {
        format!(
            r#"{{"_embedded":{{"events":[{{
                "id":"ev-1","name":"IVE World Tour - Seoul",
                "url":"https://tickets.test/ev-1",
                "images":[{{"url":"https://img.test/ev-1.jpg"}}],
                "dates":{{"start":{{"dateTime":"{start_date}"}}}},
                "sales":{{"public":{{"startDateTime":"2025-07-01T10:00:00Z"}},"presales":{presales}}},
                "priceRanges":[{{"min":55.0,"max":250.0,"currency":"USD"}}],
                "_embedded":{{"venues":[{{"name":"KSPO Dome","city":{{"name":"Seoul"}},"country":{{"name":"South Korea"}}}}]}}
            }}]}}}}"#
        )
    }

    fn query(followed: bool) -> ArtistQuery {
        ArtistQuery {
            artist_name: "IVE".into(),
            artist_id: None,
            is_followed: followed,
        }
    }

    fn adapter(body: &str) -> TicketingAdapter {
        TicketingAdapter::from_fixture(body, Arc::new(PriorityKeywords::default()))
    }

    #[tokio::test]
    async fn upcoming_event_maps_to_high_priority_concert() {
        let soon = (Utc::now() + chrono::Duration::days(10)).to_rfc3339();
        let items = adapter(&events_json(&soon, "[]")).fetch(&query(false)).await.unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.source, Source::Ticketing);
        assert_eq!(item.news_type, NewsType::Concert);
        assert_eq!(item.priority, Priority::High);
        assert_eq!(item.metadata["venue_city"], "Seoul");
        assert_eq!(item.metadata["sale_start"], "2025-07-01T10:00:00Z");
        assert!(item.metadata.contains_key("price_range"));
    }

    #[tokio::test]
    async fn followed_artist_concert_is_urgent() {
        let soon = (Utc::now() + chrono::Duration::days(10)).to_rfc3339();
        let items = adapter(&events_json(&soon, "[]")).fetch(&query(true)).await.unwrap();
        assert_eq!(items[0].priority, Priority::Urgent);
    }

    #[tokio::test]
    async fn presale_escalates_far_future_event() {
        let far = (Utc::now() + chrono::Duration::days(120)).to_rfc3339();
        let with_presale = adapter(&events_json(&far, r#"[{"name":"Fanclub presale"}]"#));
        let items = with_presale.fetch(&query(false)).await.unwrap();
        assert_eq!(items[0].priority, Priority::High);
    }

    #[tokio::test]
    async fn empty_response_yields_no_items() {
        let items = adapter("{}").fetch(&query(false)).await.unwrap();
        assert!(items.is_empty());
    }
}
