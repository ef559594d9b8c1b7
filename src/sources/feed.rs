// src/sources/feed.rs
//! RSS feed adapter: fetches a fixed list of K-pop news feeds, keeps the
//! items that mention the artist, and normalizes them to `news_type = news`.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::warn;

use crate::model::{ArtistQuery, NewsItem, NewsType, Source};
use crate::priority::{classify, PriorityKeywords};
use crate::sources::{
    host_of, http_client, normalize_text, parse_rfc2822, truncate_chars, SourceAdapter,
    MAX_DESCRIPTION_CHARS,
};

/// Matching items kept per feed.
const MAX_ITEMS_PER_FEED: usize = 3;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

enum Mode {
    Http {
        client: reqwest::Client,
        feed_urls: Vec<String>,
    },
    // (feed_url, xml body) pairs standing in for live feeds
    Fixture(Vec<(String, String)>),
}

pub struct FeedAdapter {
    mode: Mode,
    keywords: Arc<PriorityKeywords>,
}

impl FeedAdapter {
    pub fn from_config(feed_urls: Vec<String>, keywords: Arc<PriorityKeywords>) -> Self {
        Self {
            mode: Mode::Http {
                client: http_client(),
                feed_urls,
            },
            keywords,
        }
    }

    pub fn from_fixtures(feeds: Vec<(String, String)>, keywords: Arc<PriorityKeywords>) -> Self {
        Self {
            mode: Mode::Fixture(feeds),
            keywords,
        }
    }

    fn items_from_xml(&self, feed_url: &str, xml: &str, query: &ArtistQuery) -> Result<Vec<NewsItem>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

        let needle = query.artist_name.to_lowercase();
        let mut out = Vec::new();

        for it in rss.channel.item {
            if out.len() >= MAX_ITEMS_PER_FEED {
                break;
            }

            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            let description_full = normalize_text(it.description.as_deref().unwrap_or_default());
            let content = format!("{} {}", title, description_full);
            if !content.to_lowercase().contains(&needle) {
                continue;
            }

            let Some(link) = it.link.filter(|l| !l.trim().is_empty()) else {
                continue;
            };

            let priority = classify(&content, NewsType::News, query.is_followed, None, &self.keywords);

            let mut metadata = std::collections::BTreeMap::new();
            metadata.insert("feed_source".to_string(), host_of(feed_url).into());

            out.push(NewsItem {
                artist_id: query.artist_id.clone(),
                artist_name: query.artist_name.clone(),
                title,
                description: truncate_chars(&description_full, MAX_DESCRIPTION_CHARS),
                source: Source::Feed,
                source_url: link,
                image_url: None,
                news_type: NewsType::News,
                priority,
                event_date: it.pub_date.as_deref().and_then(parse_rfc2822),
                metadata,
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("feed_parse_ms").record(ms);
        counter!("source_events_total").increment(out.len() as u64);
        Ok(out)
    }

    fn collect(&self, bodies: &[(String, String)], query: &ArtistQuery) -> Vec<NewsItem> {
        let mut all = Vec::new();
        for (feed_url, body) in bodies {
            match self.items_from_xml(feed_url, body, query) {
                Ok(mut items) => all.append(&mut items),
                Err(error) => {
                    // one broken feed must not sink the others
                    warn!(target: "sources", feed = %feed_url, ?error, "feed parse error");
                    counter!("source_provider_errors_total").increment(1);
                }
            }
        }
        all
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    fn source(&self) -> Source {
        Source::Feed
    }

    async fn fetch(&self, query: &ArtistQuery) -> Result<Vec<NewsItem>> {
        match &self.mode {
            Mode::Fixture(feeds) => Ok(self.collect(feeds, query)),
            Mode::Http { client, feed_urls } => {
                let mut bodies = Vec::with_capacity(feed_urls.len());
                for url in feed_urls {
                    let body = match client.get(url).send().await {
                        Ok(resp) => match resp.text().await {
                            Ok(text) => text,
                            Err(error) => {
                                warn!(target: "sources", feed = %url, ?error, "feed body error");
                                counter!("source_provider_errors_total").increment(1);
                                continue;
                            }
                        },
                        Err(error) => {
                            warn!(target: "sources", feed = %url, ?error, "feed http error");
                            counter!("source_provider_errors_total").increment(1);
                            continue;
                        }
                    };
                    bodies.push((url.clone(), body));
                }
                Ok(self.collect(&bodies, query))
            }
        }
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;

    const FEED_URL: &str = "https://www.soompi.com/feed";

    fn adapter(xml: &str) -> FeedAdapter {
        FeedAdapter::from_fixtures(
            vec![(FEED_URL.to_string(), xml.to_string())],
            Arc::new(PriorityKeywords::default()),
        )
    }

    fn query() -> ArtistQuery {
        ArtistQuery {
            artist_name: "IVE".into(),
            artist_id: None,
            is_followed: false,
        }
    }

    fn rss(items: &str) -> String {
        format!(
            "<rss version=\"2.0\"><channel><title>Feed</title>{}</channel></rss>",
            items
        )
    }

    fn item(title: &str, link: &str) -> String {
        format!(
            "<item><title>{}</title><link>{}</link>\
             <pubDate>Mon, 04 Aug 2025 09:00:00 +0000</pubDate>\
             <description>body text</description></item>",
            title, link
        )
    }

    #[tokio::test]
    async fn keeps_only_items_mentioning_the_artist() {
        let xml = rss(&format!(
            "{}{}",
            item("IVE announces comeback album", "https://n.test/1"),
            item("Some other group news", "https://n.test/2"),
        ));
        let items = adapter(&xml).fetch(&query()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source, Source::Feed);
        assert_eq!(items[0].news_type, NewsType::News);
        assert_eq!(items[0].priority, Priority::High);
        assert_eq!(items[0].metadata["feed_source"], "www.soompi.com");
        assert!(items[0].event_date.is_some());
    }

    #[tokio::test]
    async fn caps_items_per_feed() {
        let many: String = (0..6)
            .map(|i| item("IVE fan content", &format!("https://n.test/{i}")))
            .collect();
        let items = adapter(&rss(&many)).fetch(&query()).await.unwrap();
        assert_eq!(items.len(), MAX_ITEMS_PER_FEED);
    }

    #[tokio::test]
    async fn strips_html_and_truncates_description() {
        let long_desc = "word ".repeat(200);
        let xml = rss(&format!(
            "<item><title>IVE interview</title><link>https://n.test/1</link>\
             <description>&lt;p&gt;{}&lt;/p&gt;</description></item>",
            long_desc
        ));
        let items = adapter(&xml).fetch(&query()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(!items[0].description.contains('<'));
        assert!(items[0].description.chars().count() <= MAX_DESCRIPTION_CHARS);
    }

    #[tokio::test]
    async fn broken_feed_xml_yields_empty_not_error() {
        let items = adapter("this is not xml").fetch(&query()).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn items_without_links_are_skipped() {
        let xml = rss("<item><title>IVE something</title><description>x</description></item>");
        let items = adapter(&xml).fetch(&query()).await.unwrap();
        assert!(items.is_empty());
    }
}
