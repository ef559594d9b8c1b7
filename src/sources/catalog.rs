// src/sources/catalog.rs
//! Music-catalog adapter: client-credentials token exchange, artist search,
//! recent releases, normalized to `news_type = release`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Deserialize;

use crate::config::CatalogConfig;
use crate::model::{parse_event_date, ArtistQuery, NewsItem, NewsType, Source};
use crate::priority::{classify, is_recent_release, EventTiming, PriorityKeywords};
use crate::sources::{http_client, SourceAdapter};

/// Releases fetched per artist (full releases and singles combined).
const RELEASE_LIMIT: usize = 5;
/// Fallback validity when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
/// Refresh the token this long before its stated expiry.
const TOKEN_EXPIRY_SLACK_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    artists: Option<ArtistPage>,
}

#[derive(Debug, Deserialize)]
struct ArtistPage {
    #[serde(default)]
    items: Vec<CatalogArtist>,
}

#[derive(Debug, Deserialize)]
struct CatalogArtist {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AlbumsResponse {
    #[serde(default)]
    items: Vec<Album>,
}

#[derive(Debug, Deserialize)]
struct Album {
    id: String,
    name: String,
    album_type: String,
    release_date: Option<String>,
    total_tracks: Option<u32>,
    external_urls: Option<ExternalUrls>,
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

enum Mode {
    Http {
        client: reqwest::Client,
        token_url: String,
        api_base: String,
        client_id: String,
        client_secret: String,
        token_cache: Mutex<Option<CachedToken>>,
    },
    Fixture {
        search: String,
        albums: String,
    },
}

pub struct CatalogAdapter {
    mode: Mode,
    keywords: Arc<PriorityKeywords>,
}

impl CatalogAdapter {
    pub fn from_config(cfg: &CatalogConfig, keywords: Arc<PriorityKeywords>) -> Self {
        Self {
            mode: Mode::Http {
                client: http_client(),
                token_url: cfg.token_url.clone(),
                api_base: cfg.api_base.clone(),
                client_id: cfg.client_id.clone(),
                client_secret: cfg.client_secret.clone(),
                token_cache: Mutex::new(None),
            },
            keywords,
        }
    }

    /// Canned search + albums payloads instead of live HTTP.
    pub fn from_fixtures(search: &str, albums: &str, keywords: Arc<PriorityKeywords>) -> Self {
        Self {
            mode: Mode::Fixture {
                search: search.to_string(),
                albums: albums.to_string(),
            },
            keywords,
        }
    }

    fn items_from_albums(&self, albums: Vec<Album>, query: &ArtistQuery) -> Vec<NewsItem> {
        let now = Utc::now();
        let mut out = Vec::new();

        for album in albums.into_iter().take(RELEASE_LIMIT) {
            // dedupe key needs a source URL; skip catalog rows without one
            let Some(source_url) = album.external_urls.as_ref().and_then(|u| u.spotify.clone())
            else {
                continue;
            };

            let release_date_raw = album.release_date.clone().unwrap_or_default();
            let event_date = parse_event_date(&release_date_raw);
            let timing = EventTiming {
                recent_release: event_date.map(|d| is_recent_release(d, now)).unwrap_or(false),
                ..Default::default()
            };

            let title = format!("New {}: {}", album.album_type, album.name);
            let description = format!(
                "{} released {} on {}",
                query.artist_name, album.name, release_date_raw
            );
            let priority = classify(
                &format!("{} {}", title, description),
                NewsType::Release,
                query.is_followed,
                Some(timing),
                &self.keywords,
            );

            let mut metadata = BTreeMap::new();
            metadata.insert("catalog_id".to_string(), album.id.into());
            metadata.insert("album_type".to_string(), album.album_type.into());
            if let Some(tracks) = album.total_tracks {
                metadata.insert("total_tracks".to_string(), tracks.into());
            }

            out.push(NewsItem {
                artist_id: query.artist_id.clone(),
                artist_name: query.artist_name.clone(),
                title,
                description,
                source: Source::Catalog,
                source_url,
                image_url: album.images.first().map(|i| i.url.clone()),
                news_type: NewsType::Release,
                priority,
                event_date,
                metadata,
            });
        }

        counter!("source_events_total").increment(out.len() as u64);
        out
    }

    async fn access_token(
        &self,
        client: &reqwest::Client,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        token_cache: &Mutex<Option<CachedToken>>,
    ) -> Result<String> {
        let now = Utc::now();
        {
            let cached = token_cache.lock().expect("token cache mutex poisoned");
            if let Some(token) = cached.as_ref() {
                if token.expires_at - Duration::seconds(TOKEN_EXPIRY_SLACK_SECS) > now {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let resp: TokenResponse = client
            .post(token_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("catalog token request")?
            .error_for_status()
            .context("catalog token status")?
            .json()
            .await
            .context("catalog token body")?;

        let ttl = resp.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        let token = CachedToken {
            access_token: resp.access_token.clone(),
            expires_at: now + Duration::seconds(ttl),
        };
        *token_cache.lock().expect("token cache mutex poisoned") = Some(token);
        Ok(resp.access_token)
    }
}

#[async_trait]
impl SourceAdapter for CatalogAdapter {
    fn source(&self) -> Source {
        Source::Catalog
    }

    async fn fetch(&self, query: &ArtistQuery) -> Result<Vec<NewsItem>> {
        match &self.mode {
            Mode::Fixture { search, albums } => {
                let search: SearchResponse =
                    serde_json::from_str(search).context("parsing catalog search fixture")?;
                if artist_id_from_search(&search).is_none() {
                    return Ok(Vec::new());
                }
                let albums: AlbumsResponse =
                    serde_json::from_str(albums).context("parsing catalog albums fixture")?;
                Ok(self.items_from_albums(albums.items, query))
            }
            Mode::Http {
                client,
                token_url,
                api_base,
                client_id,
                client_secret,
                token_cache,
            } => {
                let token = self
                    .access_token(client, token_url, client_id, client_secret, token_cache)
                    .await?;

                let search: SearchResponse = client
                    .get(format!("{}/search", api_base))
                    .query(&[
                        ("q", query.artist_name.as_str()),
                        ("type", "artist"),
                        ("limit", "1"),
                    ])
                    .bearer_auth(&token)
                    .send()
                    .await
                    .context("catalog artist search")?
                    .error_for_status()
                    .context("catalog search status")?
                    .json()
                    .await
                    .context("catalog search body")?;

                let Some(artist_id) = artist_id_from_search(&search) else {
                    return Ok(Vec::new());
                };

                let limit = RELEASE_LIMIT.to_string();
                let albums: AlbumsResponse = client
                    .get(format!("{}/artists/{}/albums", api_base, artist_id))
                    .query(&[
                        ("include_groups", "album,single"),
                        ("limit", limit.as_str()),
                    ])
                    .bearer_auth(&token)
                    .send()
                    .await
                    .context("catalog releases request")?
                    .error_for_status()
                    .context("catalog releases status")?
                    .json()
                    .await
                    .context("catalog releases body")?;

                Ok(self.items_from_albums(albums.items, query))
            }
        }
    }
}

fn artist_id_from_search(search: &SearchResponse) -> Option<&str> {
    search
        .artists
        .as_ref()
        .and_then(|page| page.items.first())
        .map(|artist| artist.id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;

    const SEARCH: &str = r#"{"artists":{"items":[{"id":"artist-1","name":"IVE"}]}}"#;

    fn album_json(release_date: &str) -> String {
        format!(
            r#"{{"items":[{{
                "id":"alb-1","name":"After Like","album_type":"single",
                "release_date":"{release_date}","total_tracks":2,
                "external_urls":{{"spotify":"https://open.spotify.test/album/alb-1"}},
                "images":[{{"url":"https://img.test/alb-1.jpg"}}]
            }}]}}"#
        )
    }

    fn query(followed: bool) -> ArtistQuery {
        ArtistQuery {
            artist_name: "IVE".into(),
            artist_id: Some("ive-1".into()),
            is_followed: followed,
        }
    }

    #[tokio::test]
    async fn recent_release_maps_to_high_priority_release_item() {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let adapter = CatalogAdapter::from_fixtures(
            SEARCH,
            &album_json(&today),
            Arc::new(PriorityKeywords::default()),
        );
        let items = adapter.fetch(&query(false)).await.unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.source, Source::Catalog);
        assert_eq!(item.news_type, NewsType::Release);
        assert!(matches!(item.priority, Priority::High | Priority::Urgent));
        assert_eq!(item.metadata["album_type"], "single");
        assert!(item.event_date.is_some());
    }

    #[tokio::test]
    async fn followed_artist_release_is_urgent() {
        let adapter = CatalogAdapter::from_fixtures(
            SEARCH,
            &album_json("2020-01-01"),
            Arc::new(PriorityKeywords::default()),
        );
        let items = adapter.fetch(&query(true)).await.unwrap();
        assert_eq!(items[0].priority, Priority::Urgent);
    }

    #[tokio::test]
    async fn unknown_artist_yields_no_items() {
        let adapter = CatalogAdapter::from_fixtures(
            r#"{"artists":{"items":[]}}"#,
            &album_json("2020-01-01"),
            Arc::new(PriorityKeywords::default()),
        );
        assert!(adapter.fetch(&query(false)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn albums_without_urls_are_skipped() {
        let albums = r#"{"items":[{"id":"a","name":"X","album_type":"album"}]}"#;
        let adapter =
            CatalogAdapter::from_fixtures(SEARCH, albums, Arc::new(PriorityKeywords::default()));
        assert!(adapter.fetch(&query(false)).await.unwrap().is_empty());
    }
}
