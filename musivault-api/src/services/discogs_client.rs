//! Discogs API client
//!
//! Search and release lookups with a shared rate limiter. One client is
//! shared by every import job, so the limit holds per credential across
//! concurrent jobs.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::catalog_service::{
    CatalogError, CatalogService, ReleaseDetails, ReleaseFormat, SearchHit, SearchQuery,
};
use crate::models::{LabelCredit, Track};
use musivault_common::config::DiscogsConfig;

pub const DISCOGS_BASE_URL: &str = "https://api.discogs.com";

/// Search results requested per query
const SEARCH_PAGE_SIZE: &str = "25";

/// Client settings
#[derive(Debug, Clone)]
pub struct DiscogsClientConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub user_agent: String,
    pub min_request_interval: Duration,
    pub max_retries: u32,
    pub retry_wait: Duration,
    pub request_timeout: Duration,
}

impl DiscogsClientConfig {
    /// Build from the `[discogs]` config section; credentials are required
    pub fn from_config(config: &DiscogsConfig) -> musivault_common::Result<Self> {
        let consumer_key = config
            .consumer_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                musivault_common::Error::Config(
                    "Discogs consumer key not configured. Set MUSIVAULT_DISCOGS_KEY or \
                     [discogs] consumer_key in config.toml"
                        .to_string(),
                )
            })?;
        let consumer_secret = config
            .consumer_secret
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                musivault_common::Error::Config(
                    "Discogs consumer secret not configured. Set MUSIVAULT_DISCOGS_SECRET or \
                     [discogs] consumer_secret in config.toml"
                        .to_string(),
                )
            })?;

        Ok(Self {
            base_url: DISCOGS_BASE_URL.to_string(),
            consumer_key,
            consumer_secret,
            user_agent: config.user_agent.clone(),
            min_request_interval: Duration::from_millis(config.min_request_interval_ms),
            max_retries: config.max_retries,
            retry_wait: Duration::from_millis(config.retry_wait_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: u64,
    title: String,
    year: Option<String>,
    cover_image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    id: u64,
    title: String,
    #[serde(default)]
    artists: Vec<ArtistResponse>,
    year: Option<i32>,
    #[serde(default)]
    images: Vec<ImageResponse>,
    #[serde(default)]
    styles: Vec<String>,
    #[serde(default)]
    tracklist: Vec<TrackResponse>,
    #[serde(default)]
    labels: Vec<LabelResponse>,
    #[serde(default)]
    formats: Vec<FormatResponse>,
}

#[derive(Debug, Deserialize)]
struct ArtistResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(rename = "type")]
    image_type: String,
    uri: String,
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    position: String,
    title: String,
    duration: Option<String>,
    #[serde(rename = "type_")]
    track_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    name: String,
    catno: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FormatResponse {
    name: String,
    text: Option<String>,
    #[serde(default)]
    descriptions: Vec<String>,
}

/// Strip Discogs disambiguation from an artist name: "Nirvana (2)" → "Nirvana",
/// "Prince*" → "Prince"
pub fn clean_artist_name(name: &str) -> String {
    let mut name = name.trim().trim_end_matches('*').trim_end();
    if let Some(open) = name.rfind(" (") {
        let suffix = &name[open + 2..];
        if let Some(digits) = suffix.strip_suffix(')') {
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                name = name[..open].trim_end();
            }
        }
    }
    name.to_string()
}

fn parse_year(value: &str) -> Option<i32> {
    value.trim().parse::<i32>().ok().filter(|year| *year > 0)
}

impl From<SearchResult> for SearchHit {
    fn from(result: SearchResult) -> Self {
        SearchHit {
            id: result.id,
            title: result.title,
            year: result.year.as_deref().and_then(parse_year),
            cover_image: result.cover_image.filter(|uri| !uri.is_empty()),
        }
    }
}

impl From<ReleaseResponse> for ReleaseDetails {
    fn from(release: ReleaseResponse) -> Self {
        let cover_image = release
            .images
            .iter()
            .find(|img| img.image_type == "primary")
            .or_else(|| release.images.first())
            .map(|img| img.uri.clone());

        ReleaseDetails {
            id: release.id,
            title: release.title,
            artists: release
                .artists
                .iter()
                .map(|a| clean_artist_name(&a.name))
                .collect(),
            year: release.year.filter(|year| *year > 0),
            cover_image,
            styles: release.styles,
            tracklist: release
                .tracklist
                .into_iter()
                // Headings and index entries carry no playable track
                .filter(|t| t.track_type.as_deref().map_or(true, |kind| kind == "track"))
                .map(|t| Track {
                    position: t.position,
                    title: t.title,
                    duration: t.duration.filter(|d| !d.is_empty()),
                })
                .collect(),
            labels: release
                .labels
                .into_iter()
                .map(|l| LabelCredit {
                    name: l.name,
                    catalog_number: l.catno.filter(|c| !c.is_empty() && c != "none"),
                })
                .collect(),
            formats: release
                .formats
                .into_iter()
                .map(|f| ReleaseFormat {
                    name: f.name,
                    text: f.text.filter(|t| !t.is_empty()),
                    descriptions: f.descriptions,
                })
                .collect(),
        }
    }
}

/// Discogs database API client
pub struct DiscogsClient {
    http_client: reqwest::Client,
    base_url: String,
    auth_header: String,
    rate_limiter: Option<DefaultDirectRateLimiter>,
    max_retries: u32,
    retry_wait: Duration,
}

impl DiscogsClient {
    pub fn new(config: DiscogsClientConfig) -> Result<Self, CatalogError> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        // A zero interval disables throttling
        let rate_limiter = Quota::with_period(config.min_request_interval).map(RateLimiter::direct);

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_header: format!(
                "Discogs key={}, secret={}",
                config.consumer_key, config.consumer_secret
            ),
            rate_limiter,
            max_retries: config.max_retries,
            retry_wait: config.retry_wait,
        })
    }

    /// GET a JSON resource, honoring the rate limit and retrying 429s
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CatalogError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            if let Some(limiter) = &self.rate_limiter {
                limiter.until_ready().await;
            }

            tracing::debug!(url = %url, attempt, "Querying Discogs API");

            let response = self
                .http_client
                .get(&url)
                .query(query)
                .header(AUTHORIZATION, &self.auth_header)
                .send()
                .await
                .map_err(|e| CatalogError::Network(e.to_string()))?;

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt > self.max_retries {
                    tracing::warn!(url = %url, attempts = attempt, "Discogs rate limit retries exhausted");
                    return Err(CatalogError::RateLimited { attempts: attempt });
                }
                tracing::warn!(
                    url = %url,
                    attempt,
                    retry_wait_ms = self.retry_wait.as_millis() as u64,
                    "Discogs rate limit hit, retrying"
                );
                tokio::time::sleep(self.retry_wait).await;
                continue;
            }

            if status == StatusCode::NOT_FOUND {
                return Err(CatalogError::NotFound);
            }

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(CatalogError::InvalidCredentials);
            }

            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(CatalogError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let body = response
                .text()
                .await
                .map_err(|e| CatalogError::Network(e.to_string()))?;
            return serde_json::from_str(&body).map_err(|e| CatalogError::Parse(e.to_string()));
        }
    }
}

#[async_trait]
impl CatalogService for DiscogsClient {
    async fn search_releases(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, CatalogError> {
        let text = query.text();
        let response: SearchResponse = self
            .get_json(
                "/database/search",
                &[
                    ("q", text.as_str()),
                    ("type", "release"),
                    ("format", query.format.as_str()),
                    ("per_page", SEARCH_PAGE_SIZE),
                ],
            )
            .await?;

        tracing::debug!(query = %text, results = response.results.len(), "Discogs search returned");

        Ok(response.results.into_iter().map(SearchHit::from).collect())
    }

    async fn fetch_release(&self, id: u64) -> Result<ReleaseDetails, CatalogError> {
        let release: ReleaseResponse = self.get_json(&format!("/releases/{}", id), &[]).await?;

        tracing::info!(
            discogs_id = release.id,
            title = %release.title,
            "Retrieved release from Discogs"
        );

        Ok(release.into())
    }
}
