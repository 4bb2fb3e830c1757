//! External catalog service seam
//!
//! The Row Matcher only talks to the catalog through [`CatalogService`], so
//! the Discogs client can be replaced by a scripted mock in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{LabelCredit, PhysicalFormat, Track};

/// Catalog lookup errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("release not found")]
    NotFound,

    #[error("rate limited by Discogs after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Discogs rejected the configured credentials")]
    InvalidCredentials,

    #[error("network error: {0}")]
    Network(String),

    #[error("Discogs API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected Discogs response: {0}")]
    Parse(String),
}

/// Free-text release search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub artist: String,
    pub album: String,
    pub format: PhysicalFormat,
}

impl SearchQuery {
    /// Text sent as the `q` parameter
    pub fn text(&self) -> String {
        format!("{} {}", self.artist, self.album)
    }
}

/// One search result, in the service's ranking order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: u64,
    /// Discogs search titles read "Artist - Album"
    pub title: String,
    pub year: Option<i32>,
    pub cover_image: Option<String>,
}

/// Format block of a release ("Vinyl", "LP, Album", "180g")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseFormat {
    pub name: String,
    pub text: Option<String>,
    pub descriptions: Vec<String>,
}

/// Full release details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseDetails {
    pub id: u64,
    pub title: String,
    pub artists: Vec<String>,
    pub year: Option<i32>,
    pub cover_image: Option<String>,
    pub styles: Vec<String>,
    pub tracklist: Vec<Track>,
    pub labels: Vec<LabelCredit>,
    pub formats: Vec<ReleaseFormat>,
}

impl ReleaseDetails {
    /// Artist credit as displayed, e.g. "Simon & Garfunkel"
    pub fn primary_artist(&self) -> String {
        if self.artists.is_empty() {
            "Unknown Artist".to_string()
        } else {
            self.artists.join(", ")
        }
    }
}

/// Search and fetch operations of the external catalog
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Search releases; an empty list means no match
    async fn search_releases(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, CatalogError>;

    /// Fetch one release by its catalog id
    async fn fetch_release(&self, id: u64) -> Result<ReleaseDetails, CatalogError>;
}
