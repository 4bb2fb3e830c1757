//! Shared catalog of Discogs releases
//!
//! One record per Discogs release id, reused by every user who owns a copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One track of a release's track listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub position: String,
    pub title: String,
    pub duration: Option<String>,
}

/// Label with the catalog number it issued the release under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelCredit {
    pub name: String,
    pub catalog_number: Option<String>,
}

/// Deduplicated release record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRecord {
    pub id: Uuid,
    /// None for manually entered records
    pub discogs_id: Option<u64>,
    pub title: String,
    pub artist: String,
    pub year: Option<i32>,
    pub cover_image: Option<String>,
    pub styles: Vec<String>,
    pub tracklist: Vec<Track>,
    pub labels: Vec<LabelCredit>,
    pub created_at: DateTime<Utc>,
}

impl CatalogRecord {
    /// Create a record for a Discogs release, with a fresh local id
    pub fn from_discogs(discogs_id: u64, title: String, artist: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            discogs_id: Some(discogs_id),
            title,
            artist,
            year: None,
            cover_image: None,
            styles: Vec::new(),
            tracklist: Vec::new(),
            labels: Vec::new(),
            created_at: Utc::now(),
        }
    }
}
