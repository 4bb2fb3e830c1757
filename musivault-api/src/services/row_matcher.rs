//! Row Matcher
//!
//! Resolves one CSV row to a catalog record:
//! 1. Validate the row shape (no network call)
//! 2. Explicit external id: fetch that release, never fall back to search
//! 3. Otherwise search "artist album" filtered by format and pick a candidate
//! 4. Fetch the candidate's details and insert-or-fetch its catalog record
//!
//! Collection entries are not created here; the orchestrator writes them in
//! the same transaction as the row's log entry.

use std::sync::Arc;

use thiserror::Error;

use crate::models::{
    CatalogRecord, Condition, EntryStatus, FormatDescriptor, ImportRow, PhysicalFormat,
};
use crate::services::catalog_service::{
    CatalogError, CatalogService, ReleaseDetails, SearchHit, SearchQuery,
};
use crate::services::discogs_client::clean_artist_name;
use crate::services::import_store::ImportStore;

/// Reason recorded for rows whose search returned nothing
pub const NO_MATCH_REASON: &str = "no match found";

/// Earliest year accepted as a hint (first commercial recordings)
pub const MIN_YEAR: i32 = 1877;
pub const MAX_YEAR: i32 = 2100;

/// Why a row did not produce a collection entry
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MatchError {
    /// Bad row shape; the row fails without any lookup
    #[error("{0}")]
    Validation(String),

    /// Search returned no results; the row is skipped
    #[error("{0}")]
    NotFound(String),

    /// Catalog service failed or the requested release is missing
    #[error("{0}")]
    Lookup(String),

    /// Catalog record could not be stored; fatal for the job
    #[error("{0}")]
    Persistence(String),
}

impl MatchError {
    /// Entry status for row-level outcomes, None for fatal errors
    pub fn entry_status(&self) -> Option<EntryStatus> {
        match self {
            MatchError::Validation(_) | MatchError::Lookup(_) => Some(EntryStatus::Failed),
            MatchError::NotFound(_) => Some(EntryStatus::Skipped),
            MatchError::Persistence(_) => None,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            MatchError::Validation(reason)
            | MatchError::NotFound(reason)
            | MatchError::Lookup(reason)
            | MatchError::Persistence(reason) => reason,
        }
    }
}

/// Row after shape validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    pub artist: String,
    pub album: String,
    pub format: PhysicalFormat,
    pub year: Option<i32>,
    pub external_id: Option<u64>,
    pub media_condition: Option<Condition>,
    pub sleeve_condition: Option<Condition>,
}

/// Successful match
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRelease {
    /// Stored record, possibly created by an earlier import
    pub record: CatalogRecord,
    pub format: FormatDescriptor,
    pub media_condition: Option<Condition>,
    pub sleeve_condition: Option<Condition>,
}

/// Parse a Discogs release id: "123", "r123" or "[r123]"
pub fn parse_external_id(value: &str) -> Option<u64> {
    let value = value.trim();
    let value = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value)
        .trim();
    let digits = value
        .strip_prefix('r')
        .or_else(|| value.strip_prefix('R'))
        .unwrap_or(value);

    digits.parse::<u64>().ok().filter(|id| *id > 0)
}

fn parse_condition(label: &str, value: Option<&str>) -> Result<Option<Condition>, MatchError> {
    match value {
        None => Ok(None),
        Some(raw) => Condition::parse(raw).map(Some).ok_or_else(|| {
            MatchError::Validation(format!(
                "invalid {} condition '{}': expected M, NM, VG+, VG, G+, G, F or P",
                label, raw
            ))
        }),
    }
}

/// Check a row's shape before any lookup
pub fn validate_row(row: &ImportRow) -> Result<ValidatedRow, MatchError> {
    if row.artist.trim().is_empty() {
        return Err(MatchError::Validation("missing artist".to_string()));
    }
    if row.album.trim().is_empty() {
        return Err(MatchError::Validation("missing album".to_string()));
    }
    if row.format.trim().is_empty() {
        return Err(MatchError::Validation("missing format".to_string()));
    }

    let format = PhysicalFormat::parse(&row.format).ok_or_else(|| {
        MatchError::Validation(format!(
            "invalid format '{}': expected Vinyl or CD",
            row.format
        ))
    })?;

    let year = match row.year.as_deref() {
        None => None,
        Some(raw) => match raw.trim().parse::<i32>() {
            Ok(year) if (MIN_YEAR..=MAX_YEAR).contains(&year) => Some(year),
            _ => {
                return Err(MatchError::Validation(format!(
                    "invalid year '{}': expected a year between {} and {}",
                    raw, MIN_YEAR, MAX_YEAR
                )))
            }
        },
    };

    let external_id = match row.external_id.as_deref() {
        None => None,
        Some(raw) => Some(parse_external_id(raw).ok_or_else(|| {
            MatchError::Validation(format!(
                "invalid external id '{}': expected a Discogs release id",
                raw
            ))
        })?),
    };

    Ok(ValidatedRow {
        artist: row.artist.trim().to_string(),
        album: row.album.trim().to_string(),
        format,
        year,
        external_id,
        media_condition: parse_condition("media", row.media_condition.as_deref())?,
        sleeve_condition: parse_condition("sleeve", row.sleeve_condition.as_deref())?,
    })
}

fn is_exact_match(hit: &SearchHit, artist: &str, album: &str) -> bool {
    let Some((hit_artist, hit_title)) = hit.title.split_once(" - ") else {
        return false;
    };

    clean_artist_name(hit_artist).to_lowercase() == clean_artist_name(artist).to_lowercase()
        && hit_title.trim().to_lowercase() == album.trim().to_lowercase()
}

/// Pick one search result, deterministically
///
/// Exact "Artist - Title" matches come first; when there are none every
/// result stays in the pool. With a year hint the nearest year wins
/// (results without a year rank last), otherwise the first in rank order.
/// Ties keep the service's ranking.
pub fn select_candidate<'a>(
    hits: &'a [SearchHit],
    artist: &str,
    album: &str,
    year_hint: Option<i32>,
) -> Option<&'a SearchHit> {
    let exact: Vec<&SearchHit> = hits
        .iter()
        .filter(|hit| is_exact_match(hit, artist, album))
        .collect();
    let pool: Vec<&SearchHit> = if exact.is_empty() {
        hits.iter().collect()
    } else {
        exact
    };

    match year_hint {
        None => pool.first().copied(),
        Some(hint) => pool
            .iter()
            .enumerate()
            .min_by_key(|(rank, hit)| {
                let distance = hit.year.map(|year| (year - hint).unsigned_abs());
                (distance.is_none(), distance.unwrap_or(u32::MAX), *rank)
            })
            .map(|(_, hit)| *hit),
    }
}

/// Format descriptor from the release's entry for the row's format
pub fn format_descriptor(release: &ReleaseDetails, format: PhysicalFormat) -> FormatDescriptor {
    release
        .formats
        .iter()
        .find(|f| f.name.eq_ignore_ascii_case(format.as_str()))
        .map(|f| FormatDescriptor {
            name: format.as_str().to_string(),
            variant: f.text.clone().filter(|text| !text.trim().is_empty()),
            descriptions: f.descriptions.clone(),
        })
        .unwrap_or_else(|| FormatDescriptor::bare(format))
}

/// Catalog record for a fetched release (not yet stored)
pub fn catalog_record_from_release(release: &ReleaseDetails) -> CatalogRecord {
    let mut record =
        CatalogRecord::from_discogs(release.id, release.title.clone(), release.primary_artist());
    record.year = release.year;
    record.cover_image = release.cover_image.clone();
    record.styles = release.styles.clone();
    record.tracklist = release.tracklist.clone();
    record.labels = release.labels.clone();
    record
}

/// Resolves rows against the catalog service and stores matched records
pub struct RowMatcher {
    catalog: Arc<dyn CatalogService>,
    store: Arc<dyn ImportStore>,
}

impl RowMatcher {
    pub fn new(catalog: Arc<dyn CatalogService>, store: Arc<dyn ImportStore>) -> Self {
        Self { catalog, store }
    }

    /// Resolve one row
    pub async fn match_row(&self, row: &ImportRow) -> Result<MatchedRelease, MatchError> {
        let validated = validate_row(row)?;

        let release = match validated.external_id {
            Some(id) => self.fetch_explicit(id).await?,
            None => self.search_and_fetch(row.row_index, &validated).await?,
        };

        let record = catalog_record_from_release(&release);
        let stored = self
            .store
            .upsert_catalog_record(&record)
            .await
            .map_err(|e| {
                MatchError::Persistence(format!(
                    "failed to store catalog record for release {}: {}",
                    release.id, e
                ))
            })?;

        tracing::debug!(
            row_index = row.row_index,
            discogs_id = release.id,
            catalog_record_id = %stored.id,
            reused = stored.id != record.id,
            "Row matched"
        );

        Ok(MatchedRelease {
            record: stored,
            format: format_descriptor(&release, validated.format),
            media_condition: validated.media_condition,
            sleeve_condition: validated.sleeve_condition,
        })
    }

    async fn fetch_explicit(&self, id: u64) -> Result<ReleaseDetails, MatchError> {
        self.catalog.fetch_release(id).await.map_err(|e| match e {
            CatalogError::NotFound => {
                MatchError::Lookup(format!("release {} not found on Discogs", id))
            }
            other => MatchError::Lookup(format!("failed to fetch release {}: {}", id, other)),
        })
    }

    async fn search_and_fetch(
        &self,
        row_index: u32,
        row: &ValidatedRow,
    ) -> Result<ReleaseDetails, MatchError> {
        let query = SearchQuery {
            artist: row.artist.clone(),
            album: row.album.clone(),
            format: row.format,
        };

        let hits = self
            .catalog
            .search_releases(&query)
            .await
            .map_err(|e| MatchError::Lookup(format!("Discogs search failed: {}", e)))?;

        let Some(candidate) = select_candidate(&hits, &row.artist, &row.album, row.year) else {
            return Err(MatchError::NotFound(NO_MATCH_REASON.to_string()));
        };

        tracing::debug!(
            row_index,
            discogs_id = candidate.id,
            results = hits.len(),
            "Selected search candidate"
        );

        self.catalog
            .fetch_release(candidate.id)
            .await
            .map_err(|e| {
                MatchError::Lookup(format!(
                    "failed to fetch details for release {}: {}",
                    candidate.id, e
                ))
            })
    }
}
