//! Catalog record database operations
//!
//! Records are shared across users and keyed by Discogs release id.

use musivault_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::{parse_json, parse_timestamp, parse_uuid, to_json};
use crate::models::CatalogRecord;

const SELECT_COLUMNS: &str = r#"
    SELECT id, discogs_id, title, artist, year, cover_image,
           styles, tracklist, labels, created_at
    FROM catalog_records
"#;

/// Insert a record, or return the existing one with the same Discogs id
///
/// Relies on the UNIQUE constraint instead of read-then-write, so two jobs
/// importing the same release concurrently still end up sharing one row.
pub async fn insert_or_fetch(
    conn: &mut SqliteConnection,
    record: &CatalogRecord,
) -> Result<CatalogRecord> {
    let styles = to_json("styles", &record.styles)?;
    let tracklist = to_json("tracklist", &record.tracklist)?;
    let labels = to_json("labels", &record.labels)?;

    sqlx::query(
        r#"
        INSERT INTO catalog_records (
            id, discogs_id, title, artist, year, cover_image,
            styles, tracklist, labels, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(discogs_id) DO NOTHING
        "#,
    )
    .bind(record.id.to_string())
    .bind(record.discogs_id.map(|id| id as i64))
    .bind(&record.title)
    .bind(&record.artist)
    .bind(record.year)
    .bind(&record.cover_image)
    .bind(&styles)
    .bind(&tracklist)
    .bind(&labels)
    .bind(record.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    let row = match record.discogs_id {
        Some(discogs_id) => {
            sqlx::query(&format!("{} WHERE discogs_id = ?", SELECT_COLUMNS))
                .bind(discogs_id as i64)
                .fetch_one(&mut *conn)
                .await?
        }
        None => {
            sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
                .bind(record.id.to_string())
                .fetch_one(&mut *conn)
                .await?
        }
    };

    record_from_row(&row)
}

/// Load a record by Discogs release id
pub async fn load_by_discogs_id(pool: &SqlitePool, discogs_id: u64) -> Result<Option<CatalogRecord>> {
    let row = sqlx::query(&format!("{} WHERE discogs_id = ?", SELECT_COLUMNS))
        .bind(discogs_id as i64)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(record_from_row).transpose()
}

/// Count records carrying a Discogs id
pub async fn count_by_discogs_id(pool: &SqlitePool, discogs_id: u64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_records WHERE discogs_id = ?")
        .bind(discogs_id as i64)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub(crate) fn record_from_row(row: &SqliteRow) -> Result<CatalogRecord> {
    record_from_prefixed_row(row, "")
}

/// Map a row whose catalog columns may carry a prefix (used by joins)
pub(crate) fn record_from_prefixed_row(row: &SqliteRow, prefix: &str) -> Result<CatalogRecord> {
    let col = |name: &str| format!("{}{}", prefix, name);

    let id: String = row.get(col("id").as_str());
    let discogs_id: Option<i64> = row.get(col("discogs_id").as_str());
    let styles: String = row.get(col("styles").as_str());
    let tracklist: String = row.get(col("tracklist").as_str());
    let labels: String = row.get(col("labels").as_str());
    let created_at: String = row.get(col("created_at").as_str());

    Ok(CatalogRecord {
        id: parse_uuid("catalog_records.id", &id)?,
        discogs_id: discogs_id.map(|id| id as u64),
        title: row.get(col("title").as_str()),
        artist: row.get(col("artist").as_str()),
        year: row.get(col("year").as_str()),
        cover_image: row.get(col("cover_image").as_str()),
        styles: parse_json("styles", &styles)?,
        tracklist: parse_json("tracklist", &tracklist)?,
        labels: parse_json("labels", &labels)?,
        created_at: parse_timestamp("catalog_records.created_at", &created_at)?,
    })
}
