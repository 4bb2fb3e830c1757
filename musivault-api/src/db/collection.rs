//! Collection entry database operations

use chrono::Utc;
use musivault_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::catalog::record_from_prefixed_row;
use super::{parse_json, parse_timestamp, parse_uuid, to_json};
use crate::models::{CollectionEntry, CollectionItem, Condition, FormatDescriptor, NewCollectionEntry};

/// Insert a collection entry for `owner`
pub async fn insert_entry(
    conn: &mut SqliteConnection,
    owner: Uuid,
    new_entry: &NewCollectionEntry,
) -> Result<CollectionEntry> {
    let entry = CollectionEntry {
        id: Uuid::new_v4(),
        owner,
        catalog_record_id: new_entry.catalog_record_id,
        format: new_entry.format.clone(),
        media_condition: new_entry.media_condition,
        sleeve_condition: new_entry.sleeve_condition,
        added_at: Utc::now(),
    };
    let descriptions = to_json("format_descriptions", &entry.format.descriptions)?;

    sqlx::query(
        r#"
        INSERT INTO collection_entries (
            id, owner_id, catalog_record_id, format_name, format_variant,
            format_descriptions, media_condition, sleeve_condition, added_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.id.to_string())
    .bind(owner.to_string())
    .bind(entry.catalog_record_id.to_string())
    .bind(&entry.format.name)
    .bind(&entry.format.variant)
    .bind(&descriptions)
    .bind(entry.media_condition.map(|c| c.as_str()))
    .bind(entry.sleeve_condition.map(|c| c.as_str()))
    .bind(entry.added_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(entry)
}

/// List a user's collection, newest first, joined with catalog records
pub async fn list_for_owner(pool: &SqlitePool, owner: Uuid) -> Result<Vec<CollectionItem>> {
    let rows = sqlx::query(
        r#"
        SELECT ce.id, ce.owner_id, ce.catalog_record_id, ce.format_name, ce.format_variant,
               ce.format_descriptions, ce.media_condition, ce.sleeve_condition, ce.added_at,
               cr.id AS cr_id, cr.discogs_id AS cr_discogs_id, cr.title AS cr_title,
               cr.artist AS cr_artist, cr.year AS cr_year, cr.cover_image AS cr_cover_image,
               cr.styles AS cr_styles, cr.tracklist AS cr_tracklist, cr.labels AS cr_labels,
               cr.created_at AS cr_created_at
        FROM collection_entries ce
        JOIN catalog_records cr ON cr.id = ce.catalog_record_id
        WHERE ce.owner_id = ?
        ORDER BY ce.added_at DESC, ce.id
        "#,
    )
    .bind(owner.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(CollectionItem {
                entry: entry_from_row(row)?,
                release: record_from_prefixed_row(row, "cr_")?,
            })
        })
        .collect()
}

/// Delete one of `owner`'s entries; false when no such entry is theirs
pub async fn delete_entry(pool: &SqlitePool, owner: Uuid, entry_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM collection_entries WHERE id = ? AND owner_id = ?")
        .bind(entry_id.to_string())
        .bind(owner.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

fn entry_from_row(row: &SqliteRow) -> Result<CollectionEntry> {
    let id: String = row.get("id");
    let owner: String = row.get("owner_id");
    let catalog_record_id: String = row.get("catalog_record_id");
    let descriptions: String = row.get("format_descriptions");
    let media_condition: Option<String> = row.get("media_condition");
    let sleeve_condition: Option<String> = row.get("sleeve_condition");
    let added_at: String = row.get("added_at");

    Ok(CollectionEntry {
        id: parse_uuid("collection_entries.id", &id)?,
        owner: parse_uuid("collection_entries.owner_id", &owner)?,
        catalog_record_id: parse_uuid("collection_entries.catalog_record_id", &catalog_record_id)?,
        format: FormatDescriptor {
            name: row.get("format_name"),
            variant: row.get("format_variant"),
            descriptions: parse_json("format_descriptions", &descriptions)?,
        },
        media_condition: media_condition.as_deref().and_then(Condition::parse),
        sleeve_condition: sleeve_condition.as_deref().and_then(Condition::parse),
        added_at: parse_timestamp("collection_entries.added_at", &added_at)?,
    })
}
