//! Database access for musivault-api
//!
//! SQLite database in the root folder, WAL mode so pollers can read while an
//! import job writes.

pub mod catalog;
pub mod collection;
pub mod import_jobs;
pub mod users;

use chrono::{DateTime, Utc};
use musivault_common::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

/// Initialize database connection pool
///
/// Creates the database file and tables when missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::debug!("Connecting to database: {}", db_path.display());

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create tables and indexes if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            token_hash TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // UNIQUE on a nullable column: NULLs never collide in SQLite, so manual
    // records without a Discogs id can coexist
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_records (
            id TEXT PRIMARY KEY,
            discogs_id INTEGER UNIQUE,
            title TEXT NOT NULL,
            artist TEXT NOT NULL,
            year INTEGER,
            cover_image TEXT,
            styles TEXT NOT NULL DEFAULT '[]',
            tracklist TEXT NOT NULL DEFAULT '[]',
            labels TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collection_entries (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL REFERENCES users(id),
            catalog_record_id TEXT NOT NULL REFERENCES catalog_records(id),
            format_name TEXT NOT NULL,
            format_variant TEXT,
            format_descriptions TEXT NOT NULL DEFAULT '[]',
            media_condition TEXT,
            sleeve_condition TEXT,
            added_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_jobs (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL REFERENCES users(id),
            file_name TEXT NOT NULL,
            total_rows INTEGER NOT NULL,
            success_count INTEGER NOT NULL DEFAULT 0,
            fail_count INTEGER NOT NULL DEFAULT 0,
            skip_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            error_message TEXT,
            created_at TEXT NOT NULL,
            finished_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_entries (
            job_id TEXT NOT NULL REFERENCES import_jobs(id) ON DELETE CASCADE,
            row_index INTEGER NOT NULL,
            input_artist TEXT NOT NULL,
            input_album TEXT NOT NULL,
            input_year TEXT,
            input_format TEXT NOT NULL,
            input_external_id TEXT,
            input_catalog_number TEXT,
            matched_artist TEXT,
            matched_album TEXT,
            matched_year INTEGER,
            external_id INTEGER,
            status TEXT NOT NULL,
            reason TEXT,
            PRIMARY KEY (job_id, row_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_collection_entries_owner ON collection_entries(owner_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_import_jobs_owner ON import_jobs(owner_id, created_at)",
    )
    .execute(pool)
    .await?;

    tracing::info!(
        "Database tables initialized (users, catalog_records, collection_entries, import_jobs, import_entries)"
    );

    Ok(())
}

/// Parse an RFC 3339 column value
pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

/// Parse a UUID column value
pub(crate) fn parse_uuid(column: &str, value: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

/// Deserialize a JSON text column
pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(column: &str, value: &str) -> Result<T> {
    serde_json::from_str(value)
        .map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", column, e)))
}

/// Serialize a value for a JSON text column
pub(crate) fn to_json<T: serde::Serialize>(column: &str, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", column, e)))
}
