//! Import job database operations
//!
//! Entries and counters are written in one transaction and read in one
//! transaction, so a poller never sees a count without its entry.

use chrono::Utc;
use musivault_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::models::{
    CollectionEntry, EntryStatus, ImportEntry, ImportJob, ImportStatus, NewCollectionEntry,
};

const JOB_COLUMNS: &str = r#"
    SELECT id, owner_id, file_name, total_rows, success_count, fail_count,
           skip_count, status, error_message, created_at, finished_at
    FROM import_jobs
"#;

/// Persist a freshly created job (without entries)
pub async fn insert_job(pool: &SqlitePool, job: &ImportJob) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO import_jobs (
            id, owner_id, file_name, total_rows, success_count, fail_count,
            skip_count, status, error_message, created_at, finished_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(job.id.to_string())
    .bind(job.owner.to_string())
    .bind(&job.file_name)
    .bind(job.total_rows as i64)
    .bind(job.success_count as i64)
    .bind(job.fail_count as i64)
    .bind(job.skip_count as i64)
    .bind(job.status.as_str())
    .bind(&job.error_message)
    .bind(job.created_at.to_rfc3339())
    .bind(job.finished_at.map(|dt| dt.to_rfc3339()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Append one entry, bump its counter and optionally add a collection entry
///
/// All three writes commit together. The counter update is guarded so it
/// only applies while the job is processing and below `total_rows`; when
/// the guard fails nothing is written.
pub async fn append_entry(
    pool: &SqlitePool,
    job_id: Uuid,
    owner: Uuid,
    entry: &ImportEntry,
    collection: Option<&NewCollectionEntry>,
) -> Result<Option<CollectionEntry>> {
    let mut tx = pool.begin().await?;

    let counter_column = match entry.status {
        EntryStatus::Success => "success_count",
        EntryStatus::Failed => "fail_count",
        EntryStatus::Skipped => "skip_count",
    };
    let updated = sqlx::query(&format!(
        r#"
        UPDATE import_jobs
        SET {column} = {column} + 1
        WHERE id = ?
          AND status = 'processing'
          AND success_count + fail_count + skip_count < total_rows
        "#,
        column = counter_column
    ))
    .bind(job_id.to_string())
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() != 1 {
        tx.rollback().await?;
        return Err(Error::Internal(format!(
            "Import job {} is not accepting entries",
            job_id
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO import_entries (
            job_id, row_index, input_artist, input_album, input_year, input_format,
            input_external_id, input_catalog_number, matched_artist, matched_album,
            matched_year, external_id, status, reason
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(job_id.to_string())
    .bind(entry.row_index as i64)
    .bind(&entry.input_artist)
    .bind(&entry.input_album)
    .bind(&entry.input_year)
    .bind(&entry.input_format)
    .bind(&entry.input_external_id)
    .bind(&entry.input_catalog_number)
    .bind(&entry.matched_artist)
    .bind(&entry.matched_album)
    .bind(entry.matched_year)
    .bind(entry.external_id.map(|id| id as i64))
    .bind(entry.status.as_str())
    .bind(&entry.reason)
    .execute(&mut *tx)
    .await?;

    let created = match collection {
        Some(new_entry) => Some(super::collection::insert_entry(&mut *tx, owner, new_entry).await?),
        None => None,
    };

    tx.commit().await?;

    Ok(created)
}

/// Move a job into a terminal state
///
/// Jobs already terminal are left untouched; returns whether the update applied.
pub async fn finish_job(
    pool: &SqlitePool,
    job_id: Uuid,
    status: ImportStatus,
    error_message: Option<&str>,
) -> Result<bool> {
    if !status.is_terminal() {
        return Err(Error::InvalidInput(format!(
            "{} is not a terminal import status",
            status.as_str()
        )));
    }

    let result = sqlx::query(
        r#"
        UPDATE import_jobs
        SET status = ?, error_message = ?, finished_at = ?
        WHERE id = ? AND status NOT IN ('completed', 'error')
        "#,
    )
    .bind(status.as_str())
    .bind(error_message)
    .bind(Utc::now().to_rfc3339())
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Load a job with all of its entries from one consistent snapshot
pub async fn load_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<ImportJob>> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(&format!("{} WHERE id = ?", JOB_COLUMNS))
        .bind(job_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

    let Some(row) = row else {
        tx.commit().await?;
        return Ok(None);
    };
    let mut job = job_from_row(&row)?;

    let entry_rows = sqlx::query(
        r#"
        SELECT row_index, input_artist, input_album, input_year, input_format,
               input_external_id, input_catalog_number, matched_artist, matched_album,
               matched_year, external_id, status, reason
        FROM import_entries
        WHERE job_id = ?
        ORDER BY row_index
        "#,
    )
    .bind(job_id.to_string())
    .fetch_all(&mut *tx)
    .await?;
    tx.commit().await?;

    job.entries = entry_rows
        .iter()
        .map(entry_from_row)
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(job))
}

/// List a user's jobs, newest first, without entries
pub async fn list_jobs(pool: &SqlitePool, owner: Uuid) -> Result<Vec<ImportJob>> {
    let rows = sqlx::query(&format!(
        "{} WHERE owner_id = ? ORDER BY created_at DESC, id",
        JOB_COLUMNS
    ))
    .bind(owner.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Mark jobs left running by a previous process as failed
///
/// Import tasks die with the process that spawned them, so a non-terminal
/// job found at startup will never progress again.
pub async fn cleanup_stale_jobs(pool: &SqlitePool) -> Result<usize> {
    let result = sqlx::query(
        r#"
        UPDATE import_jobs
        SET status = 'error',
            error_message = 'Import interrupted by server restart',
            finished_at = ?
        WHERE status NOT IN ('completed', 'error')
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as usize)
}

fn job_from_row(row: &SqliteRow) -> Result<ImportJob> {
    let id: String = row.get("id");
    let owner: String = row.get("owner_id");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let finished_at: Option<String> = row.get("finished_at");

    Ok(ImportJob {
        id: parse_uuid("import_jobs.id", &id)?,
        owner: parse_uuid("import_jobs.owner_id", &owner)?,
        file_name: row.get("file_name"),
        total_rows: row.get::<i64, _>("total_rows") as u32,
        success_count: row.get::<i64, _>("success_count") as u32,
        fail_count: row.get::<i64, _>("fail_count") as u32,
        skip_count: row.get::<i64, _>("skip_count") as u32,
        status: ImportStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("Unknown import status: {}", status)))?,
        error_message: row.get("error_message"),
        created_at: parse_timestamp("import_jobs.created_at", &created_at)?,
        finished_at: finished_at
            .map(|s| parse_timestamp("import_jobs.finished_at", &s))
            .transpose()?,
        entries: Vec::new(),
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<ImportEntry> {
    let status: String = row.get("status");
    let external_id: Option<i64> = row.get("external_id");

    Ok(ImportEntry {
        row_index: row.get::<i64, _>("row_index") as u32,
        input_artist: row.get("input_artist"),
        input_album: row.get("input_album"),
        input_year: row.get("input_year"),
        input_format: row.get("input_format"),
        input_external_id: row.get("input_external_id"),
        input_catalog_number: row.get("input_catalog_number"),
        matched_artist: row.get("matched_artist"),
        matched_album: row.get("matched_album"),
        matched_year: row.get("matched_year"),
        external_id: external_id.map(|id| id as u64),
        status: EntryStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("Unknown entry status: {}", status)))?,
        reason: row.get("reason"),
    })
}
