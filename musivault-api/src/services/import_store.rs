//! Persistence seam of the import pipeline
//!
//! The orchestrator and Row Matcher write through [`ImportStore`]; a test
//! can wrap the SQLite store to inject failures at a chosen row.

use async_trait::async_trait;
use musivault_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::models::{
    CatalogRecord, CollectionEntry, ImportEntry, ImportJob, ImportStatus, NewCollectionEntry,
};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Writes performed while driving an import job
#[async_trait]
pub trait ImportStore: Send + Sync {
    /// Persist a new job already in `processing`, with `total_rows` fixed
    async fn create_job(&self, owner: Uuid, file_name: &str, total_rows: u32) -> Result<ImportJob>;

    /// Insert a catalog record or return the one sharing its Discogs id
    async fn upsert_catalog_record(&self, record: &CatalogRecord) -> Result<CatalogRecord>;

    /// Append one entry with its counter bump (and collection entry on success)
    async fn append_entry(
        &self,
        job_id: Uuid,
        owner: Uuid,
        entry: &ImportEntry,
        collection: Option<&NewCollectionEntry>,
    ) -> Result<Option<CollectionEntry>>;

    /// Mark the job `completed`
    async fn complete_job(&self, job_id: Uuid) -> Result<()>;

    /// Mark the job `error` with a reason
    async fn fail_job(&self, job_id: Uuid, reason: &str) -> Result<()>;
}

/// SQLite-backed import store
#[derive(Clone)]
pub struct SqliteImportStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteImportStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn finish(&self, job_id: Uuid, status: ImportStatus, reason: Option<&str>) -> Result<()> {
        let pool = &self.pool;
        let applied = retry_on_lock("finish_import_job", self.max_lock_wait_ms, || async move {
            db::import_jobs::finish_job(pool, job_id, status, reason).await
        })
        .await?;

        if !applied {
            tracing::warn!(
                job_id = %job_id,
                status = status.as_str(),
                "Import job was already terminal, status left unchanged"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl ImportStore for SqliteImportStore {
    async fn create_job(&self, owner: Uuid, file_name: &str, total_rows: u32) -> Result<ImportJob> {
        let mut job = ImportJob::new(owner, file_name, total_rows);
        let transition = job
            .transition_to(ImportStatus::Processing)
            .map_err(|e| musivault_common::Error::Internal(e.to_string()))?;

        let pool = &self.pool;
        let job_ref = &job;
        retry_on_lock("create_import_job", self.max_lock_wait_ms, || async move {
            db::import_jobs::insert_job(pool, job_ref).await
        })
        .await?;

        tracing::debug!(
            job_id = %transition.job_id,
            old_status = transition.old_status.as_str(),
            new_status = transition.new_status.as_str(),
            at = %transition.transitioned_at.to_rfc3339(),
            "Import job state transition"
        );

        Ok(job)
    }

    async fn upsert_catalog_record(&self, record: &CatalogRecord) -> Result<CatalogRecord> {
        let pool = &self.pool;
        retry_on_lock("upsert_catalog_record", self.max_lock_wait_ms, || async move {
            let mut conn = pool.acquire().await?;
            db::catalog::insert_or_fetch(&mut *conn, record).await
        })
        .await
    }

    async fn append_entry(
        &self,
        job_id: Uuid,
        owner: Uuid,
        entry: &ImportEntry,
        collection: Option<&NewCollectionEntry>,
    ) -> Result<Option<CollectionEntry>> {
        let pool = &self.pool;
        retry_on_lock("append_import_entry", self.max_lock_wait_ms, || async move {
            db::import_jobs::append_entry(pool, job_id, owner, entry, collection).await
        })
        .await
    }

    async fn complete_job(&self, job_id: Uuid) -> Result<()> {
        self.finish(job_id, ImportStatus::Completed, None).await
    }

    async fn fail_job(&self, job_id: Uuid, reason: &str) -> Result<()> {
        self.finish(job_id, ImportStatus::Error, Some(reason)).await
    }
}
