//! Shared test helpers
//!
//! - Temporary SQLite databases with users
//! - `MockCatalog`: scripted catalog service counting its calls
//! - `FailingStore`: import store that fails on the Nth appended entry

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use musivault_api::db::users::User;
use musivault_api::models::{
    CatalogRecord, CollectionEntry, ImportEntry, ImportJob, ImportRow, NewCollectionEntry,
    PhysicalFormat,
};
use musivault_api::services::{
    CatalogError, CatalogService, ImportStore, ReleaseDetails, ReleaseFormat, SearchHit,
    SearchQuery, SqliteImportStore,
};
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

/// Temporary database; keep the TempDir alive for the test's duration
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test_musivault.db");
    let pool = musivault_api::db::init_database_pool(&db_path)
        .await
        .expect("Failed to initialize test database");
    (temp_dir, pool)
}

pub async fn create_user(pool: &SqlitePool, username: &str) -> (User, String) {
    musivault_api::db::users::create_user(pool, username)
        .await
        .expect("Failed to create test user")
}

/// Release as the catalog service would return it
pub fn release(id: u64, artist: &str, title: &str, year: Option<i32>) -> ReleaseDetails {
    ReleaseDetails {
        id,
        title: title.to_string(),
        artists: vec![artist.to_string()],
        year,
        cover_image: Some(format!("https://img.example/{}.jpg", id)),
        styles: vec!["House".to_string()],
        tracklist: Vec::new(),
        labels: Vec::new(),
        formats: vec![ReleaseFormat {
            name: "Vinyl".to_string(),
            text: Some("180g".to_string()),
            descriptions: vec!["LP".to_string(), "Album".to_string()],
        }],
    }
}

pub fn hit(id: u64, title: &str, year: Option<i32>) -> SearchHit {
    SearchHit {
        id,
        title: title.to_string(),
        year,
        cover_image: None,
    }
}

pub fn row(row_index: u32, artist: &str, album: &str, format: &str) -> ImportRow {
    ImportRow {
        row_index,
        artist: artist.to_string(),
        album: album.to_string(),
        format: format.to_string(),
        ..Default::default()
    }
}

pub fn row_with_id(row_index: u32, artist: &str, album: &str, external_id: &str) -> ImportRow {
    ImportRow {
        external_id: Some(external_id.to_string()),
        ..row(row_index, artist, album, "Vinyl")
    }
}

/// Scripted catalog service
///
/// Searches are keyed by lowercase "artist album"; unknown searches return
/// no results and unknown releases are not found.
#[derive(Default)]
pub struct MockCatalog {
    searches: Mutex<HashMap<String, Result<Vec<SearchHit>, CatalogError>>>,
    releases: Mutex<HashMap<u64, Result<ReleaseDetails, CatalogError>>>,
    delay: Mutex<Option<Duration>>,
    pub search_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub search_formats: Mutex<Vec<PhysicalFormat>>,
}

impl MockCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_search(&self, artist: &str, album: &str, result: Result<Vec<SearchHit>, CatalogError>) {
        let key = format!("{} {}", artist, album).to_lowercase();
        self.searches.lock().unwrap().insert(key, result);
    }

    pub fn with_release(&self, release: ReleaseDetails) {
        self.releases.lock().unwrap().insert(release.id, Ok(release));
    }

    pub fn with_fetch_error(&self, id: u64, error: CatalogError) {
        self.releases.lock().unwrap().insert(id, Err(error));
    }

    /// Delay every call, to keep a job running while a test observes it
    pub fn with_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst) + self.fetch_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CatalogService for MockCatalog {
    async fn search_releases(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, CatalogError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.search_formats.lock().unwrap().push(query.format);
        self.pause().await;

        let key = query.text().to_lowercase();
        self.searches
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_release(&self, id: u64) -> Result<ReleaseDetails, CatalogError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        self.releases
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or(Err(CatalogError::NotFound))
    }
}

/// Import store that fails every append from the `fail_on_append`th on
pub struct FailingStore {
    inner: SqliteImportStore,
    fail_on_append: u32,
    appends: AtomicU32,
}

impl FailingStore {
    pub fn new(pool: SqlitePool, fail_on_append: u32) -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteImportStore::new(pool),
            fail_on_append,
            appends: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ImportStore for FailingStore {
    async fn create_job(
        &self,
        owner: Uuid,
        file_name: &str,
        total_rows: u32,
    ) -> musivault_common::Result<ImportJob> {
        self.inner.create_job(owner, file_name, total_rows).await
    }

    async fn upsert_catalog_record(
        &self,
        record: &CatalogRecord,
    ) -> musivault_common::Result<CatalogRecord> {
        self.inner.upsert_catalog_record(record).await
    }

    async fn append_entry(
        &self,
        job_id: Uuid,
        owner: Uuid,
        entry: &ImportEntry,
        collection: Option<&NewCollectionEntry>,
    ) -> musivault_common::Result<Option<CollectionEntry>> {
        let attempt = self.appends.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt >= self.fail_on_append {
            return Err(musivault_common::Error::Internal(
                "simulated persistence failure".to_string(),
            ));
        }
        self.inner.append_entry(job_id, owner, entry, collection).await
    }

    async fn complete_job(&self, job_id: Uuid) -> musivault_common::Result<()> {
        self.inner.complete_job(job_id).await
    }

    async fn fail_job(&self, job_id: Uuid, reason: &str) -> musivault_common::Result<()> {
        self.inner.fail_job(job_id, reason).await
    }
}

/// Poll a job until it is terminal
pub async fn wait_for_terminal(pool: &SqlitePool, job_id: Uuid) -> ImportJob {
    for _ in 0..500 {
        let job = musivault_api::db::import_jobs::load_job(pool, job_id)
            .await
            .expect("Failed to load job")
            .expect("Job not found");
        if job.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Import job {} did not reach a terminal state", job_id);
}

/// Check the counter and ordering invariants of a job snapshot
pub fn assert_job_consistent(job: &ImportJob) {
    let processed = job.success_count + job.fail_count + job.skip_count;
    assert!(processed <= job.total_rows, "counts exceed total rows: {:?}", job);
    assert_eq!(job.entries.len() as u32, processed, "entries out of step with counters");
    assert!(
        job.entries.windows(2).all(|w| w[0].row_index < w[1].row_index),
        "entries not in row order"
    );
    if job.status == musivault_api::models::ImportStatus::Completed {
        assert_eq!(processed, job.total_rows);
    }
}
