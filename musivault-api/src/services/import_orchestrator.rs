//! Import Orchestrator
//!
//! Drives one import job from `processing` to a terminal state:
//! - Rows are matched strictly in file order, one at a time
//! - Each outcome is appended with its counter (and collection entry) atomically
//! - Row-level failures are recorded and the loop continues
//! - Store failures, cancellation and timeout halt the job with `error`
//!
//! Progress is exposed only through the persisted job; pollers read it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{EntryStatus, ImportEntry, ImportJob, ImportRow, NewCollectionEntry};
use crate::services::catalog_service::CatalogService;
use crate::services::import_store::ImportStore;
use crate::services::row_matcher::{MatchError, MatchedRelease, RowMatcher};

pub const CANCELLED_REASON: &str = "Import cancelled by user";

/// How a job run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed {
        success: u32,
        failed: u32,
        skipped: u32,
    },
    Failed {
        reason: String,
        rows_processed: u32,
    },
}

/// Condition that stops the loop
#[derive(Debug)]
enum Halt {
    Cancelled,
    TimedOut(Duration),
    Fatal(String),
}

impl Halt {
    fn reason(&self) -> String {
        match self {
            Halt::Cancelled => CANCELLED_REASON.to_string(),
            Halt::TimedOut(limit) => {
                format!("Import timed out after {} seconds", limit.as_secs())
            }
            Halt::Fatal(reason) => reason.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    success: u32,
    failed: u32,
    skipped: u32,
}

impl Tally {
    fn add(&mut self, status: EntryStatus) {
        match status {
            EntryStatus::Success => self.success += 1,
            EntryStatus::Failed => self.failed += 1,
            EntryStatus::Skipped => self.skipped += 1,
        }
    }

    fn total(&self) -> u32 {
        self.success + self.failed + self.skipped
    }
}

fn base_entry(row: &ImportRow, status: EntryStatus, reason: Option<String>) -> ImportEntry {
    ImportEntry {
        row_index: row.row_index,
        input_artist: row.artist.clone(),
        input_album: row.album.clone(),
        input_year: row.year.clone(),
        input_format: row.format.clone(),
        input_external_id: row.external_id.clone(),
        input_catalog_number: row.catalog_number.clone(),
        matched_artist: None,
        matched_album: None,
        matched_year: None,
        external_id: None,
        status,
        reason,
    }
}

/// Log entry for a matched row
pub fn success_entry(row: &ImportRow, matched: &MatchedRelease) -> ImportEntry {
    ImportEntry {
        matched_artist: Some(matched.record.artist.clone()),
        matched_album: Some(matched.record.title.clone()),
        matched_year: matched.record.year,
        external_id: matched.record.discogs_id,
        ..base_entry(row, EntryStatus::Success, None)
    }
}

/// Log entry for a failed or skipped row
pub fn unmatched_entry(row: &ImportRow, status: EntryStatus, reason: &str) -> ImportEntry {
    base_entry(row, status, Some(reason.to_string()))
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Runs import jobs against a catalog service and an import store
pub struct ImportOrchestrator {
    matcher: RowMatcher,
    store: Arc<dyn ImportStore>,
    job_timeout: Option<Duration>,
}

impl ImportOrchestrator {
    pub fn new(catalog: Arc<dyn CatalogService>, store: Arc<dyn ImportStore>) -> Self {
        Self {
            matcher: RowMatcher::new(catalog, store.clone()),
            store,
            job_timeout: None,
        }
    }

    /// Fail jobs still running after `timeout`
    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Persist a new job for `rows`, already in `processing`
    pub async fn start_job(
        &self,
        owner: Uuid,
        file_name: &str,
        rows: &[ImportRow],
    ) -> musivault_common::Result<ImportJob> {
        let job = self
            .store
            .create_job(owner, file_name, rows.len() as u32)
            .await?;

        tracing::info!(
            job_id = %job.id,
            owner = %owner,
            file_name,
            total_rows = job.total_rows,
            "Import job created"
        );

        Ok(job)
    }

    /// Process every row of `job`, then record the terminal state
    pub async fn run(
        &self,
        job: &ImportJob,
        rows: Vec<ImportRow>,
        cancel: CancellationToken,
    ) -> JobOutcome {
        let job_id = job.id;
        let started = Instant::now();
        let deadline = self.job_timeout.map(|timeout| started + timeout);
        let mut tally = Tally::default();

        tracing::info!(job_id = %job_id, total_rows = rows.len(), "Import job processing started");

        for row in &rows {
            let step = self.process_row(job, row);
            let result = run_step(step, &cancel, deadline, self.job_timeout).await;

            match result {
                Ok(status) => tally.add(status),
                Err(halt) => {
                    let reason = halt.reason();
                    tracing::error!(
                        job_id = %job_id,
                        row_index = row.row_index,
                        rows_processed = tally.total(),
                        reason = %reason,
                        "Import job halted"
                    );
                    self.record_failure(job_id, &reason).await;
                    return JobOutcome::Failed {
                        reason,
                        rows_processed: tally.total(),
                    };
                }
            }
        }

        if let Err(e) = self.store.complete_job(job_id).await {
            let reason = format!("failed to record job completion: {}", e);
            tracing::error!(job_id = %job_id, error = %e, "Failed to mark import job completed");
            self.record_failure(job_id, &reason).await;
            return JobOutcome::Failed {
                reason,
                rows_processed: tally.total(),
            };
        }

        tracing::info!(
            job_id = %job_id,
            success = tally.success,
            failed = tally.failed,
            skipped = tally.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Import job completed"
        );

        JobOutcome::Completed {
            success: tally.success,
            failed: tally.failed,
            skipped: tally.skipped,
        }
    }

    /// Match one row and append its outcome
    async fn process_row(&self, job: &ImportJob, row: &ImportRow) -> Result<EntryStatus, Halt> {
        let (entry, collection) = match self.matcher.match_row(row).await {
            Ok(matched) => {
                let collection = NewCollectionEntry {
                    catalog_record_id: matched.record.id,
                    format: matched.format.clone(),
                    media_condition: matched.media_condition,
                    sleeve_condition: matched.sleeve_condition,
                };
                (success_entry(row, &matched), Some(collection))
            }
            Err(MatchError::Persistence(reason)) => return Err(Halt::Fatal(reason)),
            Err(e) => {
                let status = e.entry_status().unwrap_or(EntryStatus::Failed);
                tracing::debug!(
                    job_id = %job.id,
                    row_index = row.row_index,
                    status = status.as_str(),
                    reason = e.reason(),
                    "Row not imported"
                );
                (unmatched_entry(row, status, e.reason()), None)
            }
        };

        self.store
            .append_entry(job.id, job.owner, &entry, collection.as_ref())
            .await
            .map_err(|e| {
                Halt::Fatal(format!("failed to record row {}: {}", row.row_index, e))
            })?;

        Ok(entry.status)
    }

    async fn record_failure(&self, job_id: Uuid, reason: &str) {
        if let Err(e) = self.store.fail_job(job_id, reason).await {
            // Left non-terminal; the startup sweep marks it failed
            tracing::error!(
                job_id = %job_id,
                error = %e,
                reason,
                "Failed to mark import job as failed"
            );
        }
    }
}

async fn run_step<F>(
    step: F,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
) -> Result<EntryStatus, Halt>
where
    F: Future<Output = Result<EntryStatus, Halt>>,
{
    if cancel.is_cancelled() {
        return Err(Halt::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Halt::Cancelled),
        _ = deadline_reached(deadline) => Err(Halt::TimedOut(timeout.unwrap_or_default())),
        result = step => result,
    }
}
