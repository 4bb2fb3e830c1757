//! Import job state machine and audit log
//!
//! PENDING → PROCESSING → COMPLETED | ERROR
//!
//! `completed` and `error` are terminal. Row indexes are 1-based positions of
//! data rows in the uploaded file (the header row is not counted).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Import job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    /// Upload accepted, not yet started
    Pending,
    /// Rows are being matched
    Processing,
    /// Every row produced an entry
    Completed,
    /// Processing halted on a fatal condition
    Error,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
            ImportStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ImportStatus::Pending),
            "processing" => Some(ImportStatus::Processing),
            "completed" => Some(ImportStatus::Completed),
            "error" => Some(ImportStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportStatus::Completed | ImportStatus::Error)
    }

    /// Allowed edges of the state machine
    pub fn can_transition_to(&self, next: ImportStatus) -> bool {
        matches!(
            (self, next),
            (ImportStatus::Pending, ImportStatus::Processing)
                | (ImportStatus::Pending, ImportStatus::Error)
                | (ImportStatus::Processing, ImportStatus::Completed)
                | (ImportStatus::Processing, ImportStatus::Error)
        )
    }
}

/// Per-row outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Success,
    Failed,
    Skipped,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Success => "success",
            EntryStatus::Failed => "failed",
            EntryStatus::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(EntryStatus::Success),
            "failed" => Some(EntryStatus::Failed),
            "skipped" => Some(EntryStatus::Skipped),
            _ => None,
        }
    }
}

/// One row's outcome, immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportEntry {
    pub row_index: u32,
    pub input_artist: String,
    pub input_album: String,
    pub input_year: Option<String>,
    pub input_format: String,
    pub input_external_id: Option<String>,
    pub input_catalog_number: Option<String>,
    pub matched_artist: Option<String>,
    pub matched_album: Option<String>,
    pub matched_year: Option<i32>,
    pub external_id: Option<u64>,
    pub status: EntryStatus,
    pub reason: Option<String>,
}

/// Illegal state machine edge
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Illegal import transition {from:?} → {to:?}")]
pub struct InvalidTransition {
    pub from: ImportStatus,
    pub to: ImportStatus,
}

/// One applied state change, logged by the import store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub job_id: Uuid,
    pub old_status: ImportStatus,
    pub new_status: ImportStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// One bulk-import run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: Uuid,
    pub owner: Uuid,
    pub file_name: String,
    pub total_rows: u32,
    pub success_count: u32,
    pub fail_count: u32,
    pub skip_count: u32,
    pub status: ImportStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub entries: Vec<ImportEntry>,
}

impl ImportJob {
    /// Create a new pending job
    pub fn new(owner: Uuid, file_name: impl Into<String>, total_rows: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            file_name: file_name.into(),
            total_rows,
            success_count: 0,
            fail_count: 0,
            skip_count: 0,
            status: ImportStatus::Pending,
            error_message: None,
            created_at: Utc::now(),
            finished_at: None,
            entries: Vec::new(),
        }
    }

    /// Move along the state machine, refusing edges out of terminal states
    pub fn transition_to(
        &mut self,
        new_status: ImportStatus,
    ) -> Result<StateTransition, InvalidTransition> {
        if !self.status.can_transition_to(new_status) {
            return Err(InvalidTransition {
                from: self.status,
                to: new_status,
            });
        }

        let transition = StateTransition {
            job_id: self.id,
            old_status: self.status,
            new_status,
            transitioned_at: Utc::now(),
        };
        self.status = new_status;
        if new_status.is_terminal() {
            self.finished_at = Some(transition.transitioned_at);
        }

        Ok(transition)
    }

    pub fn processed_rows(&self) -> u32 {
        self.success_count + self.fail_count + self.skip_count
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Percentage of rows processed (0.0 - 100.0)
    pub fn percentage(&self) -> f64 {
        if self.total_rows == 0 {
            return 100.0;
        }
        (self.processed_rows() as f64 / self.total_rows as f64) * 100.0
    }
}
