//! Import API handlers
//!
//! POST /import, GET /import/logs, GET /import/logs/:logId,
//! GET /import/logs/:logId/download, POST /import/logs/:logId/cancel

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{ImportEntry, ImportJob, ImportStatus};
use crate::services::{parse_import_csv, JobOutcome};
use crate::AppState;

/// Multipart field carrying the CSV file
pub const FILE_FIELD: &str = "file";

/// POST /import response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub log_id: Uuid,
    pub total_rows: u32,
    pub status: ImportStatus,
    pub poll_interval_ms: u64,
}

/// Job counts and status without entries
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub log_id: Uuid,
    pub file_name: String,
    pub status: ImportStatus,
    pub total_rows: u32,
    pub success_count: u32,
    pub fail_count: u32,
    pub skip_count: u32,
    pub processed_rows: u32,
    pub percentage: f64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&ImportJob> for JobSummary {
    fn from(job: &ImportJob) -> Self {
        Self {
            log_id: job.id,
            file_name: job.file_name.clone(),
            status: job.status,
            total_rows: job.total_rows,
            success_count: job.success_count,
            fail_count: job.fail_count,
            skip_count: job.skip_count,
            processed_rows: job.processed_rows(),
            percentage: job.percentage(),
            error_message: job.error_message.clone(),
            created_at: job.created_at,
            finished_at: job.finished_at,
        }
    }
}

/// GET /import/logs/:logId response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetailResponse {
    #[serde(flatten)]
    pub summary: JobSummary,
    pub entries: Vec<ImportEntry>,
    pub poll_interval_ms: u64,
}

/// POST /import/logs/:logId/cancel response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub log_id: Uuid,
    pub cancel_requested: bool,
    /// Job status read back after signalling
    pub status: ImportStatus,
}

/// GET /import/logs/:logId/download query
#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub format: Option<String>,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(format!("Invalid multipart upload: {}", err.body_text()))
    }
}

/// Load a job owned by `owner`; other users' jobs read as missing
async fn load_owned_job(state: &AppState, owner: Uuid, log_id: Uuid) -> ApiResult<ImportJob> {
    crate::db::import_jobs::load_job(&state.db, log_id)
        .await?
        .filter(|job| job.owner == owner)
        .ok_or_else(|| ApiError::NotFound(format!("Import log not found: {}", log_id)))
}

/// POST /import
///
/// Parses the uploaded CSV, persists the job and returns immediately;
/// rows are processed by a background task.
pub async fn upload_import(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("import.csv")
            .to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) = upload.ok_or_else(|| {
        ApiError::BadRequest(format!("Missing multipart field '{}'", FILE_FIELD))
    })?;

    let rows = parse_import_csv(&bytes, state.import_config.max_rows).map_err(|e| {
        tracing::info!(user = %user.username, file_name = %file_name, error = %e, "Import upload rejected");
        ApiError::from(e)
    })?;

    let job = state.orchestrator.start_job(user.id, &file_name, &rows).await?;
    let response = UploadResponse {
        log_id: job.id,
        total_rows: job.total_rows,
        status: job.status,
        poll_interval_ms: state.import_config.poll_interval_ms,
    };

    let cancel = CancellationToken::new();
    state
        .cancellation_tokens
        .write()
        .await
        .insert(job.id, cancel.clone());

    let state_clone = state.clone();
    tokio::spawn(async move {
        let job_id = job.id;
        let outcome = state_clone.orchestrator.run(&job, rows, cancel).await;
        state_clone.cancellation_tokens.write().await.remove(&job_id);

        if let JobOutcome::Failed { reason, .. } = outcome {
            *state_clone.last_error.write().await = Some(format!("Import {}: {}", job_id, reason));
        }
    });

    Ok(Json(response))
}

/// GET /import/logs
pub async fn list_logs(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<JobSummary>>> {
    let jobs = crate::db::import_jobs::list_jobs(&state.db, user.id).await?;
    Ok(Json(jobs.iter().map(JobSummary::from).collect()))
}

/// GET /import/logs/:logId
///
/// Poll target; counts and entries come from one snapshot.
pub async fn get_log(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(log_id): Path<Uuid>,
) -> ApiResult<Json<JobDetailResponse>> {
    let job = load_owned_job(&state, user.id, log_id).await?;

    tracing::debug!(job_id = %log_id, status = job.status.as_str(), processed = job.processed_rows(), "Import log polled");

    Ok(Json(JobDetailResponse {
        summary: JobSummary::from(&job),
        poll_interval_ms: state.import_config.poll_interval_ms,
        entries: job.entries,
    }))
}

const CSV_HEADER: [&str; 13] = [
    "Row",
    "Status",
    "Reason",
    "InputArtist",
    "InputAlbum",
    "InputYear",
    "InputFormat",
    "InputExternalId",
    "InputCatalogNumber",
    "MatchedArtist",
    "MatchedAlbum",
    "MatchedYear",
    "ExternalId",
];

/// Render entries as CSV, one line per row
pub fn entries_to_csv(entries: &[ImportEntry]) -> Result<Vec<u8>, ApiError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let to_internal = |e: csv::Error| ApiError::Internal(format!("CSV export failed: {}", e));

    writer.write_record(CSV_HEADER).map_err(to_internal)?;
    for entry in entries {
        writer
            .write_record([
                entry.row_index.to_string(),
                entry.status.as_str().to_string(),
                entry.reason.clone().unwrap_or_default(),
                entry.input_artist.clone(),
                entry.input_album.clone(),
                entry.input_year.clone().unwrap_or_default(),
                entry.input_format.clone(),
                entry.input_external_id.clone().unwrap_or_default(),
                entry.input_catalog_number.clone().unwrap_or_default(),
                entry.matched_artist.clone().unwrap_or_default(),
                entry.matched_album.clone().unwrap_or_default(),
                entry.matched_year.map(|y| y.to_string()).unwrap_or_default(),
                entry.external_id.map(|id| id.to_string()).unwrap_or_default(),
            ])
            .map_err(to_internal)?;
    }

    writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV export failed: {}", e)))
}

/// GET /import/logs/:logId/download[?format=json|csv]
pub async fn download_log(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(log_id): Path<Uuid>,
    Query(params): Query<DownloadParams>,
) -> ApiResult<Response> {
    let job = load_owned_job(&state, user.id, log_id).await?;
    let format = params.format.as_deref().unwrap_or("json").to_ascii_lowercase();

    let (content_type, body) = match format.as_str() {
        "json" => (
            "application/json",
            serde_json::to_vec_pretty(&job)
                .map_err(|e| ApiError::Internal(format!("JSON export failed: {}", e)))?,
        ),
        "csv" => ("text/csv; charset=utf-8", entries_to_csv(&job.entries)?),
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unsupported download format '{}': expected json or csv",
                other
            )))
        }
    };

    let disposition = format!("attachment; filename=\"import-{}.{}\"", log_id, format);
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// POST /import/logs/:logId/cancel
///
/// Signals the job's task; the job reaches `error` once the current row's
/// step is interrupted. A job that completed while the request was handled
/// is reported as a conflict.
pub async fn cancel_log(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(log_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<CancelResponse>)> {
    let job = load_owned_job(&state, user.id, log_id).await?;
    if job.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "Import log already in terminal state: {}",
            job.status.as_str()
        )));
    }

    let token = state.cancellation_tokens.read().await.get(&log_id).cloned();
    match token {
        Some(token) if token.is_cancelled() => {
            return Err(ApiError::Conflict(format!(
                "Cancellation already requested for import log {}",
                log_id
            )));
        }
        Some(token) => token.cancel(),
        None => {
            // No task owns the job (it finished meanwhile or was orphaned)
            state
                .store
                .fail_job(log_id, crate::services::import_orchestrator::CANCELLED_REASON)
                .await?;
        }
    }

    let job = load_owned_job(&state, user.id, log_id).await?;
    let response = cancel_outcome(&job)?;

    tracing::info!(
        job_id = %log_id,
        user = %user.username,
        status = job.status.as_str(),
        "Import cancellation requested"
    );

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Response for a job reloaded after its cancellation was signalled
fn cancel_outcome(job: &ImportJob) -> ApiResult<CancelResponse> {
    if job.status == ImportStatus::Completed {
        return Err(ApiError::Conflict(format!(
            "Import log {} completed before it could be cancelled",
            job.id
        )));
    }
    Ok(CancelResponse {
        log_id: job.id,
        cancel_requested: true,
        status: job.status,
    })
}

/// Build import routes
pub fn import_routes() -> Router<AppState> {
    Router::new()
        .route("/import", post(upload_import))
        .route("/import/logs", get(list_logs))
        .route("/import/logs/:log_id", get(get_log))
        .route("/import/logs/:log_id/download", get(download_log))
        .route("/import/logs/:log_id/cancel", post(cancel_log))
}
