//! Integration tests for musivault-api HTTP endpoints
//!
//! Requests go straight into the router with `oneshot`; the catalog is a
//! scripted mock so no test touches the network.

mod helpers;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use helpers::{create_test_db, create_user, hit, release, wait_for_terminal, MockCatalog};
use http_body_util::BodyExt;
use musivault_api::api::import::{JobDetailResponse, UploadResponse};
use musivault_api::models::{EntryStatus, ImportStatus};
use musivault_api::services::{ImportStore, SqliteImportStore};
use musivault_common::config::ImportConfig;
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "musivault-test-boundary";

const SAMPLE_CSV: &str = "\
Artist,Album,Format,Year,ExternalId
Daft Punk,Discovery,Vinyl,2001,123
Unknown Band XYZ,Nonexistent Album,CD,,
Air,Moon Safari,Cassette,,
";

struct TestApp {
    _dir: TempDir,
    pool: SqlitePool,
    app: Router,
    token: String,
}

async fn create_test_app() -> TestApp {
    let (dir, pool) = create_test_db().await;
    let (_user, token) = create_user(&pool, "alice").await;

    let catalog = MockCatalog::new();
    catalog.with_release(release(123, "Daft Punk", "Discovery", Some(2001)));
    catalog.with_search(
        "Air",
        "Moon Safari",
        Ok(vec![hit(77, "Air - Moon Safari", Some(1998))]),
    );

    let state = musivault_api::AppState::new(pool.clone(), catalog, ImportConfig::default());
    let app = musivault_api::build_router(state);

    TestApp {
        _dir: dir,
        pool,
        app,
        token,
    }
}

fn multipart_body(file_name: &str, contents: &str) -> String {
    format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: text/csv\r\n\r\n{c}\r\n--{b}--\r\n",
        b = BOUNDARY,
        f = file_name,
        c = contents
    )
}

fn upload_request(token: &str, contents: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/import")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body("albums.csv", contents)))
        .unwrap()
}

fn get_request(token: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn authed_request(method: &str, token: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Upload `contents` and wait for the job to finish
async fn upload_and_wait(test: &TestApp, contents: &str) -> Uuid {
    let response = test
        .app
        .clone()
        .oneshot(upload_request(&test.token, contents))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let upload: UploadResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    wait_for_terminal(&test.pool, upload.log_id).await;
    upload.log_id
}

#[tokio::test]
async fn test_health_endpoint() {
    let test = create_test_app().await;

    let response = test
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "musivault-api");
    assert!(json["uptimeSeconds"].is_u64());
    assert_eq!(json["database"], "ok");
    assert_eq!(json["activeImports"], 0);
    assert!(json.get("lastError").is_none());
}

#[tokio::test]
async fn test_health_reports_unavailable_database() {
    let test = create_test_app().await;
    test.pool.close().await;

    let response = test
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = body_json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["database"], "unavailable");
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let test = create_test_app().await;

    let response = test
        .app
        .clone()
        .oneshot(Request::builder().uri("/import/logs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "UNAUTHORIZED");

    let response = test
        .app
        .oneshot(get_request("not-a-real-token", "/collection"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_upload_then_poll_until_completed() {
    let test = create_test_app().await;

    let response = test
        .app
        .clone()
        .oneshot(upload_request(&test.token, SAMPLE_CSV))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let upload: UploadResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(upload.total_rows, 3);
    assert_eq!(upload.status, ImportStatus::Processing);
    assert_eq!(upload.poll_interval_ms, 2000);

    wait_for_terminal(&test.pool, upload.log_id).await;

    let response = test
        .app
        .clone()
        .oneshot(get_request(
            &test.token,
            &format!("/import/logs/{}", upload.log_id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let detail: JobDetailResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();

    assert_eq!(detail.summary.status, ImportStatus::Completed);
    assert_eq!(detail.summary.file_name, "albums.csv");
    assert_eq!(detail.summary.processed_rows, 3);
    assert_eq!(detail.summary.percentage, 100.0);
    assert_eq!(
        (
            detail.summary.success_count,
            detail.summary.fail_count,
            detail.summary.skip_count
        ),
        (1, 1, 1)
    );
    let statuses: Vec<_> = detail.entries.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![EntryStatus::Success, EntryStatus::Skipped, EntryStatus::Failed]
    );

    let response = test
        .app
        .clone()
        .oneshot(get_request(&test.token, "/import/logs"))
        .await
        .unwrap();
    let logs = body_json(response).await;
    assert_eq!(logs.as_array().unwrap().len(), 1);
    assert_eq!(logs[0]["logId"], upload.log_id.to_string());
    assert!(logs[0].get("entries").is_none());

    let response = test
        .app
        .oneshot(get_request(&test.token, "/collection"))
        .await
        .unwrap();
    let collection = body_json(response).await;
    assert_eq!(collection.as_array().unwrap().len(), 1);
    assert_eq!(collection[0]["release"]["discogsId"], 123);
}

#[tokio::test]
async fn test_invalid_csv_rejected_without_job() {
    let test = create_test_app().await;

    for contents in ["", "Name,Title\nDaft Punk,Discovery\n", "Artist,Album,Format\n"] {
        let response = test
            .app
            .clone()
            .oneshot(upload_request(&test.token, contents))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "contents: {:?}", contents);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM import_jobs")
        .fetch_one(&test.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_upload_without_file_field_rejected() {
    let test = create_test_app().await;

    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"notes\"\r\n\r\nhello\r\n--{b}--\r\n",
        b = BOUNDARY
    );
    let request = Request::builder()
        .method("POST")
        .uri("/import")
        .header(header::AUTHORIZATION, format!("Bearer {}", test.token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();

    let response = test.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_other_users_log_is_not_found() {
    let test = create_test_app().await;
    let log_id = upload_and_wait(&test, SAMPLE_CSV).await;
    let (_bob, bob_token) = create_user(&test.pool, "bob").await;

    for uri in [
        format!("/import/logs/{}", log_id),
        format!("/import/logs/{}/download", log_id),
    ] {
        let response = test
            .app
            .clone()
            .oneshot(get_request(&bob_token, &uri))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "uri: {}", uri);
    }

    let response = test
        .app
        .clone()
        .oneshot(get_request(&bob_token, "/import/logs"))
        .await
        .unwrap();
    assert!(body_json(response).await.as_array().unwrap().is_empty());

    let response = test
        .app
        .oneshot(get_request(
            &test.token,
            &format!("/import/logs/{}", Uuid::new_v4()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_log_formats() {
    let test = create_test_app().await;
    let log_id = upload_and_wait(&test, SAMPLE_CSV).await;

    let response = test
        .app
        .clone()
        .oneshot(get_request(
            &test.token,
            &format!("/import/logs/{}/download", log_id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"import-{}.json\"", log_id).as_str()
    );
    let json = body_json(response).await;
    assert_eq!(json["entries"].as_array().unwrap().len(), 3);

    let response = test
        .app
        .clone()
        .oneshot(get_request(
            &test.token,
            &format!("/import/logs/{}/download?format=csv", log_id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    let csv = String::from_utf8(body_bytes(response).await).unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("Row,Status,Reason"));
    assert!(lines[1].starts_with("1,success,"));
    assert!(lines[2].starts_with("2,skipped,no match found"));

    let response = test
        .app
        .oneshot(get_request(
            &test.token,
            &format!("/import/logs/{}/download?format=xml", log_id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_terminal_job_rejected() {
    let test = create_test_app().await;
    let log_id = upload_and_wait(&test, SAMPLE_CSV).await;

    let response = test
        .app
        .oneshot(authed_request(
            "POST",
            &test.token,
            &format!("/import/logs/{}/cancel", log_id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cancel_orphaned_job_marks_error() {
    let test = create_test_app().await;
    let user = musivault_api::db::users::find_by_token(&test.pool, &test.token)
        .await
        .unwrap()
        .unwrap();

    // A processing job with no task behind it
    let store = SqliteImportStore::new(test.pool.clone());
    let job = store.create_job(user.id, "albums.csv", 3).await.unwrap();

    let response = test
        .app
        .oneshot(authed_request(
            "POST",
            &test.token,
            &format!("/import/logs/{}/cancel", job.id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["cancelRequested"], true);
    assert_eq!(json["status"], "error");

    let job = musivault_api::db::import_jobs::load_job(&test.pool, job.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, ImportStatus::Error);
    assert_eq!(job.error_message.as_deref(), Some("Import cancelled by user"));
}

#[tokio::test]
async fn test_collection_delete() {
    let test = create_test_app().await;
    upload_and_wait(&test, SAMPLE_CSV).await;

    let response = test
        .app
        .clone()
        .oneshot(get_request(&test.token, "/collection"))
        .await
        .unwrap();
    let collection = body_json(response).await;
    let entry_id = collection[0]["id"].as_str().unwrap().to_string();

    let (_bob, bob_token) = create_user(&test.pool, "bob").await;
    let response = test
        .app
        .clone()
        .oneshot(authed_request(
            "DELETE",
            &bob_token,
            &format!("/collection/{}", entry_id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let uri = format!("/collection/{}", entry_id);
    let response = test
        .app
        .clone()
        .oneshot(authed_request("DELETE", &test.token, &uri))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = test
        .app
        .clone()
        .oneshot(authed_request("DELETE", &test.token, &uri))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The shared catalog record outlives the entry
    assert_eq!(
        musivault_api::db::catalog::count_by_discogs_id(&test.pool, 123)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_upload_over_body_limit_rejected() {
    let (_dir, pool) = create_test_db().await;
    let (_user, token) = create_user(&pool, "alice").await;
    let config = ImportConfig {
        max_upload_bytes: 64,
        ..ImportConfig::default()
    };
    let state = musivault_api::AppState::new(pool, MockCatalog::new(), config);
    let app = musivault_api::build_router(state);

    let response = app.oneshot(upload_request(&token, SAMPLE_CSV)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_failed_job_reported_by_health() {
    let (_dir, pool) = create_test_db().await;
    let (_user, token) = create_user(&pool, "alice").await;
    let store: Arc<dyn ImportStore> = helpers::FailingStore::new(pool.clone(), 1);
    let state = musivault_api::AppState::with_store(
        pool.clone(),
        MockCatalog::new(),
        store,
        ImportConfig::default(),
    );
    let app = musivault_api::build_router(state);

    let response = app
        .clone()
        .oneshot(upload_request(&token, SAMPLE_CSV))
        .await
        .unwrap();
    let upload: UploadResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let job = wait_for_terminal(&pool, upload.log_id).await;
    assert_eq!(job.status, ImportStatus::Error);

    // The task publishes the failure just after marking the job
    let mut last_error = Value::Null;
    for _ in 0..100 {
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        last_error = body_json(response).await["lastError"].clone();
        if !last_error.is_null() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(last_error
        .as_str()
        .unwrap()
        .contains("failed to record row 1"));
}
