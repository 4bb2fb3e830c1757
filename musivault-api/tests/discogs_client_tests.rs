//! Discogs client tests against a local stub server

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use musivault_api::models::PhysicalFormat;
use musivault_api::services::{
    CatalogError, CatalogService, DiscogsClient, DiscogsClientConfig, SearchQuery,
};
use serde_json::json;

#[derive(Clone, Default)]
struct Stub {
    hits: Arc<AtomicUsize>,
    /// Number of leading requests answered with 429
    throttle_first: Arc<AtomicUsize>,
    last_auth: Arc<Mutex<Option<String>>>,
    last_query: Arc<Mutex<HashMap<String, String>>>,
}

impl Stub {
    fn observe(&self, headers: &HeaderMap) -> bool {
        let hit = self.hits.fetch_add(1, Ordering::SeqCst);
        *self.last_auth.lock().unwrap() = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        hit < self.throttle_first.load(Ordering::SeqCst)
    }
}

async fn search(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if stub.observe(&headers) {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    *stub.last_query.lock().unwrap() = params;
    Json(json!({
        "pagination": { "items": 2 },
        "results": [
            { "id": 1, "title": "Nirvana - Nevermind", "year": "1991", "cover_image": "" },
            { "id": 2, "title": "Nirvana - Nevermind", "year": "" }
        ]
    }))
    .into_response()
}

async fn release(State(stub): State<Stub>, headers: HeaderMap, Path(id): Path<u64>) -> Response {
    if stub.observe(&headers) {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    match id {
        999 => Json(json!({
            "id": 999,
            "title": "Nevermind",
            "artists": [{ "name": "Nirvana (2)" }],
            "year": 1991,
            "images": [
                { "type": "secondary", "uri": "https://img.example/back.jpg" },
                { "type": "primary", "uri": "https://img.example/front.jpg" }
            ],
            "styles": ["Grunge"],
            "genres": ["Rock"],
            "tracklist": [
                { "position": "", "title": "Side A", "type_": "heading" },
                { "position": "A1", "title": "Smells Like Teen Spirit", "duration": "5:01", "type_": "track" },
                { "position": "A2", "title": "In Bloom", "duration": "", "type_": "track" }
            ],
            "labels": [{ "name": "DGC", "catno": "DGC-24425" }],
            "formats": [{ "name": "Vinyl", "text": "180g", "descriptions": ["LP", "Album"] }]
        }))
        .into_response(),
        403 => StatusCode::FORBIDDEN.into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn spawn_stub(stub: Stub) -> String {
    let app = Router::new()
        .route("/database/search", get(search))
        .route("/releases/:id", get(release))
        .with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base_url: String, max_retries: u32) -> DiscogsClient {
    paced_client(base_url, max_retries, Duration::from_millis(1))
}

fn paced_client(base_url: String, max_retries: u32, interval: Duration) -> DiscogsClient {
    DiscogsClient::new(DiscogsClientConfig {
        base_url,
        consumer_key: "test-key".to_string(),
        consumer_secret: "test-secret".to_string(),
        user_agent: "musivault-tests/0.1".to_string(),
        min_request_interval: interval,
        max_retries,
        retry_wait: Duration::from_millis(5),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn nevermind_query() -> SearchQuery {
    SearchQuery {
        artist: "Nirvana".to_string(),
        album: "Nevermind".to_string(),
        format: PhysicalFormat::Vinyl,
    }
}

#[tokio::test]
async fn test_search_sends_query_and_credentials() {
    let stub = Stub::default();
    let client = client(spawn_stub(stub.clone()).await, 3);

    let hits = client.search_releases(&nevermind_query()).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, 1);
    assert_eq!(hits[0].year, Some(1991));
    assert_eq!(hits[0].cover_image, None);
    assert_eq!(hits[1].year, None);

    let query = stub.last_query.lock().unwrap().clone();
    assert_eq!(query.get("q").map(String::as_str), Some("Nirvana Nevermind"));
    assert_eq!(query.get("type").map(String::as_str), Some("release"));
    assert_eq!(query.get("format").map(String::as_str), Some("Vinyl"));
    assert_eq!(
        stub.last_auth.lock().unwrap().as_deref(),
        Some("Discogs key=test-key, secret=test-secret")
    );
}

#[tokio::test]
async fn test_fetch_release_maps_details() {
    let stub = Stub::default();
    let client = client(spawn_stub(stub).await, 3);

    let release = client.fetch_release(999).await.unwrap();
    assert_eq!(release.title, "Nevermind");
    assert_eq!(release.artists, vec!["Nirvana".to_string()]);
    assert_eq!(release.year, Some(1991));
    assert_eq!(release.cover_image.as_deref(), Some("https://img.example/front.jpg"));
    assert_eq!(release.tracklist.len(), 2);
    assert_eq!(release.tracklist[0].duration.as_deref(), Some("5:01"));
    assert_eq!(release.tracklist[1].duration, None);
    assert_eq!(release.labels[0].catalog_number.as_deref(), Some("DGC-24425"));
    assert_eq!(release.formats[0].text.as_deref(), Some("180g"));
}

#[tokio::test]
async fn test_missing_release_is_not_found() {
    let client = client(spawn_stub(Stub::default()).await, 3);
    assert_eq!(client.fetch_release(1).await, Err(CatalogError::NotFound));
}

#[tokio::test]
async fn test_rejected_credentials() {
    let client = client(spawn_stub(Stub::default()).await, 3);
    assert_eq!(
        client.fetch_release(403).await,
        Err(CatalogError::InvalidCredentials)
    );
}

#[tokio::test]
async fn test_rate_limit_retries_then_succeeds() {
    let stub = Stub::default();
    stub.throttle_first.store(2, Ordering::SeqCst);
    let client = client(spawn_stub(stub.clone()).await, 3);

    let hits = client.search_releases(&nevermind_query()).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(stub.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_rate_limit_exhausted_reports_attempts() {
    let stub = Stub::default();
    stub.throttle_first.store(usize::MAX, Ordering::SeqCst);
    let client = client(spawn_stub(stub.clone()).await, 2);

    let result = client.fetch_release(999).await;
    assert_eq!(result, Err(CatalogError::RateLimited { attempts: 3 }));
    assert_eq!(stub.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    // Bind then drop to get a port with nothing listening
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(format!("http://{}", addr), 0);
    let result = client.fetch_release(999).await;
    assert!(matches!(result, Err(CatalogError::Network(_))), "{:?}", result);
}

#[tokio::test]
async fn test_concurrent_requests_share_minimum_interval() {
    let stub = Stub::default();
    let interval = Duration::from_millis(200);
    let client = Arc::new(paced_client(spawn_stub(stub.clone()).await, 0, interval));

    let started = tokio::time::Instant::now();
    let calls: Vec<_> = (0..4)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.fetch_release(999).await })
        })
        .collect();
    for call in calls {
        assert!(call.await.unwrap().is_ok());
    }

    // The first request passes immediately, each later one waits a full interval
    assert!(started.elapsed() >= interval * 3, "{:?}", started.elapsed());
    assert_eq!(stub.hits.load(Ordering::SeqCst), 4);
}
