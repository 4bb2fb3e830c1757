//! musivault-api library interface
//!
//! Exposes the router, state and import pipeline for the binary and for
//! integration tests.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use musivault_common::config::ImportConfig;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::services::{CatalogService, ImportOrchestrator, ImportStore, SqliteImportStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Writes of the import pipeline
    pub store: Arc<dyn ImportStore>,
    /// Shared by all jobs, so the catalog rate limit applies across users
    pub orchestrator: Arc<ImportOrchestrator>,
    pub import_config: ImportConfig,
    /// Cancellation tokens for running import jobs
    pub cancellation_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Most recent import job failure, shown by /health
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, catalog: Arc<dyn CatalogService>, import_config: ImportConfig) -> Self {
        let store: Arc<dyn ImportStore> = Arc::new(SqliteImportStore::new(db.clone()));
        Self::with_store(db, catalog, store, import_config)
    }

    /// State with a custom import store
    pub fn with_store(
        db: SqlitePool,
        catalog: Arc<dyn CatalogService>,
        store: Arc<dyn ImportStore>,
        import_config: ImportConfig,
    ) -> Self {
        let orchestrator = ImportOrchestrator::new(catalog, store.clone())
            .with_job_timeout(import_config.job_timeout_secs.map(Duration::from_secs));

        Self {
            db,
            store,
            orchestrator: Arc::new(orchestrator),
            import_config,
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.import_config.max_upload_bytes;

    Router::new()
        .merge(api::import_routes())
        .merge(api::collection_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
