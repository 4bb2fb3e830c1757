//! Import pipeline services
//!
//! Leaf first: catalog client, CSV parser, import store, Row Matcher,
//! Import Orchestrator.

pub mod catalog_service;
pub mod csv_parser;
pub mod discogs_client;
pub mod import_orchestrator;
pub mod import_store;
pub mod row_matcher;

pub use catalog_service::{
    CatalogError, CatalogService, ReleaseDetails, ReleaseFormat, SearchHit, SearchQuery,
};
pub use csv_parser::{parse_import_csv, ParseError};
pub use discogs_client::{DiscogsClient, DiscogsClientConfig};
pub use import_orchestrator::{ImportOrchestrator, JobOutcome};
pub use import_store::{ImportStore, SqliteImportStore};
pub use row_matcher::{MatchError, MatchedRelease, RowMatcher};
