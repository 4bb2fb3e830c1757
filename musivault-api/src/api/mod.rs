//! HTTP API handlers for musivault-api

pub mod collection;
pub mod health;
pub mod import;

pub use collection::collection_routes;
pub use health::health_routes;
pub use import::import_routes;
