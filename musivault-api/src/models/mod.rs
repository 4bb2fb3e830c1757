//! Data models for musivault-api
//!
//! - Import job state machine and per-row audit entries
//! - Shared catalog records and user collection entries

pub mod catalog_record;
pub mod collection_entry;
pub mod import_job;
pub mod import_row;

pub use catalog_record::{CatalogRecord, LabelCredit, Track};
pub use collection_entry::{
    CollectionEntry, CollectionItem, Condition, FormatDescriptor, NewCollectionEntry,
    PhysicalFormat,
};
pub use import_job::{
    EntryStatus, ImportEntry, ImportJob, ImportStatus, InvalidTransition, StateTransition,
};
pub use import_row::ImportRow;
