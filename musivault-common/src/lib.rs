//! # Musivault Common Library
//!
//! Shared code for the Musivault services:
//! - Common error and result types
//! - TOML configuration model and loading
//! - Root folder resolution and initialization

pub mod config;
pub mod error;

pub use error::{Error, Result};
