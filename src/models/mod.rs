// src/models/mod.rs

//! Domain models for the conversion pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
pub mod crossref;
mod entitlement;
mod license;
mod schema;

// Re-export all public types
pub use config::{Config, FilterSpec, PipelineConfig};
pub use entitlement::{
    Entitlement, HIGH_DATUM, Holding, ISSN_PATTERN, ISSUE_WIDTH, LOW_DATUM, VOLUME_WIDTH, YEAR_WIDTH,
    combine_datum, is_issn, parse_delay,
};
pub use license::{IsilIssnHolding, IssnHolding, License, Licenses};
pub use schema::{Author, Importer, IntermediateSchema};
