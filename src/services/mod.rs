//! Service layer for the conversion pipeline.
//!
//! This module contains the business logic for:
//! - Holdings decoding (`HoldingsReader`, `holdings_map`, `parse_holdings`)
//! - Attachment filters (`Filter`, `ListFilter`, `HoldingsFilter`)
//! - ISIL tagging (`IsilTagger`)
//! - Crossref member names (`MemberNames`)

mod filters;
mod holdings;
mod members;
mod tagger;

pub use filters::{Filter, HoldingsFilter, ListFilter};
pub use holdings::{HoldingsReader, holdings_map, parse_holdings};
pub use members::MemberNames;
pub use tagger::IsilTagger;
