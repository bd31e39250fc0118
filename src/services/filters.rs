//! Attachment filters.
//!
//! A filter decides whether a record should be attached to an institution.
//! Filters are built once at startup and shared read-only by all workers.

use std::collections::HashSet;
use std::io::BufRead;

use chrono::{DateTime, Utc};

use crate::error::{HoldingsError, Result};
use crate::models::{IntermediateSchema, Licenses};
use crate::services::parse_holdings;

/// The closed set of attachment filters.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Accepts every record.
    Any,
    /// Accepts records of a given source.
    Source(String),
    /// Accepts records with an ISSN from a list.
    List(ListFilter),
    /// Accepts records covered by a license.
    Holdings(HoldingsFilter),
}

impl Filter {
    pub fn apply(&self, is: &IntermediateSchema) -> bool {
        match self {
            Filter::Any => true,
            Filter::Source(source_id) => is.source_id == *source_id,
            Filter::List(f) => f.apply(is),
            Filter::Holdings(f) => f.apply(is),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Filter::Any => "any",
            Filter::Source(_) => "source",
            Filter::List(_) => "list",
            Filter::Holdings(_) => "holdings",
        }
    }
}

/// Set of ISSNs (or other identifiers), one per line in its source.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    set: HashSet<String>,
}

impl ListFilter {
    pub fn new(values: impl IntoIterator<Item = String>) -> Self {
        Self {
            set: values.into_iter().collect(),
        }
    }

    /// Read one value per line; surrounding whitespace is ignored and
    /// blank lines are skipped.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut set = HashSet::new();
        for line in reader.lines() {
            let line = line?;
            let value = line.trim();
            if value.is_empty() {
                continue;
            }
            set.insert(value.to_string());
        }
        Ok(Self { set })
    }

    pub fn apply(&self, is: &IntermediateSchema) -> bool {
        is.issns().any(|issn| self.set.contains(issn))
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

/// License based filter with moving wall support.
///
/// `reference` is the time moving walls are computed from; it is fixed
/// when the filter is built so a run sees one consistent wall.
#[derive(Debug, Clone)]
pub struct HoldingsFilter {
    reference: DateTime<Utc>,
    table: Licenses,
}

impl HoldingsFilter {
    pub fn new(table: Licenses) -> Self {
        Self::with_reference(table, Utc::now())
    }

    pub fn with_reference(table: Licenses, reference: DateTime<Utc>) -> Self {
        Self { reference, table }
    }

    /// Build a filter from a holdings document.
    ///
    /// Returns the filter over everything that parsed, together with the
    /// errors encountered on the way.
    pub fn from_reader(reader: impl BufRead) -> (Self, Vec<HoldingsError>) {
        let (table, errors) = parse_holdings(reader);
        (Self::new(table), errors)
    }

    pub fn table(&self) -> &Licenses {
        &self.table
    }

    /// Check coverage and moving wall for one ISSN.
    ///
    /// An ISSN without licenses is never covered. The wall is released once
    /// it is not in the future relative to the reference time.
    pub fn covered_and_valid(&self, signature: &str, issn: &str) -> bool {
        let Some(licenses) = self.table.get(issn) else {
            return false;
        };
        licenses
            .iter()
            .filter(|license| license.covers(signature))
            .any(|license| license.wall(self.reference) <= self.reference)
    }

    pub fn apply(&self, is: &IntermediateSchema) -> bool {
        let Some(signature) = is.datum() else {
            log::debug!(
                "{}: volume {:?} or issue {:?} too wide for datum, not attached",
                is.record_id,
                is.volume,
                is.issue
            );
            return false;
        };
        is.issns().any(|issn| self.covered_and_valid(&signature, issn))
    }
}
