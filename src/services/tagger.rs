//! ISIL tagging.

use std::collections::{BTreeSet, HashMap};

use crate::models::IntermediateSchema;
use crate::services::Filter;

/// Maps an ISIL to one or more filters.
///
/// If any filter of an institution accepts a record, the ISIL is attached;
/// the order of filters does not matter.
#[derive(Debug, Clone, Default)]
pub struct IsilTagger {
    filters: HashMap<String, Vec<Filter>>,
}

impl IsilTagger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter for an institution.
    pub fn add(&mut self, isil: impl Into<String>, filter: Filter) {
        self.filters.entry(isil.into()).or_default().push(filter);
    }

    /// Register an institution without filters; it never matches.
    pub fn register(&mut self, isil: impl Into<String>) {
        self.filters.entry(isil.into()).or_default();
    }

    /// All ISILs that can be attached to a record, sorted.
    pub fn tags(&self, is: &IntermediateSchema) -> Vec<String> {
        self.filters
            .iter()
            .filter(|(_, filters)| filters.iter().any(|f| f.apply(is)))
            .map(|(isil, _)| isil.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Configured institutions, sorted.
    pub fn isils(&self) -> Vec<&str> {
        let mut isils: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        isils.sort_unstable();
        isils
    }

    pub fn filters(&self, isil: &str) -> &[Filter] {
        self.filters.get(isil).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
