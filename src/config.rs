// src/config.rs

//! Configuration loading utilities.
//!
//! This module turns a `Config` (plus command line overrides) into the
//! read-only pieces a conversion run shares: the ISIL tagger, the holdings
//! tables and the member name cache.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::{AppError, HoldingsError, Result};
use crate::models::{Config, FilterSpec, IsilIssnHolding};
use crate::services::{Filter, HoldingsFilter, IsilTagger, ListFilter, MemberNames, holdings_map};

/// Parse a holding spec of the form `ISIL:PATH,ISIL:PATH`.
///
/// An empty spec yields an empty map.
pub fn parse_holding_spec(spec: &str) -> Result<BTreeMap<String, PathBuf>> {
    let mut pairs = BTreeMap::new();
    if spec.trim().is_empty() {
        return Ok(pairs);
    }

    for part in spec.split(',') {
        let Some((isil, path)) = part.split_once(':') else {
            return Err(AppError::config(format!(
                "invalid holding spec {part:?}, expected ISIL:PATH"
            )));
        };
        let (isil, path) = (isil.trim(), path.trim());
        if isil.is_empty() || path.is_empty() {
            return Err(AppError::config(format!(
                "invalid holding spec {part:?}, empty ISIL or path"
            )));
        }
        if pairs.insert(isil.to_string(), PathBuf::from(path)).is_some() {
            return Err(AppError::config(format!(
                "duplicate ISIL {isil} in holding spec"
            )));
        }
    }
    Ok(pairs)
}

/// Merge a holding spec into the configured filters.
pub fn apply_holding_spec(config: &mut Config, hspec: &BTreeMap<String, PathBuf>) {
    for (isil, path) in hspec {
        config
            .isils
            .entry(isil.clone())
            .or_default()
            .push(FilterSpec::Holdings { path: path.clone() });
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("cannot open {}: {}", path.display(), e)))?;
    Ok(BufReader::new(file))
}

/// Parse a holdings file into a filter, logging the errors collected on the way.
pub fn load_holdings_filter(path: &Path) -> Result<(HoldingsFilter, Vec<HoldingsError>)> {
    let (filter, errors) = HoldingsFilter::from_reader(open(path)?);
    if !errors.is_empty() {
        for e in &errors {
            log::warn!("{}: {}", path.display(), e);
        }
        log::warn!("{} errors in holdings file {}", errors.len(), path.display());
    }
    log::debug!(
        "Loaded {} licenses for {} ISSNs from {}",
        filter.table().license_count(),
        filter.table().issn_count(),
        path.display()
    );
    Ok((filter, errors))
}

/// Build the filter described by one spec.
pub fn build_filter(spec: &FilterSpec) -> Result<Filter> {
    Ok(match spec {
        FilterSpec::Any => Filter::Any,
        FilterSpec::Source { source_id } => Filter::Source(source_id.clone()),
        FilterSpec::List { path } => Filter::List(ListFilter::from_reader(open(path)?)?),
        FilterSpec::Holdings { path } => Filter::Holdings(load_holdings_filter(path)?.0),
    })
}

/// Build the ISIL tagger for every configured institution.
pub fn build_tagger(config: &Config) -> Result<IsilTagger> {
    let mut tagger = IsilTagger::new();
    for (isil, specs) in &config.isils {
        tagger.register(isil.as_str());
        for spec in specs {
            tagger.add(isil.as_str(), build_filter(spec)?);
        }
        log::info!("{}: {} filters", isil, specs.len());
    }
    Ok(tagger)
}

/// Decode the holdings of every institution in a holding spec.
pub fn load_isil_holdings(hspec: &BTreeMap<String, PathBuf>) -> Result<IsilIssnHolding> {
    let mut holdings = IsilIssnHolding::new();
    for (isil, path) in hspec {
        let table = holdings_map(open(path)?);
        log::debug!("{}: {} ISSNs from {}", isil, table.len(), path.display());
        holdings.insert(isil.as_str(), table);
    }
    Ok(holdings)
}

/// Load the member name cache, or an empty one when none is configured.
pub fn load_members(config: &Config) -> Result<MemberNames> {
    match &config.members {
        Some(path) => MemberNames::load(path),
        None => Ok(MemberNames::default()),
    }
}
