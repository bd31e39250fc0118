// src/pipeline/convert.rs

//! Conversion run.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;

use crate::config::{build_tagger, load_members};
use crate::error::Result;
use crate::models::{Config, Importer};
use crate::pipeline::{BatchProcessor, RunStats};

/// Convert newline delimited source documents of type `D` into tagged
/// intermediate schema records.
///
/// Filters and member names are loaded once, before the first line is read.
pub async fn run_convert<D, R, W>(config: &Config, input: R, output: W) -> Result<RunStats>
where
    D: Importer + DeserializeOwned + 'static,
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    config.validate()?;

    let members = load_members(config)?;
    if !members.is_empty() {
        log::info!("Loaded {} member names", members.len());
    }
    let tagger = build_tagger(config)?;
    if tagger.is_empty() {
        log::info!("No institutions configured, records will not be tagged");
    }

    let processor = BatchProcessor::<D>::new(
        config.pipeline.clone(),
        Arc::new(tagger),
        Arc::new(members),
    );

    let start = Instant::now();
    let stats = processor.run(input, output).await?;
    log::info!(
        "Converted {} of {} lines in {} batches ({} skipped) in {:.2?}",
        stats.written,
        stats.lines,
        stats.batches,
        stats.skipped,
        start.elapsed()
    );
    Ok(stats)
}
