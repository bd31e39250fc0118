//! Application configuration structures.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Batching and worker settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Crossref member names, one JSON object per line
    #[serde(default)]
    pub members: Option<PathBuf>,

    /// Attachment filters per ISIL
    #[serde(default)]
    pub isils: BTreeMap<String, Vec<FilterSpec>>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, or the defaults when the file does not exist.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(AppError::config(format!(
                "cannot read config {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.batch_size == 0 {
            return Err(AppError::validation("pipeline.batch_size must be > 0"));
        }
        if self.pipeline.workers == 0 {
            return Err(AppError::validation("pipeline.workers must be > 0"));
        }
        if self.pipeline.channel_capacity == Some(0) {
            return Err(AppError::validation(
                "pipeline.channel_capacity must be > 0",
            ));
        }
        for (isil, specs) in &self.isils {
            if isil.trim().is_empty() {
                return Err(AppError::validation("empty ISIL in isils"));
            }
            for spec in specs {
                spec.validate()
                    .map_err(|e| AppError::validation(format!("isils.{isil}: {e}")))?;
            }
        }
        Ok(())
    }
}

/// Batching and worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Lines per batch handed to a worker
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Number of parallel workers
    #[serde(default = "defaults::workers")]
    pub workers: usize,

    /// Skip records that fail to convert instead of aborting
    #[serde(default)]
    pub ignore_errors: bool,

    /// Log every record that fails to convert
    #[serde(default)]
    pub verbose: bool,

    /// Queue size between stages, defaults to the worker count
    #[serde(default)]
    pub channel_capacity: Option<usize>,
}

impl PipelineConfig {
    pub fn capacity(&self) -> usize {
        self.channel_capacity.unwrap_or(self.workers).max(1)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::batch_size(),
            workers: defaults::workers(),
            ignore_errors: false,
            verbose: false,
            channel_capacity: None,
        }
    }
}

/// How one filter of an institution is built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FilterSpec {
    /// Attach every record
    Any,
    /// Attach records of one source
    Source { source_id: String },
    /// Attach records whose ISSN appears in a list file
    List { path: PathBuf },
    /// Attach records covered by a holdings file
    Holdings { path: PathBuf },
}

impl FilterSpec {
    fn validate(&self) -> std::result::Result<(), String> {
        match self {
            FilterSpec::Any => Ok(()),
            FilterSpec::Source { source_id } if source_id.trim().is_empty() => {
                Err("empty source_id".into())
            }
            FilterSpec::List { path } | FilterSpec::Holdings { path }
                if path.as_os_str().is_empty() =>
            {
                Err("empty path".into())
            }
            _ => Ok(()),
        }
    }
}

mod defaults {
    pub fn batch_size() -> usize {
        25000
    }
    pub fn workers() -> usize {
        num_cpus::get()
    }
}
