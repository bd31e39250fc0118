// src/error.rs

//! Unified error handling for the conversion pipeline.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for span operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A holdings file produced parse errors
    #[error("{count} errors in holdings file {path:?}")]
    Holdings { path: PathBuf, count: usize },

    /// A record could not be converted and errors are not ignored
    #[error("Transform error at line {line}: {source}")]
    Transform {
        line: usize,
        #[source]
        source: TransformError,
    },

    /// A pipeline stage failed to shut down cleanly
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a pipeline error.
    pub fn pipeline(message: impl fmt::Display) -> Self {
        Self::Pipeline(message.to_string())
    }
}

/// Moving wall specification errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelayError {
    /// The string does not look like `-<int><M|Y>`
    #[error("unknown format: {0:?}")]
    UnknownFormat(String),

    /// The unit letter is not one of M or Y
    #[error("unknown unit: {0:?}")]
    UnknownUnit(String),

    /// Start and end delay of one entitlement disagree
    #[error("delay mismatch: start {start:?}, end {end:?}")]
    Mismatch { start: String, end: String },
}

/// Errors collected while reading a holdings file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HoldingsError {
    /// An entitlement carries an unusable moving wall
    #[error("{title}: {source}")]
    Delay {
        title: String,
        #[source]
        source: DelayError,
    },

    /// A year, volume or issue exceeds its datum width
    #[error("{title}: {field} {value:?} too wide for datum")]
    DatumOverflow {
        title: String,
        field: &'static str,
        value: String,
    },

    /// The document itself is malformed
    #[error("malformed holdings document: {0}")]
    Xml(String),
}

/// Conversion failures for a single source record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// Record is deliberately left out
    #[error("[skip] {0}")]
    Skip(String),

    /// Record is broken
    #[error("invalid record: {0}")]
    Invalid(String),
}

impl TransformError {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip(reason.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }
}
