//! Pipeline entry points.
//!
//! - `run_convert`: Convert line delimited source documents into tagged records
//! - `run_validate`: Check configuration and the files it refers to

pub mod batch;
pub mod convert;
pub mod validate;

pub use batch::{BatchProcessor, RecordConverter, RunStats};
pub use convert::run_convert;
pub use validate::{HoldingsReport, run_validate};
