//! CSV telemetry source
//!
//! Reads DCGM-style telemetry exports row by row and turns them into
//! [`GpuMetric`] records. Headers are matched case-insensitively and rows
//! may have a variable number of fields; `uuid` and `metric_name` are the
//! only columns a row cannot do without.
//!
//! The row's own timestamp column is ignored on purpose: the pipeline
//! stamps records with the streamer's wall clock at collection time.

mod labels;
mod source;

pub use labels::parse_labels;
pub use source::{count_records, validate_file, CsvSource};

use thiserror::Error;

/// Errors from the CSV source
#[derive(Debug, Error)]
pub enum ParserError {
    /// Could not open or read the file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV row
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required column is absent from the header row
    #[error("missing required column: {0}")]
    MissingColumn(&'static str),

    /// A row failed record validation
    #[error(transparent)]
    InvalidRecord(#[from] gpufleet_model::ModelError),

    /// File has headers but no data rows
    #[error("CSV file is empty")]
    Empty,
}

/// Result type for parser operations
pub type Result<T> = std::result::Result<T, ParserError>;
