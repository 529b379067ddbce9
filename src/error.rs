//! Centralized error handling for the refinement pipeline.
//!
//! Every stage returns [`Result`], whose error type [`PipelineError`] encodes how far a
//! failure is allowed to spread:
//!
//! | Variant                   | Granularity | Runner behaviour                     |
//! |---------------------------|-------------|--------------------------------------|
//! | `MissingSource`           | identifier  | log, skip the identifier             |
//! | `SchemaInference`         | resource    | log, skip the resource or dimension  |
//! | `Persistence`             | table       | surfaced; the old table is gone      |
//! | `Validation`              | file/record | reject the file, siblings continue   |
//! | `TransformNotImplemented` | identifier  | fail fast for the gold stage         |
//!
//! ## Context Extension Trait
//!
//! ```no_run
//! use medallion::error::ResultExt as _;
//! use std::fs;
//!
//! fn load_config() -> medallion::error::Result<String> {
//!     let text = fs::read_to_string("config.json").context("Failed to read config")?;
//!     Ok(text)
//! }
//! ```

use thiserror::Error;

/// Main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Raw directory, Bronze fact table or Silver table not present for an identifier.
    #[error("Missing source: {0}")]
    MissingSource(String),

    /// No natural-key or primary-key candidate, or nothing to infer from.
    #[error("Schema inference failed: {0}")]
    SchemaInference(String),

    /// Table creation or bulk insert failed; the previous table was already dropped.
    #[error("Failed to materialise table '{table}': {message}")]
    Persistence { table: String, message: String },

    /// Malformed input file or record, or a broken pipeline invariant.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No gold transform registered for the identifier.
    #[error("Gold transform not implemented for identifier '{0}'")]
    TransformNotImplemented(String),

    /// Database errors outside of a materialisation.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O errors (raw store, config files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Feature frame construction errors.
    #[error("Data processing error: {0}")]
    DataFrame(#[from] polars::error::PolarsError),

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Shorthand for a [`PipelineError::Persistence`] on `table`.
    pub fn persistence(table: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Persistence {
            table: table.into(),
            message: err.to_string(),
        }
    }

    /// Whether the failure only concerns one resource, so siblings keep going.
    pub fn is_resource_local(&self) -> bool {
        matches!(self, Self::SchemaInference(_) | Self::Validation(_))
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<PipelineError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: PipelineError = e.into();
            PipelineError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: PipelineError = e.into();
            PipelineError::Other(format!("{}: {}", f(), err))
        })
    }
}
