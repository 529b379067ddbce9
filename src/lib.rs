//! # medallion - bronze → silver → gold refinement of statistics exports
//!
//! medallion takes loosely typed JSON exports from a statistics open-data API and
//! refines them in three stages, each materialized in its own SQLite database:
//!
//! 1. **Bronze** lands every raw resource as a table with a synthetic key and
//!    provenance column. Column types are inferred from sampled rows.
//! 2. **Silver** discovers fact → dimension relations from column names and left
//!    joins them into one denormalized table per identifier, never changing the
//!    fact row count.
//! 3. **Gold** applies the cleaning rules registered for an identifier and writes a
//!    model-ready feature table.
//!
//! ## Quick Start
//!
//! ```no_run
//! use medallion::config::PipelineConfig;
//! use medallion::pipeline::{Pipeline, Stage};
//!
//! # async fn example() -> medallion::error::Result<()> {
//! let config = PipelineConfig::default();
//! let pipeline = Pipeline::open(&config).await?;
//!
//! let report = pipeline.run(&config.identifiers, &Stage::ALL).await;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`raw`]: On-disk cache of provider responses and the [`raw::Retriever`] seam
//! - [`infer`]: Schema inference over sampled records
//! - [`store`]: SQLite row store with full-replace materialization
//! - [`bronze`]: Landing loader
//! - [`silver`]: Relational resolver and join key matching
//! - [`gold`]: Per-identifier transforms and the feature-set reader
//! - [`pipeline`]: Stage runner and run reports
//! - [`error`]: Error types and handling utilities

#![warn(clippy::all, rust_2018_idioms)]

pub mod bronze;
pub mod config;
pub mod error;
pub mod gold;
pub mod infer;
pub mod logging;
pub mod pipeline;
pub mod raw;
pub mod silver;
pub mod store;
pub mod table;
