//! # medallion command-line entry point
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Load config (--config, user config file, defaults)
//!   ├─> Initialize logging (stdout + rolling files)
//!   └─> Run the command on a current-thread Tokio runtime
//! ```
//!
//! ```bash
//! medallion run                 # every stage, configured identifiers
//! medallion bronze 80072ned     # one stage, one identifier
//! medallion tables silver       # inspect a stage database
//! medallion features 80072ned   # train/test shapes of a gold table
//! ```

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)]

mod cli;

use anyhow::{Context as _, Result};
use clap::Parser as _;
use medallion::config::PipelineConfig;
use medallion::logging;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let config = PipelineConfig::load(cli.config.as_deref())?;
    logging::init(config.log_dir.as_deref())?;

    // Every stage runs sequentially against single-connection pools, so one
    // thread is all the runtime needs.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(cli::run_command(cli.command, config))
}
