//! Console and rolling-file logging.
//!
//! Every enabled event goes to the console and to a daily `medallion.<date>.log`
//! file. `RUST_LOG` overrides the default `info` filter.
//!
//! ```no_run
//! medallion::logging::init(None).expect("Failed to initialize logging");
//! tracing::info!("Pipeline started");
//! ```

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use crate::config::APP_NAME;

/// Daily log files kept before the oldest is removed.
const MAX_LOG_FILES: usize = 10;

/// Platform log directory:
/// - Windows: `%APPDATA%/medallion/logs`
/// - macOS: `~/Library/Application Support/medallion/logs`
/// - Linux: `~/.local/share/medallion/logs`
pub fn default_log_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().context("Failed to determine data directory")?;
    Ok(base_dir.join(APP_NAME).join("logs"))
}

fn file_appender(log_dir: &Path) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(APP_NAME)
        .filename_suffix("log")
        .build(log_dir)
        .context("Failed to create log file appender")
}

/// Installs the global subscriber and returns the log directory. Call once, at
/// startup.
///
/// # Errors
///
/// Fails when the log directory cannot be created or a subscriber is already set.
pub fn init(log_dir: Option<&Path>) -> Result<PathBuf> {
    let log_dir = match log_dir {
        Some(dir) => dir.to_path_buf(),
        None => default_log_dir()?,
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to create env filter")?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).compact())
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(file_appender(&log_dir)?),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!("Logging to {}", log_dir.display());
    Ok(log_dir)
}
