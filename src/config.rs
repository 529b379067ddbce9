use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::bronze::FACT_RESOURCE;
use crate::gold::sick_leave::{PERIOD_DATE_COLUMN, TARGET_COLUMN};
use crate::infer::DEFAULT_SAMPLE_ROWS;

pub const APP_NAME: &str = "medallion";

/// Locations and knobs for a pipeline run.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the raw store, one directory per identifier.
    pub raw_root: PathBuf,
    pub bronze_db: PathBuf,
    pub silver_db: PathBuf,
    pub gold_db: PathBuf,
    /// Identifiers processed by `run` and by stage commands given no identifier.
    pub identifiers: Vec<String>,
    /// Rows inspected per column during schema inference (default: 100)
    pub sample_rows: usize,
    /// File name of the fact resource inside an identifier directory
    pub fact_resource: String,
    pub target_column: String,
    pub period_column: String,
    /// Number of time-series splits used by the feature set (default: 5)
    pub n_splits: usize,
    /// Log directory; platform data directory when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_root: PathBuf::from("data/0_raw"),
            bronze_db: PathBuf::from("data/1_bronze/bronze_data.db"),
            silver_db: PathBuf::from("data/2_silver/silver_data.db"),
            gold_db: PathBuf::from("data/3_gold/gold_data.db"),
            identifiers: vec!["80072ned".to_owned(), "83415NED".to_owned()],
            sample_rows: DEFAULT_SAMPLE_ROWS,
            fact_resource: FACT_RESOURCE.to_owned(),
            target_column: TARGET_COLUMN.to_owned(),
            period_column: PERIOD_DATE_COLUMN.to_owned(),
            n_splits: 5,
            log_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path first, then the user config file, then defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Some(path) = default_config_path()
            && path.exists()
        {
            tracing::debug!("Using config file {}", path.display());
            return Self::from_file(&path);
        }

        Ok(Self::default())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rows == 0 {
            anyhow::bail!("sample_rows must be at least 1");
        }
        if self.n_splits == 0 {
            anyhow::bail!("n_splits must be at least 1");
        }
        if self.fact_resource.trim().is_empty() {
            anyhow::bail!("fact_resource must not be empty");
        }
        Ok(())
    }
}

/// `{config_dir}/medallion/config.json`, when the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.bronze_db, PathBuf::from("data/1_bronze/bronze_data.db"));
        assert_eq!(config.identifiers, vec!["80072ned", "83415NED"]);
        assert_eq!(config.sample_rows, 100);
        assert_eq!(config.fact_resource, "TypedDataSet.json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"identifiers": ["80072ned"], "sample_rows": 10}"#).unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.identifiers, vec!["80072ned"]);
        assert_eq!(config.sample_rows, 10);
        assert_eq!(config.raw_root, PathBuf::from("data/0_raw"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = PipelineConfig {
            log_dir: Some(dir.path().join("logs")),
            ..PipelineConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"sample_rows": 0}"#).unwrap();
        assert!(PipelineConfig::from_file(&path).is_err());

        std::fs::write(&path, "not json").unwrap();
        assert!(PipelineConfig::from_file(&path).is_err());
    }
}
