//! Drives the bronze, silver and gold stages over a list of identifiers.
//!
//! Identifiers run one after another. Within an identifier the selected stages run
//! in order and the first error ends that identifier; the next identifier still
//! runs. Everything that happened ends up in a [`RunReport`].

use crate::bronze::{BronzeLoader, BronzeReport};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::gold::{self, GoldReport, TransformRegistry};
use crate::raw::{RawStore, Retriever};
use crate::silver::{SilverReport, SilverResolver};
use crate::store::TableStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One refinement stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Stage {
    Bronze,
    Silver,
    Gold,
}

impl Stage {
    pub const ALL: [Self; 3] = [Self::Bronze, Self::Silver, Self::Gold];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
        }
    }

    pub fn parse_stage(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "bronze" => Some(Self::Bronze),
            "silver" => Some(Self::Silver),
            "gold" => Some(Self::Gold),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// The three stage databases.
#[derive(Debug, Clone)]
pub struct Stores {
    pub bronze: TableStore,
    pub silver: TableStore,
    pub gold: TableStore,
}

impl Stores {
    pub async fn open(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            bronze: TableStore::open(&config.bronze_db).await?,
            silver: TableStore::open(&config.silver_db).await?,
            gold: TableStore::open(&config.gold_db).await?,
        })
    }

    pub fn for_stage(&self, stage: Stage) -> &TableStore {
        match stage {
            Stage::Bronze => &self.bronze,
            Stage::Silver => &self.silver,
            Stage::Gold => &self.gold,
        }
    }

    pub async fn close(&self) {
        self.bronze.close().await;
        self.silver.close().await;
        self.gold.close().await;
    }
}

/// Stage-specific result of a successful stage.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum StageReport {
    Bronze(BronzeReport),
    Silver(SilverReport),
    Gold(GoldReport),
}

impl StageReport {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Bronze(_) => Stage::Bronze,
            Self::Silver(_) => Stage::Silver,
            Self::Gold(_) => Stage::Gold,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::Bronze(r) => format!(
                "{} tables loaded, {} skipped, {} failed",
                r.loaded.len(),
                r.skipped.len(),
                r.failures.len()
            ),
            Self::Silver(r) => format!(
                "{} rows, {} dimensions joined, {} skipped",
                r.silver_rows,
                r.joined.len(),
                r.skipped.len()
            ),
            Self::Gold(r) => format!("{} rows, {} columns", r.gold_rows, r.columns.len()),
        }
    }
}

/// What happened to one identifier.
#[derive(Clone, Debug, Serialize)]
pub struct IdentifierOutcome {
    pub identifier: String,
    pub completed: Vec<StageReport>,
    /// Stage that failed and its error, if any.
    pub failure: Option<(Stage, String)>,
}

impl IdentifierOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<Stage>,
    pub outcomes: Vec<IdentifierOutcome>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn summary(&self) -> String {
        let stages = self
            .stages
            .iter()
            .map(Stage::as_str)
            .collect::<Vec<_>>()
            .join(" → ");
        format!(
            "Run {} ({stages}): {} identifiers, {} succeeded, {} failed, {:.2}s",
            self.run_id,
            self.outcomes.len(),
            self.succeeded(),
            self.failed(),
            (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
        )
    }
}

pub struct Pipeline {
    raw: RawStore,
    stores: Stores,
    loader: BronzeLoader,
    resolver: SilverResolver,
    registry: TransformRegistry,
    retriever: Option<Box<dyn Retriever>>,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig, stores: Stores, registry: TransformRegistry) -> Self {
        let raw = RawStore::new(&config.raw_root);
        Self {
            loader: BronzeLoader::new(raw.clone())
                .with_sample_rows(config.sample_rows)
                .with_fact_resource(&config.fact_resource),
            raw,
            stores,
            resolver: SilverResolver::new(config.sample_rows),
            registry,
            retriever: None,
        }
    }

    /// Opens the stage databases named in `config` with the built-in transforms.
    pub async fn open(config: &PipelineConfig) -> Result<Self> {
        let stores = Stores::open(config).await?;
        Ok(Self::new(config, stores, TransformRegistry::with_builtins()))
    }

    /// Fetches missing raw data through `retriever` before the bronze stage.
    #[must_use]
    pub fn with_retriever(mut self, retriever: Box<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn registry(&self) -> &TransformRegistry {
        &self.registry
    }

    pub async fn run(&self, identifiers: &[String], stages: &[Stage]) -> RunReport {
        let mut stages = stages.to_vec();
        stages.sort();
        stages.dedup();

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(
            "Starting run {run_id}: {} identifiers, stages {:?}",
            identifiers.len(),
            stages
        );

        let mut outcomes = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            outcomes.push(self.run_identifier(identifier, &stages).await);
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            stages,
            outcomes,
        };
        tracing::info!("{}", report.summary());
        report
    }

    async fn run_identifier(&self, identifier: &str, stages: &[Stage]) -> IdentifierOutcome {
        let mut outcome = IdentifierOutcome {
            identifier: identifier.to_owned(),
            completed: Vec::new(),
            failure: None,
        };

        for stage in stages {
            match self.run_stage(identifier, *stage).await {
                Ok(report) => {
                    tracing::info!("{identifier} {stage}: {}", report.summary());
                    outcome.completed.push(report);
                }
                Err(err) => {
                    match &err {
                        PipelineError::TransformNotImplemented(_) => {
                            tracing::warn!("{identifier} {stage}: {err}");
                        }
                        _ => tracing::error!("{identifier} {stage}: {err}"),
                    }
                    outcome.failure = Some((*stage, err.to_string()));
                    break;
                }
            }
        }

        outcome
    }

    /// Runs a single stage for a single identifier.
    pub async fn run_stage(&self, identifier: &str, stage: Stage) -> Result<StageReport> {
        match stage {
            Stage::Bronze => {
                if let Some(retriever) = &self.retriever {
                    self.raw.fetch(identifier, retriever.as_ref())?;
                }
                let report = self.loader.load(&self.stores.bronze, identifier).await?;
                Ok(StageReport::Bronze(report))
            }
            Stage::Silver => {
                let report = self
                    .resolver
                    .resolve(&self.stores.bronze, &self.stores.silver, identifier)
                    .await?;
                report.check_row_count()?;
                Ok(StageReport::Silver(report))
            }
            Stage::Gold => {
                let report = gold::flatten(
                    &self.stores.silver,
                    &self.stores.gold,
                    identifier,
                    &self.registry,
                )
                .await?;
                Ok(StageReport::Gold(report))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_parsing_and_order() {
        assert_eq!(Stage::parse_stage("Silver"), Some(Stage::Silver));
        assert_eq!(Stage::parse_stage(" gold "), Some(Stage::Gold));
        assert_eq!(Stage::parse_stage("platinum"), None);

        assert!(Stage::Bronze < Stage::Silver && Stage::Silver < Stage::Gold);
    }

    #[test]
    fn test_run_report_summary() {
        let started_at = Utc::now();
        let report = RunReport {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: started_at + chrono::Duration::milliseconds(1500),
            stages: Stage::ALL.to_vec(),
            outcomes: vec![
                IdentifierOutcome {
                    identifier: "80072ned".to_owned(),
                    completed: Vec::new(),
                    failure: None,
                },
                IdentifierOutcome {
                    identifier: "83415NED".to_owned(),
                    completed: Vec::new(),
                    failure: Some((Stage::Gold, "not implemented".to_owned())),
                },
            ],
        };

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        let summary = report.summary();
        assert!(summary.contains("bronze → silver → gold"), "{summary}");
        assert!(summary.contains("2 identifiers, 1 succeeded, 1 failed, 1.50s"), "{summary}");
    }
}
