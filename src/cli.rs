use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use medallion::config::PipelineConfig;
use medallion::gold;
use medallion::pipeline::{Pipeline, RunReport, Stage, Stores};
use medallion::store::TableStore;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "medallion",
    version,
    about = "Bronze → silver → gold refinement of statistics exports"
)]
pub struct Cli {
    /// Path to a JSON config file
    #[arg(short, long, global = true, env = "MEDALLION_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Land raw JSON resources as bronze tables
    Bronze {
        /// Table identifiers. Defaults to the configured list.
        identifiers: Vec<String>,
    },
    /// Join bronze fact and dimension tables into silver tables
    Silver {
        /// Table identifiers. Defaults to the configured list.
        identifiers: Vec<String>,
    },
    /// Apply per-identifier transforms to build gold tables
    Gold {
        /// Table identifiers. Defaults to the configured list.
        identifiers: Vec<String>,
    },
    /// Run every stage in order
    Run {
        /// Table identifiers. Defaults to the configured list.
        identifiers: Vec<String>,
    },
    /// List the tables and columns of a stage database
    Tables {
        /// bronze, silver or gold
        #[arg(value_parser = parse_stage)]
        stage: Stage,
    },
    /// Show the train/test feature split of a gold table
    Features {
        /// Table identifier
        identifier: String,
    },
}

fn parse_stage(s: &str) -> std::result::Result<Stage, String> {
    Stage::parse_stage(s).ok_or_else(|| format!("unknown stage '{s}' (expected bronze, silver or gold)"))
}

pub async fn run_command(command: Commands, config: PipelineConfig) -> Result<()> {
    match command {
        Commands::Bronze { identifiers } => run_stages(&config, identifiers, &[Stage::Bronze]).await,
        Commands::Silver { identifiers } => run_stages(&config, identifiers, &[Stage::Silver]).await,
        Commands::Gold { identifiers } => run_stages(&config, identifiers, &[Stage::Gold]).await,
        Commands::Run { identifiers } => run_stages(&config, identifiers, &Stage::ALL).await,
        Commands::Tables { stage } => handle_tables(&config, stage).await,
        Commands::Features { identifier } => handle_features(&config, &identifier).await,
    }
}

async fn run_stages(config: &PipelineConfig, identifiers: Vec<String>, stages: &[Stage]) -> Result<()> {
    let identifiers = if identifiers.is_empty() {
        config.identifiers.clone()
    } else {
        identifiers
    };

    let pipeline = Pipeline::open(config)
        .await
        .context("Failed to open stage databases")?;
    let report = pipeline.run(&identifiers, stages).await;
    pipeline.stores().close().await;

    print_report(&report);

    if report.failed() > 0 {
        anyhow::bail!("{} of {} identifiers failed", report.failed(), report.outcomes.len());
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    for outcome in &report.outcomes {
        println!("{}", outcome.identifier);
        for stage in &outcome.completed {
            println!("  {:<7} ok      {}", stage.stage(), stage.summary());
        }
        if let Some((stage, error)) = &outcome.failure {
            println!("  {stage:<7} FAILED  {error}");
        }
    }
    println!("{}", report.summary());
}

async fn handle_tables(config: &PipelineConfig, stage: Stage) -> Result<()> {
    let stores = Stores::open(config).await?;
    let store: &TableStore = stores.for_stage(stage);

    let tables = store.catalogue(|_| true).await?;
    println!("{} ({} tables)", store.path().display(), tables.len());
    for table in &tables {
        let rows = store.row_count(&table.name).await?;
        println!("  {} [{rows} rows]", table.name);
        for column in &table.columns {
            let key = if column.primary_key { " PK" } else { "" };
            println!("    {:<40} {}{key}", column.name, column.kind);
        }
    }

    stores.close().await;
    Ok(())
}

async fn handle_features(config: &PipelineConfig, identifier: &str) -> Result<()> {
    let store = TableStore::open(&config.gold_db).await?;
    let set = gold::load_feature_set(
        &store,
        identifier,
        &config.target_column,
        &config.period_column,
        config.n_splits,
    )
    .await
    .with_context(|| format!("Failed to load feature set for {identifier}"))?;
    store.close().await;

    println!("{identifier}: {} features", set.feature_names.len());
    println!("  train: {} x {}", set.x_train.height(), set.x_train.width());
    println!("  test:  {} x {}", set.x_test.height(), set.x_test.width());
    for name in &set.feature_names {
        println!("  - {name}");
    }
    Ok(())
}
