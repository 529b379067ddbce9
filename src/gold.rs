//! Feature flattener: silver tables into model-ready gold tables.
//!
//! Every identifier has its own cleaning rules, so the stage itself only loads the
//! silver table into a polars frame, hands it to the transform registered for the
//! identifier and replaces `{identifier}_gold` with the collected result.

pub mod dataset;
pub mod frame;
pub mod naming;
pub mod sick_leave;
pub mod transforms;

use crate::error::Result;
use crate::silver;
use crate::store::TableStore;
use polars::prelude::IntoLazy as _;
use serde::Serialize;

pub use dataset::{FeatureSet, load_feature_set};
pub use transforms::{GoldTransform, TransformRegistry};

pub fn gold_table(identifier: &str) -> String {
    format!("{identifier}_gold")
}

#[derive(Clone, Debug, Serialize)]
pub struct GoldReport {
    pub identifier: String,
    pub table: String,
    pub silver_rows: usize,
    pub gold_rows: usize,
    pub columns: Vec<String>,
}

/// Applies the registered transform for `identifier`.
///
/// The transform is looked up before anything is read, so an unregistered
/// identifier fails without touching either store.
pub async fn flatten(
    silver: &TableStore,
    gold: &TableStore,
    identifier: &str,
    registry: &TransformRegistry,
) -> Result<GoldReport> {
    let transform = registry.get(identifier)?;
    let input = silver.read_table(&silver::silver_table(identifier)).await?;
    let silver_rows = input.height();

    tracing::info!(
        "Flattening {} ({silver_rows} rows): {}",
        input.name,
        transform.description()
    );

    let output = transform.apply(frame::to_frame(&input)?.lazy())?.collect()?;
    let table = frame::from_frame(&gold_table(identifier), &output)?;
    if table.height() < silver_rows {
        tracing::info!(
            "Transform dropped {} of {silver_rows} rows",
            silver_rows - table.height()
        );
    }
    let gold_rows = gold.replace_table(&table).await?;

    tracing::info!(
        "Wrote {gold_rows} rows and {} columns to {}",
        table.width(),
        table.name
    );

    Ok(GoldReport {
        identifier: identifier.to_owned(),
        table: table.name.clone(),
        silver_rows,
        gold_rows,
        columns: table.column_names().into_iter().map(str::to_owned).collect(),
    })
}
