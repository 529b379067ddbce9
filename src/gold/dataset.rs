//! Read side of the gold table: a numeric feature set with a chronological split.
//!
//! Model training happens outside this crate; this module is the stable contract
//! it consumes. Rows with a null target are dropped, rows are ordered by the period
//! column and the most recent `n / (n_splits + 1)` rows form the test set, which is
//! the last fold of an expanding-window time-series split.

use crate::error::{PipelineError, Result};
use crate::store::TableStore;
use crate::table::{Table, Value};
use polars::prelude::*;
use std::cmp::Ordering;

use super::frame::column_series;
use super::gold_table;

/// Features and target, split into train and test.
#[derive(Clone, Debug)]
pub struct FeatureSet {
    pub feature_names: Vec<String>,
    pub x_train: DataFrame,
    pub x_test: DataFrame,
    pub y_train: Series,
    pub y_test: Series,
}

impl FeatureSet {
    pub fn train_rows(&self) -> usize {
        self.x_train.height()
    }

    pub fn test_rows(&self) -> usize {
        self.x_test.height()
    }
}

/// Reads `{identifier}_gold` from `store` and splits it.
pub async fn load_feature_set(
    store: &TableStore,
    identifier: &str,
    target: &str,
    period_column: &str,
    n_splits: usize,
) -> Result<FeatureSet> {
    let table = store.read_table(&gold_table(identifier)).await?;
    feature_set_from_table(&table, target, period_column, n_splits)
}

pub fn feature_set_from_table(
    table: &Table,
    target: &str,
    period_column: &str,
    n_splits: usize,
) -> Result<FeatureSet> {
    if n_splits == 0 {
        return Err(PipelineError::Config("n_splits must be at least 1".to_owned()));
    }
    let target_idx = table.column_index(target).ok_or_else(|| {
        PipelineError::Validation(format!("{} has no target column {target}", table.name))
    })?;

    let mut rows: Vec<&Vec<Value>> = table
        .rows
        .iter()
        .filter(|row| row.get(target_idx).and_then(Value::as_f64).is_some())
        .collect();
    let dropped = table.height() - rows.len();
    if dropped > 0 {
        tracing::info!("Dropped {dropped} rows with a null {target}");
    }

    if let Some(period_idx) = table.column_index(period_column) {
        rows.sort_by(|a, b| compare_values(a.get(period_idx), b.get(period_idx)));
    } else {
        tracing::warn!("{} has no {period_column} column, keeping stored order", table.name);
    }

    let n = rows.len();
    let test_len = n / (n_splits + 1);
    if test_len == 0 {
        return Err(PipelineError::Validation(format!(
            "{n} usable rows are not enough for {n_splits} time-series splits"
        )));
    }
    let train_len = n - test_len;

    let mut columns = Vec::new();
    let mut feature_names = Vec::new();
    for (idx, column) in table.columns.iter().enumerate() {
        if idx == target_idx || !column.kind.is_numeric() {
            continue;
        }
        let series = column_series(column, rows.iter().map(|row| row.get(idx).unwrap_or(&Value::Null)));
        columns.push(Column::from(series));
        feature_names.push(column.name.clone());
    }

    let features = DataFrame::new(columns)?;
    let y = Series::new(
        target.into(),
        rows.iter()
            .map(|row| row.get(target_idx).and_then(Value::as_f64))
            .collect::<Vec<Option<f64>>>(),
    );

    let split = i64::try_from(train_len)
        .map_err(|_| PipelineError::Validation(format!("{n} rows do not fit a split offset")))?;

    tracing::info!(
        "Feature set {}: {} features, {train_len} train rows, {test_len} test rows",
        table.name,
        feature_names.len()
    );

    Ok(FeatureSet {
        feature_names,
        x_train: features.slice(0, train_len),
        x_test: features.slice(split, test_len),
        y_train: y.slice(0, train_len),
        y_test: y.slice(split, test_len),
    })
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Text(a)), Some(Value::Text(b))) => a.cmp(b),
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
