//! Relational resolver: bronze star schema into one denormalized silver table.
//!
//! The resolver reflects the bronze catalogue of an identifier, pairs every
//! dimension with the fact column that references it (see [`matching`]) and left
//! joins them all in a single query. Dimensions are de-duplicated on their key
//! before joining, so the silver table always has exactly as many rows as the fact
//! table.

pub mod matching;

use crate::bronze::{self, BRONZE_PK, SOURCE_FILE};
use crate::error::{PipelineError, Result};
use crate::infer;
use crate::store::{TableInfo, TableStore, quote};
use crate::table::{ColumnType, InferredColumn, PrimaryKey, Table, Value};
use matching::{match_foreign_key, match_primary_key};
use serde::Serialize;
use std::collections::HashSet;

pub use matching::PRIMARY_KEY_CANDIDATES;

/// Surrogate key prepended to every silver table.
pub const SILVER_ID: &str = "silver_id";

pub fn silver_table(identifier: &str) -> String {
    format!("{identifier}_silver")
}

/// A dimension that took part in the join.
#[derive(Clone, Debug, Serialize)]
pub struct JoinedDimension {
    pub table: String,
    pub short_name: String,
    pub foreign_key: String,
    pub primary_key: String,
    pub columns: Vec<String>,
}

/// A dimension left out of the join, and why.
#[derive(Clone, Debug, Serialize)]
pub struct SkippedDimension {
    pub table: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SilverReport {
    pub identifier: String,
    pub table: String,
    pub fact_rows: usize,
    pub silver_rows: usize,
    pub joined: Vec<JoinedDimension>,
    pub skipped: Vec<SkippedDimension>,
}

impl SilverReport {
    /// Fails when the join changed the number of fact rows.
    pub fn check_row_count(&self) -> Result<()> {
        if self.fact_rows == self.silver_rows {
            Ok(())
        } else {
            Err(PipelineError::Validation(format!(
                "{} has {} rows but the fact table has {}",
                self.table, self.silver_rows, self.fact_rows
            )))
        }
    }
}

/// Join plan for one identifier: the select list, the `FROM` clause and the
/// output column names in select order, with the bronze type of each.
#[derive(Clone, Debug, Default)]
pub struct JoinPlan {
    pub select: Vec<String>,
    pub joins: Vec<String>,
    pub output_columns: Vec<String>,
    pub output_types: Vec<ColumnType>,
    pub joined: Vec<JoinedDimension>,
    pub skipped: Vec<SkippedDimension>,
}

impl JoinPlan {
    /// Plans the join of `fact` with `dimensions`, which are visited in the given
    /// order.
    ///
    /// Output names are unique ignoring case, as SQLite column names are.
    pub fn build(identifier: &str, fact: &TableInfo, dimensions: &[TableInfo]) -> Self {
        let prefix = bronze::dimension_prefix(identifier);
        let fact_columns = fact.column_names();

        let mut plan = Self::default();
        let mut seen: HashSet<String> = HashSet::new();
        for column in &fact.columns {
            plan.select.push(format!("\"f\".{}", quote(&column.name)));
            plan.output_columns.push(column.name.clone());
            plan.output_types.push(column.kind);
            seen.insert(column.name.to_lowercase());
        }

        for dim in dimensions {
            let short_name = dim.name.strip_prefix(&prefix).unwrap_or(&dim.name);
            let dim_columns = dim.column_names();

            let Some(foreign_key) = match_foreign_key(short_name, &fact_columns) else {
                tracing::debug!("No fact column references {}, skipping", dim.name);
                plan.skipped.push(SkippedDimension {
                    table: dim.name.clone(),
                    reason: format!("no fact column matches '{short_name}'"),
                });
                continue;
            };
            let Some(primary_key) = match_primary_key(&dim_columns) else {
                tracing::warn!(
                    "Dimension {} has none of {:?}, skipping join",
                    dim.name,
                    PRIMARY_KEY_CANDIDATES
                );
                plan.skipped.push(SkippedDimension {
                    table: dim.name.clone(),
                    reason: "no primary key candidate".to_owned(),
                });
                continue;
            };

            let alias = format!("d{}", plan.joined.len());
            let mut columns = Vec::new();
            for info in &dim.columns {
                let column = info.name.as_str();
                if column == primary_key || column == BRONZE_PK || column == SOURCE_FILE {
                    continue;
                }
                let output = format!("{short_name}_{column}");
                if !seen.insert(output.to_lowercase()) {
                    tracing::warn!(
                        "Column {output} from {} collides with an earlier column, skipping",
                        dim.name
                    );
                    continue;
                }
                plan.select.push(format!(
                    "{}.{} AS {}",
                    quote(&alias),
                    quote(column),
                    quote(&output)
                ));
                plan.output_columns.push(output.clone());
                plan.output_types.push(info.kind);
                columns.push(output);
            }

            let dim_name = quote(&dim.name);
            let pk = quote(primary_key);
            plan.joins.push(format!(
                "LEFT JOIN (SELECT * FROM {dim_name} WHERE rowid IN \
                 (SELECT MIN(rowid) FROM {dim_name} GROUP BY {pk})) AS {alias_q} \
                 ON \"f\".{fk} = {alias_q}.{pk}",
                alias_q = quote(&alias),
                fk = quote(foreign_key),
            ));

            tracing::debug!(
                "Joining {} on fact.{foreign_key} = {primary_key} ({} columns)",
                dim.name,
                columns.len()
            );
            plan.joined.push(JoinedDimension {
                table: dim.name.clone(),
                short_name: short_name.to_owned(),
                foreign_key: foreign_key.to_owned(),
                primary_key: primary_key.to_owned(),
                columns,
            });
        }

        plan
    }

    pub fn to_sql(&self, fact_table: &str) -> String {
        let mut sql = format!(
            "SELECT {} FROM {} AS \"f\"",
            self.select.join(", "),
            quote(fact_table)
        );
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(" ORDER BY \"f\".rowid");
        sql
    }
}

#[derive(Clone, Debug)]
pub struct SilverResolver {
    sample_rows: usize,
}

impl Default for SilverResolver {
    fn default() -> Self {
        Self {
            sample_rows: infer::DEFAULT_SAMPLE_ROWS,
        }
    }
}

impl SilverResolver {
    pub fn new(sample_rows: usize) -> Self {
        Self { sample_rows }
    }

    /// Builds `{identifier}_silver` in `silver` from the bronze tables in `bronze`.
    ///
    /// An empty fact table yields an empty silver table typed after the bronze
    /// columns. On any failure the previous silver table is dropped, so it never
    /// outlives the bronze data it was built from.
    pub async fn resolve(
        &self,
        bronze: &TableStore,
        silver: &TableStore,
        identifier: &str,
    ) -> Result<SilverReport> {
        match self.materialize(bronze, silver, identifier).await {
            Ok(report) => Ok(report),
            Err(err) => {
                let table = silver_table(identifier);
                tracing::warn!("Dropping {table} after failed resolve: {err}");
                if let Err(drop_err) = silver.drop_table(&table).await {
                    tracing::error!("Failed to drop {table}: {drop_err}");
                }
                Err(err)
            }
        }
    }

    async fn materialize(
        &self,
        bronze: &TableStore,
        silver: &TableStore,
        identifier: &str,
    ) -> Result<SilverReport> {
        let fact_name = bronze::fact_table(identifier);
        let prefix = bronze::dimension_prefix(identifier);

        let catalogue = bronze
            .catalogue(|name| name == fact_name || name.starts_with(&prefix))
            .await?;
        let (facts, dimensions): (Vec<TableInfo>, Vec<TableInfo>) =
            catalogue.into_iter().partition(|t| t.name == fact_name);
        let fact = facts.into_iter().next().ok_or_else(|| {
            PipelineError::MissingSource(format!("bronze table {fact_name} not found"))
        })?;

        tracing::info!(
            "Resolving {identifier}: fact table with {} columns, {} dimensions",
            fact.columns.len(),
            dimensions.len()
        );

        let plan = JoinPlan::build(identifier, &fact, &dimensions);
        let sql = plan.to_sql(&fact_name);
        tracing::debug!("Silver query: {sql}");

        let (_, rows) = bronze.fetch(&sql).await?;
        let fact_rows = bronze.row_count(&fact_name).await?;

        let table = if rows.is_empty() {
            tracing::warn!("{fact_name} is empty, writing an empty silver table");
            empty_table(identifier, &plan)
        } else {
            self.build_table(identifier, &plan.output_columns, rows)?
        };
        let silver_rows = silver.replace_table(&table).await?;

        tracing::info!(
            "Wrote {silver_rows} rows to {} ({} dimensions joined, {} skipped)",
            table.name,
            plan.joined.len(),
            plan.skipped.len()
        );

        Ok(SilverReport {
            identifier: identifier.to_owned(),
            table: table.name,
            fact_rows,
            silver_rows,
            joined: plan.joined,
            skipped: plan.skipped,
        })
    }

    /// Cleans every cell, re-infers the schema and keys the table on `silver_id`.
    pub fn build_table(
        &self,
        identifier: &str,
        names: &[String],
        rows: Vec<Vec<Value>>,
    ) -> Result<Table> {
        let rows: Vec<Vec<Value>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(Value::cleaned).collect())
            .collect();

        let mut columns = infer::infer_values(names, &rows, self.sample_rows)?;
        columns.retain(|c| c.name != SILVER_ID);

        let keep: Vec<usize> = names
            .iter()
            .enumerate()
            .filter(|(_, n)| *n != SILVER_ID)
            .map(|(idx, _)| idx)
            .collect();
        let rows = rows
            .into_iter()
            .map(|row| {
                keep.iter()
                    .zip(&columns)
                    .map(|(idx, col)| {
                        row.get(*idx)
                            .cloned()
                            .unwrap_or(Value::Null)
                            .coerce_to(col.kind)
                    })
                    .collect()
            })
            .collect();

        let mut table = Table::new(silver_table(identifier), columns)
            .with_primary_key(PrimaryKey::AutoIncrement(SILVER_ID.to_owned()));
        table.rows = rows;
        Ok(table)
    }
}

/// Zero-row silver table with the plan's columns and their bronze types.
fn empty_table(identifier: &str, plan: &JoinPlan) -> Table {
    let columns = plan
        .output_columns
        .iter()
        .zip(&plan.output_types)
        .filter(|(name, _)| *name != SILVER_ID)
        .map(|(name, kind)| InferredColumn::new(name.clone(), *kind, true))
        .collect();
    Table::new(silver_table(identifier), columns)
        .with_primary_key(PrimaryKey::AutoIncrement(SILVER_ID.to_owned()))
}
