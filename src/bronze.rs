//! Landing loader: raw JSON resources into bronze tables.
//!
//! Every resource of an identifier becomes one table, loaded with as little
//! transformation as possible: strings are trimmed, a synthetic `bronze_pk` is put
//! in front and `_source_file` records provenance. The fact resource lands as
//! `{identifier}_fact`, every other resource as `{identifier}_dim_{stem}`.

use crate::error::{PipelineError, Result};
use crate::infer;
use crate::raw::{self, RawStore};
use crate::store::TableStore;
use crate::table::{ColumnType, InferredColumn, PrimaryKey, Record, Table};
use serde::Serialize;
use serde_json::Value as Json;
use std::path::Path;

/// Canonical file name of the fact resource.
pub const FACT_RESOURCE: &str = "TypedDataSet.json";

/// Synthetic primary key column of every bronze table.
pub const BRONZE_PK: &str = "bronze_pk";

/// Provenance column of every bronze table.
pub const SOURCE_FILE: &str = "_source_file";

/// Fields tried, in order, as the natural key of a resource.
pub const NATURAL_KEY_CANDIDATES: [&str; 3] = ["ID", "Key", "DimensionKey"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ResourceRole {
    Fact,
    Dimension,
}

impl ResourceRole {
    pub fn classify(resource_name: &str, fact_resource: &str) -> Self {
        if resource_name == fact_resource {
            Self::Fact
        } else {
            Self::Dimension
        }
    }

    pub fn table_name(&self, identifier: &str, resource_name: &str) -> String {
        match self {
            Self::Fact => fact_table(identifier),
            Self::Dimension => {
                let stem = resource_name.strip_suffix(".json").unwrap_or(resource_name);
                format!("{identifier}_dim_{stem}")
            }
        }
    }
}

pub fn fact_table(identifier: &str) -> String {
    format!("{identifier}_fact")
}

pub fn dimension_prefix(identifier: &str) -> String {
    format!("{identifier}_dim_")
}

/// One table written by the loader.
#[derive(Clone, Debug, Serialize)]
pub struct LoadedTable {
    pub table: String,
    pub resource: String,
    pub role: ResourceRole,
    pub rows: usize,
    pub columns: usize,
}

/// A resource that could not be loaded.
#[derive(Clone, Debug, Serialize)]
pub struct ResourceFailure {
    pub resource: String,
    pub error: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BronzeReport {
    pub identifier: String,
    pub loaded: Vec<LoadedTable>,
    pub skipped: Vec<String>,
    pub failures: Vec<ResourceFailure>,
}

impl BronzeReport {
    pub fn has_fact(&self) -> bool {
        self.loaded.iter().any(|t| t.role == ResourceRole::Fact)
    }
}

#[derive(Clone, Debug)]
pub struct BronzeLoader {
    raw: RawStore,
    sample_rows: usize,
    fact_resource: String,
}

impl BronzeLoader {
    pub fn new(raw: RawStore) -> Self {
        Self {
            raw,
            sample_rows: infer::DEFAULT_SAMPLE_ROWS,
            fact_resource: FACT_RESOURCE.to_owned(),
        }
    }

    #[must_use]
    pub fn with_sample_rows(mut self, sample_rows: usize) -> Self {
        self.sample_rows = sample_rows;
        self
    }

    #[must_use]
    pub fn with_fact_resource(mut self, fact_resource: impl Into<String>) -> Self {
        self.fact_resource = fact_resource.into();
        self
    }

    /// Loads every raw resource of `identifier` into `store`.
    ///
    /// Failures of single resources are logged and collected in the report. The
    /// identifier as a whole fails when its raw directory is missing, or when
    /// writing the fact table failed: that leaves `{identifier}_fact` empty, and
    /// nothing downstream may be built from it.
    pub async fn load(&self, store: &TableStore, identifier: &str) -> Result<BronzeReport> {
        let files = self.raw.resources(identifier)?;
        tracing::info!("Loading {} raw resources for {identifier}", files.len());

        let mut report = BronzeReport {
            identifier: identifier.to_owned(),
            ..BronzeReport::default()
        };
        let mut fact_error = None;

        for path in files {
            let resource = raw::resource_name(&path);
            match self.load_resource(store, identifier, &path).await {
                Ok(Some(loaded)) => {
                    tracing::info!(
                        "Loaded {} rows from {} into {}",
                        loaded.rows,
                        resource,
                        loaded.table
                    );
                    report.loaded.push(loaded);
                }
                Ok(None) => {
                    tracing::warn!("Resource {resource} of {identifier} is empty, skipping");
                    report.skipped.push(resource);
                }
                Err(err) => {
                    if err.is_resource_local() {
                        tracing::warn!("Skipping {resource} of {identifier}: {err}");
                    } else {
                        tracing::error!("Failed to load {resource} of {identifier}: {err}");
                    }
                    let role = ResourceRole::classify(&resource, &self.fact_resource);
                    report.failures.push(ResourceFailure {
                        resource,
                        error: err.to_string(),
                    });
                    if role == ResourceRole::Fact && matches!(err, PipelineError::Persistence { .. }) {
                        fact_error = Some(err);
                    }
                }
            }
        }

        if !report.has_fact() {
            if let Some(err) = fact_error {
                return Err(err);
            }
            tracing::warn!(
                "No {} loaded for {identifier}, silver keeps reading the previous fact table",
                self.fact_resource
            );
        }

        Ok(report)
    }

    async fn load_resource(
        &self,
        store: &TableStore,
        identifier: &str,
        path: &Path,
    ) -> Result<Option<LoadedTable>> {
        let resource = raw::resource_name(path);
        let records = raw::read_resource(path)?;
        if records.is_empty() {
            return Ok(None);
        }

        let role = ResourceRole::classify(&resource, &self.fact_resource);
        let table_name = role.table_name(identifier, &resource);
        let table = build_bronze_table(&table_name, &resource, &records, self.sample_rows)?;

        store.replace_table(&table).await?;

        Ok(Some(LoadedTable {
            table: table_name,
            resource,
            role,
            rows: table.height(),
            columns: table.width(),
        }))
    }
}

/// First natural-key candidate present in `record`.
pub fn natural_key(record: &Record) -> Option<&'static str> {
    NATURAL_KEY_CANDIDATES
        .into_iter()
        .find(|key| record.contains_key(*key))
}

/// Turns raw records into a bronze table: trimmed strings, `bronze_pk` first and
/// `_source_file` last.
pub fn build_bronze_table(
    table_name: &str,
    resource: &str,
    records: &[Record],
    sample_rows: usize,
) -> Result<Table> {
    let first = records.first().ok_or_else(|| {
        PipelineError::SchemaInference(format!("{resource} has no records"))
    })?;
    let key = natural_key(first).ok_or_else(|| {
        PipelineError::SchemaInference(format!(
            "{resource} has none of the natural key fields {NATURAL_KEY_CANDIDATES:?}"
        ))
    })?;

    let cleaned: Vec<Record> = records
        .iter()
        .map(|record| landing_record(record, resource, key))
        .collect();

    let mut columns = infer::infer(&cleaned, sample_rows)?;
    columns.retain(|c| c.name != BRONZE_PK);
    columns.insert(0, InferredColumn::new(BRONZE_PK, ColumnType::String, false));

    Ok(Table::from_records(table_name, columns, &cleaned)
        .with_primary_key(PrimaryKey::Column(BRONZE_PK.to_owned())))
}

fn landing_record(record: &Record, resource: &str, key: &str) -> Record {
    let natural = record.get(key).map_or_else(String::new, key_text);

    let mut out = Record::new();
    out.insert(
        BRONZE_PK.to_owned(),
        Json::String(format!("{resource}_{}", natural.trim())),
    );
    for (name, value) in record {
        if name == BRONZE_PK || name == SOURCE_FILE {
            continue;
        }
        let value = match value {
            Json::String(s) => Json::String(s.trim().to_owned()),
            other => other.clone(),
        };
        out.insert(name.clone(), value);
    }
    out.insert(SOURCE_FILE.to_owned(), Json::String(resource.to_owned()));
    out
}

fn key_text(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashSet;
    use std::fs;

    fn record(value: Json) -> Record {
        match value {
            Json::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_role_and_table_names() {
        let fact = ResourceRole::classify("TypedDataSet.json", FACT_RESOURCE);
        assert_eq!(fact, ResourceRole::Fact);
        assert_eq!(fact.table_name("80072ned", "TypedDataSet.json"), "80072ned_fact");

        let dim = ResourceRole::classify("Perioden.json", FACT_RESOURCE);
        assert_eq!(dim, ResourceRole::Dimension);
        assert_eq!(dim.table_name("80072ned", "Perioden.json"), "80072ned_dim_Perioden");
    }

    #[test]
    fn test_natural_key_order() {
        assert_eq!(natural_key(&record(json!({"Key": "a", "ID": 1}))), Some("ID"));
        assert_eq!(natural_key(&record(json!({"DimensionKey": "a", "Key": "b"}))), Some("Key"));
        assert_eq!(natural_key(&record(json!({"Title": "x"}))), None);
    }

    #[test]
    fn test_bronze_pk_is_unique_and_first() {
        let records: Vec<Record> = (0..5)
            .map(|i| record(json!({"ID": i, "Perioden": format!(" 2023KW0{} ", i % 4 + 1)})))
            .collect();

        let table = build_bronze_table("x_fact", "TypedDataSet.json", &records, 100).unwrap();

        assert_eq!(table.column_names(), vec![BRONZE_PK, "ID", "Perioden", SOURCE_FILE]);
        assert_eq!(table.primary_key, PrimaryKey::Column(BRONZE_PK.to_owned()));

        let pks: HashSet<String> = table
            .values(BRONZE_PK)
            .unwrap()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect();
        assert_eq!(pks.len(), 5);
        assert!(pks.contains("TypedDataSet.json_3"));

        assert_eq!(table.rows[0][2], Value::Text("2023KW01".to_owned()));
        assert_eq!(table.rows[0][3], Value::Text("TypedDataSet.json".to_owned()));
    }

    #[test]
    fn test_missing_natural_key_is_a_schema_error() {
        let records = vec![record(json!({"Title": "x"}))];
        let err = build_bronze_table("x_dim_Foo", "Foo.json", &records, 100).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaInference(_)));
    }

    #[tokio::test]
    async fn test_load_isolates_bad_resources_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let raw_root = dir.path().join("raw");
        let id_dir = raw_root.join("80072ned");
        fs::create_dir_all(&id_dir).unwrap();
        fs::write(
            id_dir.join("TypedDataSet.json"),
            r#"[{"ID": 0, "Perioden": "2023KW01"}, {"ID": 1, "Perioden": "2023KW02"}]"#,
        )
        .unwrap();
        fs::write(
            id_dir.join("Perioden.json"),
            r#"[{"Key": "2023KW01", "Title": "2023 1e kwartaal"}]"#,
        )
        .unwrap();
        fs::write(id_dir.join("Broken.json"), "{oops").unwrap();
        fs::write(id_dir.join("NoKey.json"), r#"[{"Title": "x"}]"#).unwrap();
        fs::write(id_dir.join("Empty.json"), "[]").unwrap();

        let store = TableStore::open(dir.path().join("bronze.db")).await.unwrap();
        let loader = BronzeLoader::new(RawStore::new(&raw_root));

        let report = loader.load(&store, "80072ned").await.unwrap();
        assert!(report.has_fact());
        assert_eq!(report.loaded.len(), 2);
        assert_eq!(report.skipped, vec!["Empty.json".to_owned()]);
        let failed: Vec<&str> = report.failures.iter().map(|f| f.resource.as_str()).collect();
        assert_eq!(failed, vec!["Broken.json", "NoKey.json"]);

        let columns_before = store.columns("80072ned_fact").await.unwrap();
        loader.load(&store, "80072ned").await.unwrap();
        assert_eq!(store.row_count("80072ned_fact").await.unwrap(), 2);
        assert_eq!(store.columns("80072ned_fact").await.unwrap(), columns_before);
        assert_eq!(
            store.table_names().await.unwrap(),
            vec!["80072ned_dim_Perioden".to_owned(), "80072ned_fact".to_owned()]
        );
    }

    #[tokio::test]
    async fn test_failed_fact_write_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let raw_root = dir.path().join("raw");
        let id_dir = raw_root.join("x");
        fs::create_dir_all(&id_dir).unwrap();
        fs::write(
            id_dir.join("TypedDataSet.json"),
            r#"[{"ID": 0, "W": "1"}, {"ID": 1, "W": "2"}, {"ID": 2, "W": "3"}]"#,
        )
        .unwrap();
        fs::write(id_dir.join("W.json"), r#"[{"Key": "1", "Title": "one"}]"#).unwrap();

        let store = TableStore::open(dir.path().join("bronze.db")).await.unwrap();
        let loader = BronzeLoader::new(RawStore::new(&raw_root));
        loader.load(&store, "x").await.unwrap();
        assert_eq!(store.row_count("x_fact").await.unwrap(), 3);

        // "W" is inferred as an integer from the first row; "abc" breaks the insert.
        fs::write(
            id_dir.join("TypedDataSet.json"),
            r#"[{"ID": 0, "W": "1"}, {"ID": 1, "W": "abc"}]"#,
        )
        .unwrap();

        let err = loader.load(&store, "x").await.unwrap_err();
        assert!(matches!(err, PipelineError::Persistence { .. }), "{err}");
        assert_eq!(store.row_count("x_fact").await.unwrap(), 0);
        assert_eq!(store.row_count("x_dim_W").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_fact_keeps_previous_table() {
        let dir = tempfile::tempdir().unwrap();
        let raw_root = dir.path().join("raw");
        let id_dir = raw_root.join("x");
        fs::create_dir_all(&id_dir).unwrap();
        fs::write(id_dir.join("TypedDataSet.json"), r#"[{"ID": 0, "W": 1}]"#).unwrap();

        let store = TableStore::open(dir.path().join("bronze.db")).await.unwrap();
        let loader = BronzeLoader::new(RawStore::new(&raw_root));
        loader.load(&store, "x").await.unwrap();

        fs::write(id_dir.join("TypedDataSet.json"), "{oops").unwrap();
        let report = loader.load(&store, "x").await.unwrap();

        assert!(!report.has_fact());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(store.row_count("x_fact").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_raw_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::open(dir.path().join("bronze.db")).await.unwrap();
        let loader = BronzeLoader::new(RawStore::new(dir.path().join("raw")));
        assert!(matches!(
            loader.load(&store, "83415NED").await,
            Err(PipelineError::MissingSource(_))
        ));
    }
}
