//! Raw store: the on-disk cache of provider responses.
//!
//! Layout is `{root}/{identifier}/{resource}.json`, one JSON array of records per
//! sub-resource. A directory that exists is treated as complete, so fetching is
//! idempotent and re-running the pipeline never calls the provider twice.

use crate::error::{PipelineError, Result, ResultExt as _};
use crate::table::Record;
use serde_json::Value as Json;
use std::fs;
use std::path::{Path, PathBuf};

/// One sub-resource returned by the provider, e.g. `TypedDataSet` or `Perioden`.
#[derive(Clone, Debug, PartialEq)]
pub struct RawResource {
    pub name: String,
    pub records: Vec<Record>,
}

impl RawResource {
    pub fn new(name: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }

    /// File name inside the identifier directory.
    pub fn file_name(&self) -> String {
        if self.name.ends_with(".json") {
            self.name.clone()
        } else {
            format!("{}.json", self.name)
        }
    }
}

/// Source of raw resources for a table identifier.
///
/// The HTTP client lives outside this crate; anything that can produce the ordered
/// list of resources for an identifier can sit behind this trait.
pub trait Retriever {
    fn retrieve(&self, identifier: &str) -> Result<Vec<RawResource>>;
}

#[derive(Clone, Debug)]
pub struct RawStore {
    root: PathBuf,
}

impl RawStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn identifier_dir(&self, identifier: &str) -> PathBuf {
        self.root.join(identifier)
    }

    pub fn exists(&self, identifier: &str) -> bool {
        self.identifier_dir(identifier).is_dir()
    }

    /// Makes sure the raw files for `identifier` are on disk.
    ///
    /// When the directory already exists the retriever is not called. Otherwise the
    /// resources are written to a sibling temporary directory which is renamed into
    /// place once every file is written, so a crash never leaves a partial
    /// directory that later runs would mistake for a complete one.
    pub fn fetch(&self, identifier: &str, retriever: &dyn Retriever) -> Result<PathBuf> {
        let target = self.identifier_dir(identifier);
        if target.is_dir() {
            tracing::info!("Raw data for {identifier} already present, skipping fetch");
            return Ok(target);
        }

        tracing::info!("Fetching raw data for {identifier}");
        let resources = retriever.retrieve(identifier)?;

        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create raw root {}", self.root.display()))?;
        let staging = self.root.join(format!(".{identifier}.partial"));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        for resource in &resources {
            let path = staging.join(resource.file_name());
            let body = serde_json::to_string_pretty(&resource.records)?;
            fs::write(&path, body)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::debug!(
                "Wrote {} records to {}",
                resource.records.len(),
                path.display()
            );
        }

        fs::rename(&staging, &target)?;
        tracing::info!(
            "Stored {} resources for {identifier} in {}",
            resources.len(),
            target.display()
        );
        Ok(target)
    }

    /// All `*.json` files of an identifier, sorted by file name.
    pub fn resources(&self, identifier: &str) -> Result<Vec<PathBuf>> {
        let dir = self.identifier_dir(identifier);
        if !dir.is_dir() {
            return Err(PipelineError::MissingSource(format!(
                "raw directory {} does not exist",
                dir.display()
            )));
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file() && path.extension().is_some_and(|ext| ext == "json")
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

/// File name of a resource path, used as the resource name downstream.
pub fn resource_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Reads one resource file.
///
/// # Errors
///
/// [`PipelineError::Validation`] when the file is not JSON, the top level is not an
/// array, or an element is not an object.
pub fn read_resource(path: &Path) -> Result<Vec<Record>> {
    let name = resource_name(path);
    let text = fs::read_to_string(path)?;
    parse_records(&name, &text)
}

pub(crate) fn parse_records(name: &str, text: &str) -> Result<Vec<Record>> {
    let json: Json = serde_json::from_str(text)
        .map_err(|e| PipelineError::Validation(format!("{name}: invalid JSON: {e}")))?;

    let Json::Array(items) = json else {
        return Err(PipelineError::Validation(format!(
            "{name}: top level is not an array"
        )));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Json::Object(record) => Ok(record),
            other => Err(PipelineError::Validation(format!(
                "{name}: element {idx} is not an object (found {})",
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
