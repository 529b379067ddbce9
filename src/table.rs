//! Runtime table model shared by every stage.
//!
//! Source tables have no declared schema, so a table is a list of column
//! descriptors built at runtime plus rows aligned to those columns. The same
//! container flows from the bronze loader through the silver resolver into the
//! gold transforms and the row store.

use serde::{Deserialize, Serialize};
use serde_json::Map;

/// A raw JSON record in source field order.
pub type Record = Map<String, serde_json::Value>;

/// Semantic column type, mapped onto SQLite storage classes by the row store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Float,
    String,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::String => "String",
        }
    }

    /// SQLite column type used in `STRICT` tables.
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Float => "REAL",
            Self::String => "TEXT",
        }
    }

    /// Reverse of [`ColumnType::sql_type`], tolerant of the usual SQLite spellings.
    pub fn from_sql_type(declared: &str) -> Self {
        let upper = declared.to_uppercase();
        if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Self::Float
        } else {
            Self::String
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Column descriptor produced by schema inference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredColumn {
    pub name: String,
    pub kind: ColumnType,
    pub nullable: bool,
}

impl InferredColumn {
    pub fn new(name: impl Into<String>, kind: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable,
        }
    }
}

/// A single cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

impl Value {
    /// Converts a scalar JSON value. Booleans and nested values are kept as their
    /// JSON text so nothing is lost on landing.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else {
                    n.as_f64().map_or(Self::Null, Self::Float)
                }
            }
            serde_json::Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Trims text and turns empty strings into nulls.
    pub fn cleaned(self) -> Self {
        match self {
            Self::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Self::Null
                } else if trimmed.len() == s.len() {
                    Self::Text(s)
                } else {
                    Self::Text(trimmed.to_owned())
                }
            }
            other => other,
        }
    }

    /// Converts the value towards `kind` where that is lossless. Values that do not
    /// fit are returned unchanged so the `STRICT` store rejects them loudly.
    pub fn coerce_to(self, kind: ColumnType) -> Self {
        match (kind, self) {
            (ColumnType::Integer, Self::Text(s)) => match s.parse::<i64>() {
                Ok(i) => Self::Integer(i),
                Err(_) => Self::Text(s),
            },
            (ColumnType::Float, Self::Text(s)) => match s.parse::<f64>() {
                Ok(f) => Self::Float(f),
                Err(_) => Self::Text(s),
            },
            (ColumnType::Float, Self::Integer(i)) => Self::Float(i as f64),
            (ColumnType::String, Self::Integer(i)) => Self::Text(i.to_string()),
            (ColumnType::String, Self::Float(f)) => Self::Text(f.to_string()),
            (_, other) => other,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Null => write!(f, "NULL"),
        }
    }
}

/// How the row store should key a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrimaryKey {
    /// The named column is the sole primary key.
    Column(String),
    /// A synthesized `INTEGER PRIMARY KEY AUTOINCREMENT` column, prepended to the
    /// table and filled by the store.
    AutoIncrement(String),
    None,
}

/// Schema plus rows aligned to it.
#[derive(Clone, Debug)]
pub struct Table {
    pub name: String,
    pub columns: Vec<InferredColumn>,
    pub primary_key: PrimaryKey,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<InferredColumn>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key: PrimaryKey::None,
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_primary_key(mut self, primary_key: PrimaryKey) -> Self {
        self.primary_key = primary_key;
        self
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&InferredColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Values of one column, top to bottom.
    pub fn values<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = &'a Value> + use<'a>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().filter_map(move |row| row.get(idx)))
    }

    /// Builds a table from records, taking values for `columns` by name and
    /// coercing each one towards its column type. Missing fields become null.
    pub fn from_records(
        name: impl Into<String>,
        columns: Vec<InferredColumn>,
        records: &[Record],
    ) -> Self {
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|col| {
                        record
                            .get(&col.name)
                            .map_or(Value::Null, Value::from_json)
                            .coerce_to(col.kind)
                    })
                    .collect()
            })
            .collect();

        Self {
            name: name.into(),
            columns,
            primary_key: PrimaryKey::None,
            rows,
        }
    }
}
