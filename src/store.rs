//! SQLite row store, one database file per stage.
//!
//! Each stage gets its own [`TableStore`] handle, created by the caller and passed
//! into the stage entry point. Tables are created `STRICT`, so a value that does not
//! fit its inferred column type fails the insert instead of being stored as-is.
//!
//! Materialisation is "always fully replace": the old table is dropped and the new
//! one created first, then every row goes in through a single transaction. A failed
//! insert therefore leaves an empty table, never a half-written one.

use crate::error::{PipelineError, Result};
use crate::table::{ColumnType, InferredColumn, PrimaryKey, Table, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as _, Pool, QueryBuilder, Row as _, Sqlite, ValueRef as _};
use std::path::{Path, PathBuf};

/// SQLite's default cap on bound parameters per statement.
const MAX_BIND_PARAMS: usize = 999;

/// Quotes an identifier for SQLite.
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Column metadata reflected from the database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnType,
    pub primary_key: bool,
}

/// Name and columns of one stored table.
#[derive(Clone, Debug)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Handle to one stage database.
#[derive(Debug, Clone)]
pub struct TableStore {
    pool: Pool<Sqlite>,
    path: PathBuf,
}

impl TableStore {
    /// Opens (creating if needed) the database at `path`.
    ///
    /// The pool holds a single connection: the pipeline is a single writer and every
    /// statement runs in order.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        tracing::debug!("Opened row store {}", path.display());
        Ok(Self { pool, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of all user tables, sorted.
    pub async fn table_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(PipelineError::from))
            .collect()
    }

    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")? > 0)
    }

    /// Reflected columns of `name`, in declaration order.
    pub async fn columns(&self, name: &str) -> Result<Vec<ColumnInfo>> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", quote(name)))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(ColumnInfo {
                    name: row.try_get::<String, _>("name")?,
                    kind: ColumnType::from_sql_type(&row.try_get::<String, _>("type")?),
                    primary_key: row.try_get::<i64, _>("pk")? > 0,
                })
            })
            .collect()
    }

    /// Reflects every table whose name passes `filter`.
    pub async fn catalogue(&self, filter: impl Fn(&str) -> bool) -> Result<Vec<TableInfo>> {
        let mut tables = Vec::new();
        for name in self.table_names().await? {
            if !filter(&name) {
                continue;
            }
            let columns = self.columns(&name).await?;
            tables.push(TableInfo { name, columns });
        }
        Ok(tables)
    }

    pub async fn row_count(&self, name: &str) -> Result<usize> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", quote(name)))
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(usize::try_from(n).unwrap_or_default())
    }

    /// Runs a query and returns the result column names and all rows.
    pub async fn fetch(&self, sql: &str) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        let names = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_owned()).collect())
            .unwrap_or_default();

        let values = rows
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>>>()?;

        Ok((names, values))
    }

    /// Loads a whole table, typing columns from their declared SQL types.
    pub async fn read_table(&self, name: &str) -> Result<Table> {
        if !self.table_exists(name).await? {
            return Err(PipelineError::MissingSource(format!(
                "table '{name}' not found in {}",
                self.path.display()
            )));
        }

        let infos = self.columns(name).await?;
        let select = infos
            .iter()
            .map(|c| quote(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let (_, rows) = self
            .fetch(&format!("SELECT {select} FROM {} ORDER BY rowid", quote(name)))
            .await?;

        let primary_key = infos
            .iter()
            .find(|c| c.primary_key)
            .map_or(PrimaryKey::None, |c| PrimaryKey::Column(c.name.clone()));
        let columns = infos
            .into_iter()
            .map(|c| InferredColumn::new(c.name, c.kind, !c.primary_key))
            .collect();

        let mut table = Table::new(name, columns).with_primary_key(primary_key);
        table.rows = rows;
        Ok(table)
    }

    /// Drops `table.name` if present, recreates it from `table.columns` and bulk
    /// inserts every row in one transaction.
    ///
    /// # Errors
    ///
    /// Any failure is reported as [`PipelineError::Persistence`]. The previous
    /// version of the table is already gone at that point.
    pub async fn replace_table(&self, table: &Table) -> Result<usize> {
        let name = quote(&table.name);
        let ddl = create_table_sql(table);

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| PipelineError::persistence(&table.name, e))?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {name}"))
            .execute(&mut *conn)
            .await
            .map_err(|e| PipelineError::persistence(&table.name, e))?;
        sqlx::query(&ddl)
            .execute(&mut *conn)
            .await
            .map_err(|e| PipelineError::persistence(&table.name, format!("{e} ({ddl})")))?;
        drop(conn);

        if table.rows.is_empty() || table.columns.is_empty() {
            return Ok(0);
        }

        let column_list = table
            .columns
            .iter()
            .map(|c| quote(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let chunk_size = (MAX_BIND_PARAMS / table.columns.len()).max(1);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PipelineError::persistence(&table.name, e))?;

        for chunk in table.rows.chunks(chunk_size) {
            let mut builder: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new(format!("INSERT INTO {name} ({column_list}) "));
            builder.push_values(chunk, |mut b, row| {
                for value in row {
                    match value {
                        Value::Integer(i) => {
                            b.push_bind(*i);
                        }
                        Value::Float(f) => {
                            b.push_bind(*f);
                        }
                        Value::Text(s) => {
                            b.push_bind(s.clone());
                        }
                        Value::Null => {
                            b.push_bind(None::<String>);
                        }
                    }
                }
            });

            // An early return drops `tx`, which rolls the whole insert back.
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| PipelineError::persistence(&table.name, e))?;
        }

        tx.commit()
            .await
            .map_err(|e| PipelineError::persistence(&table.name, e))?;

        Ok(table.rows.len())
    }

    pub async fn drop_table(&self, name: &str) -> Result<()> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote(name)))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// `CREATE TABLE` statement for a runtime schema.
pub fn create_table_sql(table: &Table) -> String {
    let mut definitions = Vec::new();

    if let PrimaryKey::AutoIncrement(key) = &table.primary_key {
        definitions.push(format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote(key)));
    }

    for column in &table.columns {
        let mut definition = format!("{} {}", quote(&column.name), column.kind.sql_type());
        match &table.primary_key {
            PrimaryKey::Column(key) if *key == column.name => {
                definition.push_str(" NOT NULL PRIMARY KEY");
            }
            _ => {}
        }
        definitions.push(definition);
    }

    format!(
        "CREATE TABLE {} ({}) STRICT",
        quote(&table.name),
        definitions.join(", ")
    )
}

fn decode_row(row: &SqliteRow) -> Result<Vec<Value>> {
    (0..row.columns().len())
        .map(|idx| {
            let raw = row.try_get_raw(idx)?;
            if raw.is_null() {
                return Ok(Value::Null);
            }
            if let Ok(i) = row.try_get::<i64, _>(idx) {
                return Ok(Value::Integer(i));
            }
            if let Ok(f) = row.try_get::<f64, _>(idx) {
                return Ok(Value::Float(f));
            }
            Ok(Value::Text(row.try_get::<String, _>(idx)?))
        })
        .collect()
}
