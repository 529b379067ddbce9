//! Moves tables between the row store and polars.
//!
//! Gold transforms work on a [`LazyFrame`](polars::prelude::LazyFrame); the store
//! reads and writes [`Table`]s. Integer and float columns map onto `Int64` and
//! `Float64`, everything else travels as `String`. Frame dtypes the store has no
//! type for (dates, booleans) are cast on the way back.

use crate::error::Result;
use crate::table::{ColumnType, InferredColumn, Table, Value};
use polars::prelude::*;

/// One series holding `values` typed after `column.kind`.
pub fn column_series<'a>(column: &InferredColumn, values: impl Iterator<Item = &'a Value>) -> Series {
    let name = column.name.as_str().into();
    match column.kind {
        ColumnType::Integer => Series::new(
            name,
            values
                .map(|value| match value {
                    Value::Integer(i) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<Option<i64>>>(),
        ),
        ColumnType::Float => Series::new(
            name,
            values.map(Value::as_f64).collect::<Vec<Option<f64>>>(),
        ),
        ColumnType::String => Series::new(
            name,
            values
                .map(|value| match value {
                    Value::Null => None,
                    other => Some(other.as_str().map_or_else(|| other.to_string(), str::to_owned)),
                })
                .collect::<Vec<Option<String>>>(),
        ),
    }
}

/// Copies `table` into a frame, one column per table column.
pub fn to_frame(table: &Table) -> Result<DataFrame> {
    let columns = table
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let values = table
                .rows
                .iter()
                .map(move |row| row.get(idx).unwrap_or(&Value::Null));
            Column::from(column_series(column, values))
        })
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Copies `frame` into a table called `name`.
pub fn from_frame(name: &str, frame: &DataFrame) -> Result<Table> {
    let mut columns = Vec::with_capacity(frame.width());
    let mut values: Vec<Vec<Value>> = Vec::with_capacity(frame.width());

    for column in frame.get_columns() {
        let dtype = column.dtype();
        let (kind, cells) = if dtype.is_integer() || dtype.is_bool() {
            let cast = column.cast(&DataType::Int64)?;
            let cells = cast
                .i64()?
                .into_iter()
                .map(|v| v.map_or(Value::Null, Value::Integer))
                .collect();
            (ColumnType::Integer, cells)
        } else if dtype.is_float() {
            let cast = column.cast(&DataType::Float64)?;
            let cells = cast
                .f64()?
                .into_iter()
                .map(|v| v.map_or(Value::Null, Value::Float))
                .collect();
            (ColumnType::Float, cells)
        } else {
            let cast = column.cast(&DataType::String)?;
            let cells = cast
                .str()?
                .into_iter()
                .map(|v| v.map_or(Value::Null, |s| Value::Text(s.to_owned())))
                .collect();
            (ColumnType::String, cells)
        };

        columns.push(InferredColumn::new(
            column.name().as_str(),
            kind,
            column.null_count() > 0,
        ));
        values.push(cells);
    }

    let mut table = Table::new(name, columns);
    table.rows = (0..frame.height())
        .map(|row| {
            values
                .iter()
                .map(|cells| cells.get(row).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();
    Ok(table)
}
