//! Gold transform for `80072ned`, sick leave percentage per sector and quarter.

use super::naming;
use super::transforms::GoldTransform;
use crate::error::{PipelineError, Result};
use polars::prelude::*;

pub const IDENTIFIER: &str = "80072ned";
pub const TARGET_COLUMN: &str = "Ziekteverzuimpercentage_1";
pub const PERIOD_COLUMN: &str = "Perioden";
pub const PERIOD_DATE_COLUMN: &str = "Perioden_dt";
pub const PERIOD_YEAR_COLUMN: &str = "Perioden_year";
pub const PERIOD_QUARTER_COLUMN: &str = "Perioden_quarter";

/// Marker separating year and quarter in period codes such as `2023KW02`.
const QUARTER_MARKER: &str = "KW";

/// Year and quarter groups of a quarterly period code.
const QUARTER_PATTERN: &str = r"^\s*(\d+)KW(\d+)\s*$";

/// Categorical column → indicator prefix.
const ONE_HOT: [(&str, &str); 2] = [
    ("BedrijfskenmerkenSBI2008_Title", "sbi"),
    ("Perioden_Status", "status"),
];

/// Bookkeeping and raw code columns removed from the gold table when present.
const DROP_COLUMNS: [&str; 9] = [
    "silver_id",
    "bronze_pk",
    "_source_file",
    "ID",
    "Perioden",
    "Perioden_Title",
    "Perioden_Description",
    "BedrijfskenmerkenSBI2008",
    "BedrijfskenmerkenSBI2008_Description",
];

#[derive(Clone, Debug, Default)]
pub struct SickLeaveTransform;

impl GoldTransform for SickLeaveTransform {
    fn identifier(&self) -> &str {
        IDENTIFIER
    }

    fn description(&self) -> String {
        format!(
            "{TARGET_COLUMN} as float, quarterly {PERIOD_COLUMN} as date, one-hot {}",
            ONE_HOT.map(|(col, _)| col).join(", ")
        )
    }

    fn apply(&self, mut frame: LazyFrame) -> Result<LazyFrame> {
        let schema = frame.collect_schema()?;
        for required in [TARGET_COLUMN, PERIOD_COLUMN] {
            if !schema.contains(required) {
                return Err(PipelineError::Validation(format!(
                    "silver table has no {required} column"
                )));
            }
        }

        let mut frame = frame
            .with_column(target_as_float().alias(TARGET_COLUMN))
            .filter(is_quarterly())
            .with_columns([
                quarter_start().alias(PERIOD_DATE_COLUMN),
                period_part(1).alias(PERIOD_YEAR_COLUMN),
                period_part(2).alias(PERIOD_QUARTER_COLUMN),
            ]);

        for (source, prefix) in ONE_HOT {
            frame = one_hot(frame, source, prefix)?;
        }

        let schema = frame.collect_schema()?;
        let keep: Vec<Expr> = schema
            .iter_names()
            .filter(|name| {
                let name = name.as_str();
                !DROP_COLUMNS.contains(&name) && !ONE_HOT.iter().any(|(source, _)| *source == name)
            })
            .map(|name| col(name.as_str()))
            .collect();

        Ok(frame.select(keep))
    }
}

/// Target values as floats. Text uses a decimal comma; anything unparseable is null.
fn target_as_float() -> Expr {
    col(TARGET_COLUMN)
        .cast(DataType::String)
        .str()
        .strip_chars(lit(NULL))
        .str()
        .replace(lit(","), lit("."), true)
        .cast(DataType::Float64)
}

/// Year (`group` 1) or quarter (`group` 2) of the period code, null when the code
/// is not quarterly.
fn period_part(group: usize) -> Expr {
    col(PERIOD_COLUMN)
        .cast(DataType::String)
        .str()
        .extract(lit(QUARTER_PATTERN), group)
        .cast(DataType::Int64)
}

/// Rows carrying the quarter marker with a parseable year and a quarter in 1..=4.
fn is_quarterly() -> Expr {
    col(PERIOD_COLUMN)
        .cast(DataType::String)
        .str()
        .contains(lit(QUARTER_MARKER), false)
        .and(period_part(1).is_not_null())
        .and(period_part(2).gt_eq(lit(1)))
        .and(period_part(2).lt_eq(lit(4)))
}

/// First day of the quarter: `2023KW02` → 2023-04-01.
fn quarter_start() -> Expr {
    let month = (period_part(2) - lit(1)) * lit(3) + lit(1);
    datetime(DatetimeArgs::new(period_part(1), month, lit(1))).cast(DataType::Date)
}

/// Appends one 0/1 column per distinct value of `source`, ordered by value.
fn one_hot(mut frame: LazyFrame, source: &str, prefix: &str) -> Result<LazyFrame> {
    let schema = frame.collect_schema()?;
    if !schema.contains(source) {
        tracing::debug!("No {source} column, no indicators added");
        return Ok(frame);
    }

    let values = frame
        .clone()
        .select([col(source).cast(DataType::String)])
        .collect()?;
    let mut categories: Vec<String> = values
        .column(source)?
        .unique()?
        .drop_nulls()
        .str()?
        .into_iter()
        .flatten()
        .map(str::to_owned)
        .collect();
    categories.sort();

    let names = naming::indicator_names(prefix, &categories, schema.iter_names());
    let indicators: Vec<Expr> = categories
        .iter()
        .zip(names)
        .map(|(value, name)| {
            when(col(source).cast(DataType::String).eq(lit(value.as_str())))
                .then(lit(1i64))
                .otherwise(lit(0i64))
                .alias(name.as_str())
        })
        .collect();

    Ok(frame.with_columns(indicators))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gold::frame;
    use crate::table::{ColumnType, InferredColumn, Table, Value};
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> Value {
        Value::Text(s.to_owned())
    }

    fn silver() -> Table {
        let names = [
            ("silver_id", ColumnType::Integer),
            ("bronze_pk", ColumnType::String),
            ("ID", ColumnType::Integer),
            ("BedrijfskenmerkenSBI2008", ColumnType::String),
            ("Perioden", ColumnType::String),
            ("Ziekteverzuimpercentage_1", ColumnType::String),
            ("_source_file", ColumnType::String),
            ("BedrijfskenmerkenSBI2008_Title", ColumnType::String),
            ("Perioden_Title", ColumnType::String),
            ("Perioden_Status", ColumnType::String),
        ];
        let mut table = Table::new(
            "80072ned_silver",
            names
                .iter()
                .map(|(n, k)| InferredColumn::new(*n, *k, true))
                .collect(),
        );
        let row = |id: i64, sbi: &str, period: &str, pct: &str, sector: Option<&str>, status: &str| {
            vec![
                Value::Integer(id),
                text(&format!("TypedDataSet.json_{id}")),
                Value::Integer(id),
                text(sbi),
                text(period),
                text(pct),
                text("TypedDataSet.json"),
                sector.map_or(Value::Null, text),
                text(period),
                text(status),
            ]
        };
        table.rows = vec![
            row(0, "T001081", "2023KW01", "4,2", Some("A-U Alle economische activiteiten"), "Definitief"),
            row(1, "301000", "2023KW02", "", Some("C Industrie"), "Voorlopig"),
            row(2, "T001081", "2023JJ00", "5,0", Some("A-U Alle economische activiteiten"), "Definitief"),
            row(3, "301000", "2023KW03", "3.9", None, "Voorlopig"),
        ];
        table
    }

    fn run(table: &Table) -> Result<Table> {
        let input = frame::to_frame(table)?;
        let output = SickLeaveTransform.apply(input.lazy())?.collect()?;
        frame::from_frame("80072ned_gold", &output)
    }

    /// Target and period only, one row per `(period, target)`.
    fn periods(rows: &[(&str, &str)]) -> Table {
        let mut table = Table::new(
            "80072ned_silver",
            vec![
                InferredColumn::new(PERIOD_COLUMN, ColumnType::String, false),
                InferredColumn::new(TARGET_COLUMN, ColumnType::String, true),
            ],
        );
        table.rows = rows.iter().map(|(p, t)| vec![text(p), text(t)]).collect();
        table
    }

    #[test]
    fn test_quarter_codes_become_dates() {
        let gold = run(&periods(&[
            ("2023KW02", "1"),
            ("1996KW04", "1"),
            ("2023JJ00", "1"),
            ("2023KW00", "1"),
            ("2023KW05", "1"),
            ("KW01", "1"),
        ]))
        .unwrap();

        let dates: Vec<Value> = gold.values(PERIOD_DATE_COLUMN).unwrap().cloned().collect();
        assert_eq!(dates, vec![text("2023-04-01"), text("1996-10-01")]);
        let quarters: Vec<Value> = gold.values(PERIOD_QUARTER_COLUMN).unwrap().cloned().collect();
        assert_eq!(quarters, vec![Value::Integer(2), Value::Integer(4)]);
    }

    #[test]
    fn test_target_decimal_comma() {
        let gold = run(&periods(&[
            ("2023KW01", "4,2"),
            ("2023KW02", " 3.9 "),
            ("2023KW03", ""),
            ("2023KW04", "x"),
        ]))
        .unwrap();

        let target: Vec<Value> = gold.values(TARGET_COLUMN).unwrap().cloned().collect();
        assert_eq!(
            target,
            vec![Value::Float(4.2), Value::Float(3.9), Value::Null, Value::Null]
        );
    }

    #[test]
    fn test_apply_builds_feature_table() {
        let gold = run(&silver()).unwrap();

        assert_eq!(
            gold.column_names(),
            vec![
                "Ziekteverzuimpercentage_1",
                "Perioden_dt",
                "Perioden_year",
                "Perioden_quarter",
                "sbi_a_u_alle_economische_activiteiten",
                "sbi_c_industrie",
                "status_definitief",
                "status_voorlopig",
            ]
        );
        assert_eq!(gold.height(), 3, "the yearly 2023JJ00 row is dropped");

        assert_eq!(
            gold.rows[0],
            vec![
                Value::Float(4.2),
                text("2023-01-01"),
                Value::Integer(2023),
                Value::Integer(1),
                Value::Integer(1),
                Value::Integer(0),
                Value::Integer(1),
                Value::Integer(0),
            ]
        );
        assert_eq!(gold.rows[1][0], Value::Null);
        assert_eq!(gold.rows[1][1], text("2023-04-01"));
        // Null sector: every sbi indicator is zero.
        assert_eq!(gold.rows[2][4..6], [Value::Integer(0), Value::Integer(0)]);
        assert_eq!(gold.rows[2][3], Value::Integer(3));

        let target = gold.column(TARGET_COLUMN).unwrap();
        assert_eq!(target.kind, ColumnType::Float);
    }

    #[test]
    fn test_indicator_names_avoid_existing_columns() {
        let mut table = Table::new(
            "80072ned_silver",
            vec![
                InferredColumn::new(PERIOD_COLUMN, ColumnType::String, false),
                InferredColumn::new(TARGET_COLUMN, ColumnType::String, true),
                InferredColumn::new("Perioden_Status", ColumnType::String, false),
                InferredColumn::new("Status_Definitief", ColumnType::Integer, false),
            ],
        );
        table.rows = vec![
            vec![text("2023KW01"), text("1"), text("Definitief"), Value::Integer(7)],
            vec![text("2023KW02"), text("2"), text("Voorlopig"), Value::Integer(7)],
        ];

        let gold = run(&table).unwrap();
        let names = gold.column_names();
        assert!(names.contains(&"Status_Definitief"), "{names:?}");
        assert!(names.contains(&"status_definitief_2"), "{names:?}");
        assert!(names.contains(&"status_voorlopig"), "{names:?}");
    }

    #[test]
    fn test_missing_target_is_rejected() {
        let mut table = Table::new(
            "80072ned_silver",
            vec![InferredColumn::new(PERIOD_COLUMN, ColumnType::String, false)],
        );
        table.rows = vec![vec![text("2023KW01")]];
        assert!(matches!(run(&table), Err(PipelineError::Validation(_))));
    }

    #[test]
    fn test_apply_is_deterministic() {
        let a = run(&silver()).unwrap();
        let b = run(&silver()).unwrap();
        assert_eq!(a.column_names(), b.column_names());
        assert_eq!(a.rows, b.rows);
    }
}
