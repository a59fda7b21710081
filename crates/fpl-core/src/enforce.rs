//! Final type gate before load. Unlike the normalizer, every cast here is strict: a
//! value that does not fit its declared column type aborts the run.

use chrono::NaiveDateTime;
use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::normalize::{datetime_dtype, datetime_values, parse_bool, parse_datetime};
use crate::schema::{ColumnSpec, SqlType, TableSchema};

/// One destination column's values, typed to its declared [`SqlType`].
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    BigInt(Vec<Option<i64>>),
    Double(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
    Boolean(Vec<Option<bool>>),
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            ColumnData::BigInt(v) => v.len(),
            ColumnData::Double(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Timestamp(v) => v.len(),
            ColumnData::Boolean(v) => v.len(),
        }
    }

    fn null_at(&self, row: usize) -> bool {
        match self {
            ColumnData::BigInt(v) => v[row].is_none(),
            ColumnData::Double(v) => v[row].is_none(),
            ColumnData::Text(v) => v[row].is_none(),
            ColumnData::Timestamp(v) => v[row].is_none(),
            ColumnData::Boolean(v) => v[row].is_none(),
        }
    }

    fn nulls(sql_type: SqlType, len: usize) -> Self {
        match sql_type {
            SqlType::BigInt => ColumnData::BigInt(vec![None; len]),
            SqlType::Double => ColumnData::Double(vec![None; len]),
            SqlType::Text => ColumnData::Text(vec![None; len]),
            SqlType::Timestamp => ColumnData::Timestamp(vec![None; len]),
            SqlType::Boolean => ColumnData::Boolean(vec![None; len]),
        }
    }
}

/// A single typed value, borrowed from a [`LoadBatch`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    BigInt(Option<i64>),
    Double(Option<f64>),
    Text(Option<&'a str>),
    Timestamp(Option<NaiveDateTime>),
    Boolean(Option<bool>),
}

/// Rows ready for insertion into `table`, column order matching `table.columns`.
#[derive(Debug, Clone)]
pub struct LoadBatch {
    pub table: &'static TableSchema,
    columns: Vec<ColumnData>,
    rows: usize,
}

impl LoadBatch {
    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[ColumnData] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.table
            .columns
            .iter()
            .position(|spec| spec.name == name)
            .map(|idx| &self.columns[idx])
    }

    pub fn cell(&self, row: usize, column: usize) -> Cell<'_> {
        match &self.columns[column] {
            ColumnData::BigInt(v) => Cell::BigInt(v[row]),
            ColumnData::Double(v) => Cell::Double(v[row]),
            ColumnData::Text(v) => Cell::Text(v[row].as_deref()),
            ColumnData::Timestamp(v) => Cell::Timestamp(v[row]),
            ColumnData::Boolean(v) => Cell::Boolean(v[row]),
        }
    }

    pub fn row(&self, row: usize) -> Vec<Cell<'_>> {
        (0..self.columns.len()).map(|col| self.cell(row, col)).collect()
    }
}

/// Casts every declared column of `table` out of `df`. Undeclared columns are
/// dropped; a declared nullable column missing from `df` loads as all nulls.
pub fn enforce_schema(df: &DataFrame, table: &'static TableSchema) -> Result<LoadBatch> {
    let rows = df.height();
    let mut columns = Vec::with_capacity(table.columns.len());

    for spec in table.columns {
        let data = match df.column(spec.name) {
            Ok(column) => coerce_column(column, spec)?,
            Err(_) if spec.nullable => ColumnData::nulls(spec.sql_type, rows),
            Err(_) => {
                return Err(PipelineError::Schema(format!(
                    "table '{}' requires column '{}', which is missing",
                    table.name, spec.name
                )))
            }
        };

        if !spec.nullable {
            if let Some(row) = (0..data.len()).find(|&row| data.null_at(row)) {
                return Err(PipelineError::TypeCoercion {
                    column: spec.name.to_string(),
                    row,
                    value: "null".to_string(),
                    target: "non-null value",
                });
            }
        }

        columns.push(data);
    }

    Ok(LoadBatch {
        table,
        columns,
        rows,
    })
}

fn coerce_column(column: &Column, spec: &ColumnSpec) -> Result<ColumnData> {
    let dtype = column.dtype().clone();
    let mismatch = |row: usize, value: String| PipelineError::TypeCoercion {
        column: spec.name.to_string(),
        row,
        value,
        target: spec.sql_type.label(),
    };

    if dtype == DataType::Null {
        return Ok(ColumnData::nulls(spec.sql_type, column.len()));
    }

    let data = match spec.sql_type {
        SqlType::BigInt => {
            if dtype.is_integer() {
                let cast = column.cast(&DataType::Int64)?;
                ColumnData::BigInt(cast.i64()?.into_iter().collect())
            } else if dtype.is_float() {
                let cast = column.cast(&DataType::Float64)?;
                let mut values = Vec::with_capacity(cast.len());
                for (row, value) in cast.f64()?.into_iter().enumerate() {
                    values.push(match value {
                        None => None,
                        // i64::MAX rounds up to 2^63 as f64, so the upper bound is exclusive.
                        Some(v)
                            if v.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&v) =>
                        {
                            Some(v as i64)
                        }
                        Some(v) => return Err(mismatch(row, v.to_string())),
                    });
                }
                ColumnData::BigInt(values)
            } else if dtype == DataType::Boolean {
                ColumnData::BigInt(column.bool()?.into_iter().map(|v| v.map(i64::from)).collect())
            } else if dtype == DataType::String {
                ColumnData::BigInt(parse_strict(column, |raw| raw.trim().parse().ok(), mismatch)?)
            } else {
                return Err(type_mismatch(spec, &dtype));
            }
        }
        SqlType::Double => {
            if dtype.is_integer() || dtype.is_float() {
                let cast = column.cast(&DataType::Float64)?;
                ColumnData::Double(cast.f64()?.into_iter().collect())
            } else if dtype == DataType::String {
                ColumnData::Double(parse_strict(
                    column,
                    |raw| raw.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
                    mismatch,
                )?)
            } else {
                return Err(type_mismatch(spec, &dtype));
            }
        }
        SqlType::Text => {
            let cast = column.cast(&DataType::String)?;
            ColumnData::Text(
                cast.str()?
                    .into_iter()
                    .map(|v| v.map(str::to_string))
                    .collect(),
            )
        }
        SqlType::Timestamp => {
            if matches!(dtype, DataType::Datetime(_, _) | DataType::Date) {
                let cast = column.cast(&datetime_dtype())?;
                ColumnData::Timestamp(datetime_values(&cast)?)
            } else if dtype == DataType::String {
                ColumnData::Timestamp(parse_strict(column, parse_datetime, mismatch)?)
            } else {
                return Err(type_mismatch(spec, &dtype));
            }
        }
        SqlType::Boolean => {
            if dtype == DataType::Boolean {
                ColumnData::Boolean(column.bool()?.into_iter().collect())
            } else if dtype.is_integer() {
                let cast = column.cast(&DataType::Int64)?;
                let mut values = Vec::with_capacity(cast.len());
                for (row, value) in cast.i64()?.into_iter().enumerate() {
                    values.push(match value {
                        None => None,
                        Some(0) => Some(false),
                        Some(1) => Some(true),
                        Some(v) => return Err(mismatch(row, v.to_string())),
                    });
                }
                ColumnData::Boolean(values)
            } else if dtype == DataType::String {
                ColumnData::Boolean(parse_strict(column, parse_bool, mismatch)?)
            } else {
                return Err(type_mismatch(spec, &dtype));
            }
        }
    };

    Ok(data)
}

fn parse_strict<T>(
    column: &Column,
    parse: impl Fn(&str) -> Option<T>,
    mismatch: impl Fn(usize, String) -> PipelineError,
) -> Result<Vec<Option<T>>> {
    let text = column.str()?;
    let mut values = Vec::with_capacity(text.len());
    for (row, value) in text.into_iter().enumerate() {
        values.push(match value {
            None => None,
            Some(raw) => Some(parse(raw).ok_or_else(|| mismatch(row, raw.to_string()))?),
        });
    }
    Ok(values)
}

fn type_mismatch(spec: &ColumnSpec, dtype: &DataType) -> PipelineError {
    PipelineError::TypeCoercion {
        column: spec.name.to_string(),
        row: 0,
        value: format!("<{dtype} column>"),
        target: spec.sql_type.label(),
    }
}
