//! Best-effort column coercion for freshly ingested raw datasets.
//!
//! Integer, float and datetime coercion fail soft: an unparseable cell becomes null.
//! Boolean coercion does not. A value that is not recognisably boolean is reported as
//! [`PipelineError::TypeCoercion`] instead of being guessed at.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::debug;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Datetime,
    Boolean,
}

impl ColumnKind {
    pub fn dtype(self) -> DataType {
        match self {
            ColumnKind::Integer => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Datetime => datetime_dtype(),
            ColumnKind::Boolean => DataType::Boolean,
        }
    }
}

pub fn datetime_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Microseconds, None)
}

/// Applies `rules` to every listed column present in `df`. Columns not present are
/// skipped.
pub fn normalize_columns(df: &DataFrame, rules: &[(&str, ColumnKind)]) -> Result<DataFrame> {
    let mut output = df.clone();

    for &(name, kind) in rules {
        let Ok(column) = df.column(name) else {
            debug!(column = name, "column absent; skipping coercion");
            continue;
        };

        if column.dtype() == &kind.dtype() {
            continue;
        }

        let text = column.cast(&DataType::String)?;
        let text = text.str()?;

        let series = match kind {
            ColumnKind::Integer => Series::new(
                name.into(),
                text.into_iter()
                    .map(|v| v.and_then(parse_integer))
                    .collect::<Vec<Option<i64>>>(),
            ),
            ColumnKind::Float => Series::new(
                name.into(),
                text.into_iter()
                    .map(|v| v.and_then(parse_float))
                    .collect::<Vec<Option<f64>>>(),
            ),
            ColumnKind::Datetime => datetime_series(
                name,
                text.into_iter()
                    .map(|v| v.and_then(parse_datetime))
                    .collect::<Vec<_>>(),
            )?,
            ColumnKind::Boolean => {
                let mut values = Vec::with_capacity(text.len());
                for (row, value) in text.into_iter().enumerate() {
                    values.push(match value {
                        None => None,
                        Some(raw) => Some(parse_bool(raw).ok_or_else(|| {
                            PipelineError::TypeCoercion {
                                column: name.to_string(),
                                row,
                                value: raw.to_string(),
                                target: "boolean",
                            }
                        })?),
                    });
                }
                Series::new(name.into(), values)
            }
        };

        output.with_column(series)?;
    }

    Ok(output)
}

/// Builds a microsecond-precision, timezone-naive datetime series.
pub fn datetime_series(name: &str, values: Vec<Option<NaiveDateTime>>) -> PolarsResult<Series> {
    Series::new(
        name.into(),
        values
            .into_iter()
            .map(|v| v.map(|dt| dt.and_utc().timestamp_micros()))
            .collect::<Vec<Option<i64>>>(),
    )
    .cast(&datetime_dtype())
}

/// Reads a datetime column (any time unit) back into naive UTC timestamps.
pub fn datetime_values(column: &Column) -> PolarsResult<Vec<Option<NaiveDateTime>>> {
    let micros = column.cast(&datetime_dtype())?;
    let micros = micros.datetime()?;
    Ok((0..micros.len())
        .map(|idx| {
            micros
                .get(idx)
                .and_then(DateTime::from_timestamp_micros)
                .map(|dt| dt.naive_utc())
        })
        .collect())
}

pub fn parse_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    let value = parse_float(trimmed)?;
    if value.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&value) {
        Some(value as i64)
    } else {
        None
    }
}

pub fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Accepts RFC 3339 (offsets are folded into UTC), ISO-8601 with a `T` or space
/// separator, and bare dates.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for format in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "1.0" => Some(true),
        "false" | "f" | "no" | "n" | "0" | "0.0" => Some(false),
        _ => None,
    }
}
