use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::ingestion::string_series;
use crate::normalize::datetime_values;

/// Month that opens a new season.
const SEASON_START_MONTH: u32 = 7;

/// Season label for a match date: on or after July 1 of year Y is `"Y-YY"` with the
/// following year's last two digits, anything earlier belongs to the season that
/// started the previous July.
pub fn season_label(date: NaiveDate) -> String {
    let year = date.year();
    let start = if date.month() >= SEASON_START_MONTH {
        year
    } else {
        year - 1
    };
    format!("{}-{:02}", start, (start + 1).rem_euclid(100))
}

/// Adds `target` as the season label of the datetime column `source`. Null dates give
/// null labels.
pub fn with_season(df: &DataFrame, source: &str, target: &str) -> Result<DataFrame> {
    let column = df.column(source).map_err(|_| {
        PipelineError::Schema(format!("cannot derive season: column '{source}' is missing"))
    })?;
    if !matches!(column.dtype(), DataType::Datetime(_, _)) {
        return Err(PipelineError::Schema(format!(
            "cannot derive season: column '{source}' has type {}, expected datetime",
            column.dtype()
        )));
    }

    let labels: Vec<Option<String>> = datetime_values(column)?
        .into_iter()
        .map(|dt| dt.map(|value| season_label(value.date())))
        .collect();

    let mut output = df.clone();
    output.with_column(string_series(target, &labels))?;
    Ok(output)
}
