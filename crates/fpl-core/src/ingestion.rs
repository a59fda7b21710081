use std::collections::BTreeMap;

use blake3::Hasher;
use bytes::Bytes;
use polars::prelude::{Column, DataFrame, NamedFrom, Series};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct ObjectReport {
    pub name: String,
    pub hash: String,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug)]
pub struct IngestionBatch {
    /// All objects stacked in object-name order, every column `String`.
    pub raw: DataFrame,
    pub reports: Vec<ObjectReport>,
}

/// Decodes every fetched object and stacks them into one raw dataset.
///
/// Objects are consumed in map (object-name) order, which fixes the row order that
/// deduplication later treats as "most recently seen".
pub fn ingest_objects(bucket: &str, objects: &BTreeMap<String, Bytes>) -> Result<IngestionBatch> {
    if objects.is_empty() {
        return Err(PipelineError::Fetch {
            bucket: bucket.to_string(),
            reason: "no objects found; check that the bucket exists and is populated".to_string(),
        });
    }

    let mut frames = Vec::with_capacity(objects.len());
    let mut reports = Vec::with_capacity(objects.len());

    for (name, contents) in objects {
        let df = read_raw_csv(name, contents)?;
        debug!(object = %name, rows = df.height(), columns = df.width(), "decoded object");
        reports.push(ObjectReport {
            name: name.clone(),
            hash: compute_hash(contents),
            rows: df.height(),
            columns: df.width(),
        });
        frames.push(df);
    }

    let raw = concat_raw(&frames)?;
    info!(bucket, objects = reports.len(), rows = raw.height(), "combined raw objects");

    Ok(IngestionBatch { raw, reports })
}

/// Parses delimited text with a header row into an all-`String` frame. Empty fields
/// become nulls.
pub fn read_raw_csv(object: &str, contents: &[u8]) -> Result<DataFrame> {
    let csv_error = |source: csv::Error| PipelineError::Csv {
        object: object.to_string(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(contents);

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut values: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        for (idx, field) in record.iter().enumerate() {
            values[idx].push(if field.is_empty() {
                None
            } else {
                Some(field.to_string())
            });
        }
    }

    let columns: Vec<Column> = headers
        .iter()
        .zip(values.iter())
        .map(|(name, column)| string_series(name, column).into())
        .collect();

    Ok(DataFrame::new(columns)?)
}

/// Stacks raw frames vertically. The result carries the ordered union of all column
/// names; a column absent from one input is null for that input's rows.
pub fn concat_raw(frames: &[DataFrame]) -> Result<DataFrame> {
    let mut names: Vec<String> = Vec::new();
    for df in frames {
        for name in df.get_column_names() {
            if !names.iter().any(|existing| existing == name.as_str()) {
                names.push(name.to_string());
            }
        }
    }

    let total_rows: usize = frames.iter().map(DataFrame::height).sum();
    let mut columns: Vec<Column> = Vec::with_capacity(names.len());

    for name in &names {
        let mut values: Vec<Option<String>> = Vec::with_capacity(total_rows);
        for df in frames {
            match df.column(name) {
                Ok(column) => {
                    let text = column.cast(&polars::prelude::DataType::String)?;
                    values.extend(text.str()?.into_iter().map(|v| v.map(str::to_string)));
                }
                Err(_) => values.extend(std::iter::repeat(None).take(df.height())),
            }
        }
        columns.push(string_series(name, &values).into());
    }

    Ok(DataFrame::new(columns)?)
}

pub(crate) fn string_series(name: &str, values: &[Option<String>]) -> Series {
    Series::new(
        name.into(),
        values
            .iter()
            .map(|opt| opt.as_deref())
            .collect::<Vec<Option<&str>>>(),
    )
}

fn compute_hash(contents: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(contents);
    let hash = hasher.finalize();
    hash.to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_raw_csv_keeps_strings_and_nulls_empty_fields() {
        let df = read_raw_csv("gw.csv", b"name,GW,xP\nSalah,1,\nHaaland,x,5.5\n").unwrap();
        assert_eq!(df.height(), 2);
        let gw = df.column("GW").unwrap().str().unwrap();
        assert_eq!(gw.get(1), Some("x"));
        let xp = df.column("xP").unwrap().str().unwrap();
        assert_eq!(xp.get(0), None);
    }

    #[test]
    fn ragged_rows_are_reported_against_the_object() {
        let err = read_raw_csv("broken.csv", b"a,b\n1,2,3\n").unwrap_err();
        assert!(matches!(err, PipelineError::Csv { ref object, .. } if object == "broken.csv"));
    }

    #[test]
    fn concat_raw_unions_columns_in_order() {
        let first = read_raw_csv("a.csv", b"name,GW\nA,1\n").unwrap();
        let second = read_raw_csv("b.csv", b"name,xP\nB,2.5\n").unwrap();

        let combined = concat_raw(&[first, second]).unwrap();
        let names: Vec<&str> = combined
            .get_column_names()
            .into_iter()
            .map(|n| n.as_str())
            .collect();
        assert_eq!(names, vec!["name", "GW", "xP"]);
        let gw = combined.column("GW").unwrap().str().unwrap();
        assert_eq!(gw.get(0), Some("1"));
        assert_eq!(gw.get(1), None);
        let xp = combined.column("xP").unwrap().str().unwrap();
        assert_eq!(xp.get(0), None);
        assert_eq!(xp.get(1), Some("2.5"));
    }

    #[test]
    fn ingest_objects_rejects_empty_bucket() {
        let err = ingest_objects("gameweeks", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Fetch { ref bucket, .. } if bucket == "gameweeks"));
    }
}
