use polars::prelude::*;
use tracing::info;

use crate::error::{PipelineError, Result};

/// Returns the first candidate key whose columns are all present in `df`.
pub fn select_identity_key<'a>(
    df: &DataFrame,
    candidates: &'a [&'a [&'a str]],
) -> Result<&'a [&'a str]> {
    candidates
        .iter()
        .copied()
        .find(|key| {
            !key.is_empty() && key.iter().all(|name| df.get_column_index(name).is_some())
        })
        .ok_or_else(|| {
            PipelineError::Schema(format!(
                "no usable identity key; tried {}",
                candidates
                    .iter()
                    .map(|key| format!("[{}]", key.join(", ")))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
}

/// Keeps only the last row, in input order, for each distinct value of `key`.
/// Surviving rows keep their relative order. Nulls compare equal to each other.
pub fn dedupe_keep_last(df: &DataFrame, key: &[&str]) -> Result<DataFrame> {
    let subset: Vec<String> = key.iter().map(|name| name.to_string()).collect();
    Ok(df.unique_stable(Some(&subset), UniqueKeepStrategy::Last, None)?)
}

/// Picks the identity key from `candidates` and removes duplicates under it.
pub fn deduplicate(df: &DataFrame, candidates: &[&[&str]]) -> Result<DataFrame> {
    let key = select_identity_key(df, candidates)?;
    let deduped = dedupe_keep_last(df, key)?;
    info!(
        key = %key.join(","),
        before = df.height(),
        after = deduped.height(),
        "deduplicated rows"
    );
    Ok(deduped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_the_last_row_per_key() {
        let df = df!["k" => [1i64, 1], "v" => ["A", "B"]].unwrap();
        let out = dedupe_keep_last(&df, &["k"]).unwrap();
        assert_eq!(out.height(), 1);
        assert_eq!(out.column("v").unwrap().str().unwrap().get(0), Some("B"));
    }

    #[test]
    fn preserves_order_of_survivors() {
        let df = df![
            "name" => ["A", "B", "A", "C", "B"],
            "GW" => [1i64, 1, 1, 1, 2],
            "v" => [1i64, 2, 3, 4, 5],
        ]
        .unwrap();
        let out = dedupe_keep_last(&df, &["name", "GW"]).unwrap();
        let v: Vec<_> = out.column("v").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(v, vec![Some(2), Some(3), Some(4), Some(5)]);
    }

    #[test]
    fn deduplication_is_idempotent() {
        let df = df![
            "name" => ["A", "A", "B", "B", "B"],
            "GW" => [Some(1i64), Some(1), None, None, Some(3)],
            "v" => [1i64, 2, 3, 4, 5],
        ]
        .unwrap();
        let once = dedupe_keep_last(&df, &["name", "GW"]).unwrap();
        let twice = dedupe_keep_last(&once, &["name", "GW"]).unwrap();
        assert!(once.equals_missing(&twice));
        assert_eq!(once.height(), 3);
    }

    #[test]
    fn null_keys_collapse_together() {
        let df = df![
            "name" => [Some("A"), None, Some("A"), None],
            "kickoff_time" => [None, Some("t1"), None, Some("t1")],
            "v" => [1i64, 2, 3, 4],
        ]
        .unwrap();
        let out = dedupe_keep_last(&df, &["name", "kickoff_time"]).unwrap();
        let v: Vec<_> = out.column("v").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(v, vec![Some(3), Some(4)]);
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let df = df!["name" => ["A"]].unwrap();
        assert!(dedupe_keep_last(&df, &["name", "GW"]).is_err());
    }

    #[test]
    fn selects_first_complete_candidate() {
        let df = df!["code" => [1i64], "name" => ["A"]].unwrap();
        let candidates: &[&[&str]] = &[&["pulse_id", "code"], &["code"]];
        assert_eq!(select_identity_key(&df, candidates).unwrap(), &["code"]);
    }

    #[test]
    fn missing_identity_key_is_a_schema_error() {
        let df = df!["name" => ["A"]].unwrap();
        let candidates: &[&[&str]] = &[&["pulse_id", "code"], &["code"]];
        let err = deduplicate(&df, candidates).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(msg) if msg.contains("no usable identity key")));
    }
}
