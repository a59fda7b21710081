use polars::prelude::*;
use tracing::{debug, warn};

use crate::error::Result;

/// Applies `(from, to)` renames in order. A rename is skipped when `from` is absent or
/// when `to` already exists, so an earlier rename wins over a later fallback.
///
/// Returns the skipped renames whose target was not produced by an earlier rename in
/// `renames`, i.e. real name clashes rather than fallbacks.
pub fn rename_columns<'a>(
    df: &mut DataFrame,
    renames: &[(&'a str, &'a str)],
) -> Result<Vec<(&'a str, &'a str)>> {
    let mut clashes = Vec::new();
    for (idx, &(from, to)) in renames.iter().enumerate() {
        if df.get_column_index(from).is_none() {
            continue;
        }
        if df.get_column_index(to).is_some() {
            let fallback = renames[..idx].iter().any(|&(_, earlier)| earlier == to);
            if fallback {
                debug!(from, to, "fallback rename not needed");
            } else {
                warn!(from, to, "rename target already present; keeping existing column");
                clashes.push((from, to));
            }
            continue;
        }
        df.rename(from, to.into())?;
    }
    Ok(clashes)
}

/// Fills nulls in `target` with the same row's `fallback` value. Nothing changes
/// unless both columns exist.
pub fn fill_from(df: &DataFrame, target: &str, fallback: &str) -> Result<DataFrame> {
    let (Ok(primary), Ok(secondary)) = (df.column(target), df.column(fallback)) else {
        return Ok(df.clone());
    };

    let secondary = secondary.cast(primary.dtype())?;
    let filled = primary
        .zip_with(&primary.is_not_null(), &secondary)?
        .with_name(target.into());
    debug!(
        target,
        fallback,
        filled = primary.null_count() - filled.null_count(),
        "filled nulls from fallback column"
    );

    let mut output = df.clone();
    output.with_column(filled)?;
    Ok(output)
}

/// Drops each listed column that exists.
pub fn drop_columns(df: &DataFrame, names: &[&str]) -> Result<DataFrame> {
    let mut output = df.clone();
    for name in names {
        if output.get_column_index(name).is_some() {
            output = output.drop(name)?;
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_rename_wins() {
        let mut df = df!["GW" => [1i64], "round" => [9i64]].unwrap();
        let clashes =
            rename_columns(&mut df, &[("GW", "gameweek"), ("round", "gameweek")]).unwrap();
        assert_eq!(df.column("gameweek").unwrap().i64().unwrap().get(0), Some(1));
        assert!(df.column("round").is_ok());
        assert!(clashes.is_empty());
    }

    #[test]
    fn fallback_rename_applies_when_primary_is_absent() {
        let mut df = df!["round" => [9i64]].unwrap();
        rename_columns(&mut df, &[("GW", "gameweek"), ("round", "gameweek")]).unwrap();
        assert_eq!(df.column("gameweek").unwrap().i64().unwrap().get(0), Some(9));
    }

    #[test]
    fn rename_onto_an_existing_column_is_a_clash() {
        let mut df = df!["name" => ["A"], "player_name" => ["B"]].unwrap();
        let clashes = rename_columns(&mut df, &[("name", "player_name")]).unwrap();
        assert_eq!(clashes, vec![("name", "player_name")]);
        assert_eq!(df.column("player_name").unwrap().str().unwrap().get(0), Some("B"));
    }

    #[test]
    fn fill_from_only_replaces_nulls() {
        let df = df![
            "GW" => [Some(1i64), None, Some(3)],
            "round" => [Some(9i64), Some(2), None],
        ]
        .unwrap();
        let out = fill_from(&df, "GW", "round").unwrap();
        let gw: Vec<_> = out.column("GW").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(gw, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(out.width(), 2);
    }

    #[test]
    fn fill_from_without_fallback_is_a_no_op() {
        let df = df!["GW" => [None::<i64>, Some(2)]].unwrap();
        let out = fill_from(&df, "GW", "round").unwrap();
        assert!(out.equals_missing(&df));
    }

    #[test]
    fn drop_ignores_missing_columns() {
        let df = df!["stats" => ["[]"], "code" => [1i64]].unwrap();
        let out = drop_columns(&df, &["stats", "not_there"]).unwrap();
        assert_eq!(out.width(), 1);
        assert!(out.column("code").is_ok());
    }
}
