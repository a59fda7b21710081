//! Opponent resolution for per-player match rows.
//!
//! Rows are grouped by (kickoff time, fixture). A group with exactly two distinct team
//! values is a well-formed fixture and every row receives the other team; any other
//! group is degenerate and every row in it gets a null opponent. Groups may hold any
//! number of rows per team, in any order.

use std::collections::HashMap;

use polars::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::normalize::datetime_dtype;

#[derive(Debug, Clone, Copy)]
pub struct OpponentColumns<'a> {
    pub kickoff: &'a str,
    pub fixture: &'a str,
    pub team: &'a str,
    pub output: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OpponentSummary {
    pub groups: usize,
    pub resolved_groups: usize,
    pub degenerate_groups: usize,
    /// Rows with a null kickoff or fixture, which cannot join any group.
    pub ungrouped_rows: usize,
}

type GroupKey = (i64, i64);

struct FixtureGroup<'a> {
    rows: Vec<usize>,
    /// Distinct non-null team values; tracking stops once a third appears.
    teams: Vec<&'a str>,
}

impl<'a> FixtureGroup<'a> {
    fn observe(&mut self, row: usize, team: Option<&'a str>) {
        self.rows.push(row);
        if let Some(team) = team {
            if self.teams.len() <= 2 && !self.teams.contains(&team) {
                self.teams.push(team);
            }
        }
    }

    fn pair(&self) -> Option<(&'a str, &'a str)> {
        match self.teams.as_slice() {
            [a, b] => Some((*a, *b)),
            _ => None,
        }
    }
}

/// Computes the opponent of every row. `keys[i]` is row i's group key (None when the
/// row cannot be grouped) and `teams[i]` its team.
pub fn assign_opponents<'a>(
    keys: &[Option<GroupKey>],
    teams: &[Option<&'a str>],
) -> (Vec<Option<&'a str>>, OpponentSummary) {
    let mut groups: HashMap<GroupKey, FixtureGroup<'a>> = HashMap::new();
    let mut summary = OpponentSummary::default();

    for (row, key) in keys.iter().enumerate() {
        match key {
            Some(key) => groups
                .entry(*key)
                .or_insert_with(|| FixtureGroup {
                    rows: Vec::new(),
                    teams: Vec::with_capacity(3),
                })
                .observe(row, teams[row]),
            None => summary.ungrouped_rows += 1,
        }
    }

    let mut opponents: Vec<Option<&'a str>> = vec![None; keys.len()];
    summary.groups = groups.len();

    for group in groups.values() {
        let Some((first, second)) = group.pair() else {
            summary.degenerate_groups += 1;
            continue;
        };
        summary.resolved_groups += 1;
        for &row in &group.rows {
            opponents[row] = match teams[row] {
                Some(team) if team == first => Some(second),
                Some(team) if team == second => Some(first),
                _ => None,
            };
        }
    }

    (opponents, summary)
}

/// Adds the `columns.output` opponent column to `df`, replacing any existing column of
/// that name.
pub fn resolve_opponents(
    df: &DataFrame,
    columns: OpponentColumns<'_>,
) -> Result<(DataFrame, OpponentSummary)> {
    for name in [columns.kickoff, columns.fixture, columns.team] {
        if df.get_column_index(name).is_none() {
            return Err(PipelineError::Schema(format!(
                "cannot resolve opponents: column '{name}' is missing"
            )));
        }
    }

    let kickoff = df.column(columns.kickoff)?.cast(&datetime_dtype())?;
    let kickoff = kickoff.datetime()?;
    let fixture = df.column(columns.fixture)?.cast(&DataType::Int64)?;
    let fixture = fixture.i64()?;
    let team = df.column(columns.team)?.cast(&DataType::String)?;
    let team = team.str()?;

    let keys: Vec<Option<GroupKey>> = (0..df.height())
        .map(|idx| match (kickoff.get(idx), fixture.get(idx)) {
            (Some(k), Some(f)) => Some((k, f)),
            _ => None,
        })
        .collect();
    let teams: Vec<Option<&str>> = team.into_iter().collect();

    let (opponents, summary) = assign_opponents(&keys, &teams);

    if summary.degenerate_groups > 0 {
        warn!(
            groups = summary.degenerate_groups,
            "fixture groups without exactly two teams; opponents left null"
        );
    }
    info!(
        groups = summary.groups,
        resolved = summary.resolved_groups,
        ungrouped_rows = summary.ungrouped_rows,
        "resolved opponents"
    );

    let mut output = df.clone();
    output.with_column(Series::new(columns.output.into(), opponents))?;
    Ok((output, summary))
}
