use once_cell::sync::Lazy;
use polars::prelude::DataFrame;
use tracing::info;

use crate::columns::{drop_columns, fill_from, rename_columns};
use crate::dedupe::deduplicate;
use crate::error::Result;
use crate::normalize::{normalize_columns, ColumnKind};
use crate::opponents::{resolve_opponents, OpponentColumns, OpponentSummary};
use crate::schema::{TableSchema, FIXTURES_TABLE, GAMEWEEKS_TABLE};
use crate::season::with_season;

/// Column-level rules a pipeline applies between ingestion and schema enforcement.
#[derive(Debug)]
pub struct TransformRules {
    pub coercions: &'static [(&'static str, ColumnKind)],
    /// `(target, fallback)` pairs: nulls in `target` take the row's `fallback` value
    /// before the identity key is chosen.
    pub fills: &'static [(&'static str, &'static str)],
    /// Identity key candidates in priority order, named as in the raw export.
    pub identity_keys: &'static [&'static [&'static str]],
    /// `(datetime source, label target)` for the season column.
    pub season: (&'static str, &'static str),
    pub renames: &'static [(&'static str, &'static str)],
    pub drops: &'static [&'static str],
    /// Opponent resolution, using post-rename column names.
    pub opponents: Option<OpponentColumns<'static>>,
}

#[derive(Debug)]
pub struct TransformOutput {
    pub frame: DataFrame,
    pub opponents: Option<OpponentSummary>,
}

pub trait ProcessingPipeline: Send + Sync {
    fn code_identifier(&self) -> &'static str;
    fn version(&self) -> &'static str;
    /// Short name used to select the pipeline from the command line.
    fn target(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn source_bucket(&self) -> &'static str;
    /// Environment variable holding the configured destination table name.
    fn table_name_var(&self) -> &'static str;
    fn table(&self) -> &'static TableSchema;
    fn rules(&self) -> &'static TransformRules;

    /// Normalize, deduplicate, label seasons, rename and drop, then resolve opponents.
    fn transform(&self, raw: &DataFrame) -> Result<TransformOutput> {
        apply_rules(raw, self.rules())
    }
}

pub fn apply_rules(raw: &DataFrame, rules: &TransformRules) -> Result<TransformOutput> {
    let mut normalized = normalize_columns(raw, rules.coercions)?;
    for &(target, fallback) in rules.fills {
        normalized = fill_from(&normalized, target, fallback)?;
    }
    let deduped = deduplicate(&normalized, rules.identity_keys)?;
    let (source, target) = rules.season;
    let mut frame = with_season(&deduped, source, target)?;
    rename_columns(&mut frame, rules.renames)?;
    let frame = drop_columns(&frame, rules.drops)?;

    let (frame, opponents) = match rules.opponents {
        Some(columns) => {
            let (frame, summary) = resolve_opponents(&frame, columns)?;
            (frame, Some(summary))
        }
        None => (frame, None),
    };

    info!(
        rows = frame.height(),
        columns = frame.width(),
        "transform complete"
    );
    Ok(TransformOutput { frame, opponents })
}

use ColumnKind::{Boolean, Datetime, Float, Integer};

static GAMEWEEK_RULES: TransformRules = TransformRules {
    coercions: &[
        ("GW", Integer),
        ("round", Integer),
        ("element", Integer),
        ("fixture", Integer),
        ("assists", Integer),
        ("bonus", Integer),
        ("bps", Integer),
        ("goals_conceded", Integer),
        ("goals_scored", Integer),
        ("minutes", Integer),
        ("own_goals", Integer),
        ("penalties_missed", Integer),
        ("penalties_saved", Integer),
        ("red_cards", Integer),
        ("saves", Integer),
        ("selected", Integer),
        ("team_a_score", Integer),
        ("team_h_score", Integer),
        ("total_points", Integer),
        ("transfers_balance", Integer),
        ("transfers_in", Integer),
        ("transfers_out", Integer),
        ("yellow_cards", Integer),
        ("xP", Float),
        ("creativity", Float),
        ("expected_assists", Float),
        ("expected_goal_involvements", Float),
        ("expected_goals", Float),
        ("expected_goals_conceded", Float),
        ("ict_index", Float),
        ("influence", Float),
        ("threat", Float),
        ("value", Float),
        ("kickoff_time", Datetime),
        ("was_home", Boolean),
        ("clean_sheets", Boolean),
        ("starts", Boolean),
    ],
    // Older exports carry only `round`; a run may mix both kinds.
    fills: &[("GW", "round")],
    identity_keys: &[&["name", "GW", "kickoff_time"], &["name", "round", "kickoff_time"]],
    season: ("kickoff_time", "season"),
    renames: &[
        ("name", "player_name"),
        ("GW", "gameweek"),
        ("round", "gameweek"),
        ("value", "player_cost"),
        ("minutes", "minutes_played"),
        ("starts", "player_started"),
        ("xP", "expected_points"),
        ("element", "player_id"),
    ],
    // The raw opponent_team is a numeric team id; the resolver rebuilds it by name.
    drops: &["opponent_team", "round"],
    opponents: Some(OpponentColumns {
        kickoff: "kickoff_time",
        fixture: "fixture",
        team: "team",
        output: "opponent_team",
    }),
};

static FIXTURE_RULES: TransformRules = TransformRules {
    coercions: &[
        ("event", Integer),
        ("id", Integer),
        ("code", Integer),
        ("minutes", Integer),
        ("team_a", Integer),
        ("team_h", Integer),
        ("team_h_difficulty", Integer),
        ("team_a_difficulty", Integer),
        ("pulse_id", Integer),
        ("team_a_score", Float),
        ("team_h_score", Float),
        ("kickoff_time", Datetime),
        ("finished", Boolean),
        ("finished_provisional", Boolean),
        ("started", Boolean),
        ("provisional_start_time", Boolean),
    ],
    fills: &[],
    identity_keys: &[&["pulse_id", "code"], &["code"]],
    season: ("kickoff_time", "season"),
    renames: &[("event", "gameweek")],
    drops: &["stats"],
    opponents: None,
};

#[derive(Debug, Clone, Copy)]
pub struct GameweeksPipeline;

impl ProcessingPipeline for GameweeksPipeline {
    fn code_identifier(&self) -> &'static str {
        "gameweeks_v1"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn target(&self) -> &'static str {
        "gameweeks"
    }

    fn description(&self) -> &'static str {
        "Per-player gameweek performances with season labels and resolved opponents"
    }

    fn source_bucket(&self) -> &'static str {
        "gameweeks"
    }

    fn table_name_var(&self) -> &'static str {
        "PG_TABLE_NAME_GW"
    }

    fn table(&self) -> &'static TableSchema {
        &GAMEWEEKS_TABLE
    }

    fn rules(&self) -> &'static TransformRules {
        &GAMEWEEK_RULES
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixturesPipeline;

impl ProcessingPipeline for FixturesPipeline {
    fn code_identifier(&self) -> &'static str {
        "fixtures_v1"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn target(&self) -> &'static str {
        "fixtures"
    }

    fn description(&self) -> &'static str {
        "Fixture schedule and results with season labels"
    }

    fn source_bucket(&self) -> &'static str {
        "fixtures"
    }

    fn table_name_var(&self) -> &'static str {
        "PG_TABLE_NAME_FIXTURES"
    }

    fn table(&self) -> &'static TableSchema {
        &FIXTURES_TABLE
    }

    fn rules(&self) -> &'static TransformRules {
        &FIXTURE_RULES
    }
}

static PIPELINES: Lazy<Vec<&'static dyn ProcessingPipeline>> = Lazy::new(|| {
    vec![
        &GameweeksPipeline as &dyn ProcessingPipeline,
        &FixturesPipeline as &dyn ProcessingPipeline,
    ]
});

pub fn all_pipelines() -> &'static [&'static dyn ProcessingPipeline] {
    PIPELINES.as_slice()
}

pub fn find_pipeline(target: &str) -> Option<&'static dyn ProcessingPipeline> {
    all_pipelines()
        .iter()
        .copied()
        .find(|pipeline| pipeline.target() == target || pipeline.code_identifier() == target)
}
