//! Destination table definitions. Each schema is a fixed, versioned constant; the
//! warehouse table is never shaped from the incoming data.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    BigInt,
    Double,
    Text,
    Timestamp,
    Boolean,
}

impl SqlType {
    pub fn ddl(self) -> &'static str {
        match self {
            SqlType::BigInt => "BIGINT",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Text => "TEXT",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Boolean => "BOOLEAN",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SqlType::BigInt => "bigint",
            SqlType::Double => "double",
            SqlType::Text => "text",
            SqlType::Timestamp => "timestamp",
            SqlType::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub nullable: bool,
}

const fn nullable(name: &'static str, sql_type: SqlType) -> ColumnSpec {
    ColumnSpec {
        name,
        sql_type,
        nullable: true,
    }
}

const fn required(name: &'static str, sql_type: SqlType) -> ColumnSpec {
    ColumnSpec {
        name,
        sql_type,
        nullable: false,
    }
}

#[derive(Debug, Serialize)]
pub struct TableSchema {
    pub name: &'static str,
    pub version: u32,
    /// Surrogate `BIGSERIAL` key; never supplied by the pipeline.
    pub primary_key: &'static str,
    pub columns: &'static [ColumnSpec],
}

impl TableSchema {
    pub fn create_table_sql(&self) -> String {
        let mut lines = Vec::with_capacity(self.columns.len() + 1);
        lines.push(format!("    {} BIGSERIAL PRIMARY KEY", self.primary_key));
        for column in self.columns {
            let constraint = if column.nullable { "" } else { " NOT NULL" };
            lines.push(format!(
                "    {} {}{}",
                column.name,
                column.sql_type.ddl(),
                constraint
            ));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            self.name,
            lines.join(",\n")
        )
    }

    pub fn comment_sql(&self) -> String {
        format!(
            "COMMENT ON TABLE {} IS 'fpl schema v{}'",
            self.name, self.version
        )
    }

    pub fn truncate_sql(&self) -> String {
        format!("TRUNCATE TABLE {}", self.name)
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }
}

use SqlType::{BigInt, Boolean, Double, Text, Timestamp};

pub static GAMEWEEKS_TABLE: TableSchema = TableSchema {
    name: "stg_gameweeks",
    version: 1,
    primary_key: "player_performance_id",
    columns: &[
        required("player_name", Text),
        nullable("player_id", BigInt),
        nullable("position", Text),
        nullable("player_cost", Double),
        nullable("player_started", Boolean),
        nullable("season", Text),
        required("gameweek", BigInt),
        nullable("fixture", BigInt),
        nullable("kickoff_time", Timestamp),
        nullable("team", Text),
        nullable("opponent_team", Text),
        nullable("was_home", Boolean),
        nullable("team_h_score", BigInt),
        nullable("team_a_score", BigInt),
        nullable("total_points", BigInt),
        nullable("minutes_played", BigInt),
        nullable("goals_scored", BigInt),
        nullable("assists", BigInt),
        nullable("clean_sheets", Boolean),
        nullable("goals_conceded", BigInt),
        nullable("own_goals", BigInt),
        nullable("penalties_saved", BigInt),
        nullable("penalties_missed", BigInt),
        nullable("yellow_cards", BigInt),
        nullable("red_cards", BigInt),
        nullable("saves", BigInt),
        nullable("bonus", BigInt),
        nullable("bps", BigInt),
        nullable("influence", Double),
        nullable("creativity", Double),
        nullable("threat", Double),
        nullable("ict_index", Double),
        nullable("expected_points", Double),
        nullable("expected_goals", Double),
        nullable("expected_assists", Double),
        nullable("expected_goal_involvements", Double),
        nullable("expected_goals_conceded", Double),
        nullable("transfers_balance", BigInt),
        nullable("transfers_in", BigInt),
        nullable("transfers_out", BigInt),
        nullable("selected", BigInt),
    ],
};

pub static FIXTURES_TABLE: TableSchema = TableSchema {
    name: "stg_fixtures",
    version: 1,
    primary_key: "fixture_id",
    columns: &[
        required("code", BigInt),
        nullable("gameweek", BigInt),
        nullable("season", Text),
        nullable("finished", Boolean),
        nullable("finished_provisional", Boolean),
        nullable("kickoff_time", Timestamp),
        nullable("minutes", BigInt),
        nullable("provisional_start_time", Boolean),
        nullable("started", Boolean),
        nullable("team_a", BigInt),
        nullable("team_a_score", Double),
        nullable("team_h", BigInt),
        nullable("team_h_score", Double),
        nullable("team_h_difficulty", BigInt),
        nullable("team_a_difficulty", BigInt),
        nullable("pulse_id", BigInt),
    ],
};
