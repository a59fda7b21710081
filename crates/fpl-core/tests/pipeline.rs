mod common;

use anyhow::Result;
use chrono::NaiveDate;
use fpl_core::loader::LoadState;
use fpl_core::pipelines::{GameweeksPipeline, ProcessingPipeline};
use fpl_core::schema::GAMEWEEKS_TABLE;
use fpl_core::warehouse::{MemoryWarehouse, Value};
use fpl_core::{run_pipeline, RunOptions};

use common::{column_index, csv, row_for, store_with, GAMEWEEK_HEADER};

#[tokio::test]
async fn later_batch_wins_and_opponents_are_resolved() -> Result<()> {
    let first = csv(
        GAMEWEEK_HEADER,
        &[
            "A,MID,Arsenal,1,10,2023-08-12T12:30:00Z,1,16,True,True,1,90,6,65,5.2,2,1",
            "B,DEF,Nott'm Forest,2,10,2023-08-12T12:30:00Z,1,1,False,False,1,90,1,45,2.0,2,1",
            "C,FWD,Arsenal,3,10,2023-08-12T12:30:00Z,1,16,True,True,0,12,2,75,3.1,2,1",
        ],
    );
    let second = csv(
        GAMEWEEK_HEADER,
        &["A,MID,Arsenal,1,10,2023-08-12T12:30:00Z,1,16,True,True,1,90,9,65,5.2,2,1"],
    );
    let store = store_with(
        "gameweeks",
        &[("batch-001.csv", first), ("batch-002.csv", second)],
    )
    .await;
    let warehouse = MemoryWarehouse::new();

    let report = run_pipeline(&GameweeksPipeline, &store, &warehouse, RunOptions::default()).await?;

    assert_eq!(report.pipeline, GameweeksPipeline.code_identifier());
    assert_eq!(report.objects.len(), 2);
    assert_eq!(report.raw_rows, 4);
    assert_eq!(report.transformed_rows, 3);
    assert_eq!(report.states.first(), Some(&LoadState::Fetched));
    assert_eq!(report.states.last(), Some(&LoadState::Closed));
    let opponents = report.opponents.expect("gameweeks resolve opponents");
    assert_eq!(opponents.resolved_groups, 1);
    assert_eq!(opponents.degenerate_groups, 0);

    let rows = warehouse.rows("stg_gameweeks").expect("table created");
    assert_eq!(rows.len(), 3);

    let table = &GAMEWEEKS_TABLE;
    let a = row_for(&rows, table, "player_name", "A");
    assert_eq!(a[column_index(table, "total_points")], Value::BigInt(Some(9)));
    assert_eq!(
        a[column_index(table, "opponent_team")],
        Value::Text(Some("Nott'm Forest".to_string()))
    );
    assert_eq!(a[column_index(table, "season")], Value::Text(Some("2023-24".to_string())));
    assert_eq!(a[column_index(table, "gameweek")], Value::BigInt(Some(1)));
    assert_eq!(a[column_index(table, "player_cost")], Value::Double(Some(65.0)));
    assert_eq!(a[column_index(table, "player_id")], Value::BigInt(Some(1)));

    let b = row_for(&rows, table, "player_name", "B");
    assert_eq!(
        b[column_index(table, "opponent_team")],
        Value::Text(Some("Arsenal".to_string()))
    );
    assert_eq!(b[column_index(table, "was_home")], Value::Boolean(Some(false)));

    let c = row_for(&rows, table, "player_name", "C");
    assert_eq!(
        c[column_index(table, "opponent_team")],
        Value::Text(Some("Nott'm Forest".to_string()))
    );
    assert_eq!(c[column_index(table, "player_started")], Value::Boolean(Some(false)));
    assert_eq!(c[column_index(table, "minutes_played")], Value::BigInt(Some(12)));

    let kickoff = NaiveDate::from_ymd_opt(2023, 8, 12)
        .and_then(|d| d.and_hms_opt(12, 30, 0))
        .expect("valid kickoff");
    assert_eq!(c[column_index(table, "kickoff_time")], Value::Timestamp(Some(kickoff)));

    assert_eq!(warehouse.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn round_only_and_gw_exports_mix_in_one_run() -> Result<()> {
    let older = csv(
        "name,team,fixture,kickoff_time,round,total_points",
        &["A,Arsenal,10,2023-08-12T12:30:00Z,1,6"],
    );
    let newer = csv(
        "name,team,fixture,kickoff_time,GW,total_points",
        &[
            "A,Arsenal,10,2023-08-12T12:30:00Z,1,9",
            "B,Nott'm Forest,10,2023-08-12T12:30:00Z,1,1",
        ],
    );
    let store = store_with("gameweeks", &[("a.csv", older), ("b.csv", newer)]).await;
    let warehouse = MemoryWarehouse::new();

    let report = run_pipeline(&GameweeksPipeline, &store, &warehouse, RunOptions::default()).await?;
    assert_eq!(report.raw_rows, 3);
    assert_eq!(report.transformed_rows, 2);

    let rows = warehouse.rows("stg_gameweeks").expect("table created");
    assert_eq!(rows.len(), 2);
    let table = &GAMEWEEKS_TABLE;
    let a = row_for(&rows, table, "player_name", "A");
    assert_eq!(a[column_index(table, "total_points")], Value::BigInt(Some(9)));
    assert_eq!(a[column_index(table, "gameweek")], Value::BigInt(Some(1)));
    assert_eq!(
        a[column_index(table, "opponent_team")],
        Value::Text(Some("Nott'm Forest".to_string()))
    );
    let b = row_for(&rows, table, "player_name", "B");
    assert_eq!(b[column_index(table, "gameweek")], Value::BigInt(Some(1)));
    Ok(())
}

#[tokio::test]
async fn unparseable_numbers_load_as_nulls() -> Result<()> {
    let body = csv(
        GAMEWEEK_HEADER,
        &[
            "A,MID,Arsenal,1,10,2023-08-12T12:30:00Z,1,16,True,True,1,90,x,65,5.2,2,1",
            "B,DEF,Nott'm Forest,2,10,2023-08-12T12:30:00Z,1,1,False,False,1,n/a,1,45,,2,1",
        ],
    );
    let store = store_with("gameweeks", &[("gw1.csv", body)]).await;
    let warehouse = MemoryWarehouse::new();

    run_pipeline(&GameweeksPipeline, &store, &warehouse, RunOptions::default()).await?;

    let rows = warehouse.rows("stg_gameweeks").expect("table created");
    let table = &GAMEWEEKS_TABLE;
    let a = row_for(&rows, table, "player_name", "A");
    assert_eq!(a[column_index(table, "total_points")], Value::BigInt(None));
    let b = row_for(&rows, table, "player_name", "B");
    assert_eq!(b[column_index(table, "minutes_played")], Value::BigInt(None));
    assert_eq!(b[column_index(table, "expected_points")], Value::Double(None));
    Ok(())
}

#[tokio::test]
async fn fixture_with_three_teams_leaves_opponents_null() -> Result<()> {
    let body = csv(
        GAMEWEEK_HEADER,
        &[
            "A,MID,Arsenal,1,10,2023-08-12T12:30:00Z,1,16,True,True,1,90,6,65,5.2,2,1",
            "B,DEF,Nott'm Forest,2,10,2023-08-12T12:30:00Z,1,1,False,False,1,90,1,45,2.0,2,1",
            "D,GKP,Luton,4,10,2023-08-12T12:30:00Z,1,1,False,False,1,90,1,40,2.0,2,1",
            "E,MID,Brighton,5,11,2023-08-12T15:00:00Z,1,12,True,True,1,90,8,65,4.0,4,1",
            "F,MID,Luton,6,11,2023-08-12T15:00:00Z,1,5,False,False,1,90,1,45,1.0,4,1",
        ],
    );
    let store = store_with("gameweeks", &[("gw1.csv", body)]).await;
    let warehouse = MemoryWarehouse::new();

    let report = run_pipeline(&GameweeksPipeline, &store, &warehouse, RunOptions::default()).await?;
    let opponents = report.opponents.expect("summary present");
    assert_eq!(opponents.groups, 2);
    assert_eq!(opponents.degenerate_groups, 1);

    let rows = warehouse.rows("stg_gameweeks").expect("table created");
    let table = &GAMEWEEKS_TABLE;
    let idx = column_index(table, "opponent_team");
    for name in ["A", "B", "D"] {
        assert_eq!(row_for(&rows, table, "player_name", name)[idx], Value::Text(None));
    }
    assert_eq!(
        row_for(&rows, table, "player_name", "E")[idx],
        Value::Text(Some("Luton".to_string()))
    );
    Ok(())
}

#[tokio::test]
async fn dry_run_leaves_warehouse_untouched() -> Result<()> {
    let body = csv(
        GAMEWEEK_HEADER,
        &["A,MID,Arsenal,1,10,2023-08-12T12:30:00Z,1,16,True,True,1,90,6,65,5.2,2,1"],
    );
    let store = store_with("gameweeks", &[("gw1.csv", body)]).await;
    let warehouse = MemoryWarehouse::new();

    let report = run_pipeline(
        &GameweeksPipeline,
        &store,
        &warehouse,
        RunOptions { dry_run: true },
    )
    .await?;

    assert!(report.load.is_none());
    assert_eq!(report.states, vec![LoadState::Fetched, LoadState::Transformed]);
    assert_eq!(report.transformed_rows, 1);
    assert_eq!(warehouse.connections_opened(), 0);
    assert!(!warehouse.has_table("stg_gameweeks"));
    Ok(())
}
