use std::time::Duration;

use anyhow::{Context, Result};
use fpl_core::enforce::enforce_schema;
use fpl_core::loader::load_full_refresh;
use fpl_core::schema::FIXTURES_TABLE;
use fpl_core::warehouse::{PgWarehouse, Warehouse};
use polars::prelude::*;
use sqlx::Row;

const DATABASE_URL_VAR: &str = "FPL_TEST_DATABASE_URL";

#[tokio::test]
async fn full_refresh_replaces_rows_in_postgres() -> Result<()> {
    let Ok(url) = std::env::var(DATABASE_URL_VAR) else {
        eprintln!("Skipping Postgres load test; set {DATABASE_URL_VAR} to enable");
        return Ok(());
    };

    let warehouse = PgWarehouse::from_url(&url, Duration::from_secs(10))?;
    let pool = sqlx::PgPool::connect(&url)
        .await
        .context("failed to connect verification pool")?;

    let first = df![
        "code" => [1i64, 2, 3],
        "season" => ["2023-24", "2023-24", "2023-24"],
        "finished" => [true, false, true],
    ]?;
    let report = load_full_refresh(&warehouse, &enforce_schema(&first, &FIXTURES_TABLE)?).await?;
    assert_eq!(report.rows_loaded, 3);

    let second = df!["code" => [9i64], "team_a_score" => [Some(2.0f64)]]?;
    load_full_refresh(&warehouse, &enforce_schema(&second, &FIXTURES_TABLE)?).await?;

    let rows = sqlx::query("SELECT code, team_a_score, season FROM stg_fixtures")
        .fetch_all(&pool)
        .await?;
    assert_eq!(rows.len(), 1);
    let code: i64 = rows[0].try_get("code")?;
    let score: Option<f64> = rows[0].try_get("team_a_score")?;
    let season: Option<String> = rows[0].try_get("season")?;
    assert_eq!(code, 9);
    assert_eq!(score, Some(2.0));
    assert_eq!(season, None);

    let comment: Option<String> =
        sqlx::query_scalar("SELECT obj_description('stg_fixtures'::regclass, 'pg_class')")
            .fetch_one(&pool)
            .await?;
    assert_eq!(comment.as_deref(), Some("fpl schema v1"));

    // Closing with a transaction still open rolls it back.
    let mut conn = warehouse.connect().await?;
    conn.begin().await?;
    conn.truncate(&FIXTURES_TABLE).await?;
    conn.close().await?;
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stg_fixtures")
        .fetch_one(&pool)
        .await?;
    assert_eq!(remaining, 1);

    pool.close().await;
    Ok(())
}
