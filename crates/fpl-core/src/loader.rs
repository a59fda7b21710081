//! Full-refresh load sequencing.
//!
//! A run moves through `Fetched → Transformed → Connected → TableEnsured → Truncated →
//! Loaded → Closed`. Table creation and the truncate are committed before the append
//! transaction opens, so an append that fails leaves the destination table empty.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::enforce::LoadBatch;
use crate::error::{PipelineError, Result};
use crate::schema::TableSchema;
use crate::warehouse::{Warehouse, WarehouseConnection, WarehouseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Fetched,
    Transformed,
    Connected,
    TableEnsured,
    Truncated,
    Loaded,
    Closed,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadState::Fetched => "fetched",
            LoadState::Transformed => "transformed",
            LoadState::Connected => "connected",
            LoadState::TableEnsured => "table_ensured",
            LoadState::Truncated => "truncated",
            LoadState::Loaded => "loaded",
            LoadState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub table: &'static str,
    pub schema_version: u32,
    pub rows_loaded: u64,
    /// States reached, starting at `Transformed`.
    pub states: Vec<LoadState>,
}

fn failed_at(table: &TableSchema, state: LoadState) -> impl FnOnce(WarehouseError) -> PipelineError {
    let table = table.name.to_string();
    move |source| PipelineError::Load {
        table,
        state,
        source,
    }
}

/// Replaces the contents of `batch.table` with the rows of `batch`.
///
/// Once connected, the connection is closed on every exit path.
pub async fn load_full_refresh(warehouse: &dyn Warehouse, batch: &LoadBatch) -> Result<LoadReport> {
    let table = batch.table;
    let mut states = vec![LoadState::Transformed];

    let mut conn = warehouse
        .connect()
        .await
        .map_err(failed_at(table, LoadState::Connected))?;
    states.push(LoadState::Connected);
    debug!(table = table.name, "connected to warehouse");

    let outcome = replace_contents(conn.as_mut(), batch, &mut states).await;
    let closed = conn.close().await;

    match (outcome, closed) {
        (Ok(rows_loaded), closed) => {
            // The append is committed by now, so a failed close only loses the socket.
            if let Err(close_err) = closed {
                warn!(table = table.name, error = %close_err, "failed to close connection after commit");
            }
            states.push(LoadState::Closed);
            info!(
                table = table.name,
                rows = rows_loaded,
                schema_version = table.version,
                "load complete"
            );
            Ok(LoadReport {
                table: table.name,
                schema_version: table.version,
                rows_loaded,
                states,
            })
        }
        (Err(err), closed) => {
            if let Err(close_err) = closed {
                warn!(table = table.name, error = %close_err, "failed to close connection after load error");
            }
            Err(err)
        }
    }
}

async fn replace_contents(
    conn: &mut dyn WarehouseConnection,
    batch: &LoadBatch,
    states: &mut Vec<LoadState>,
) -> Result<u64> {
    let table = batch.table;

    conn.begin()
        .await
        .map_err(failed_at(table, LoadState::TableEnsured))?;
    if let Err(err) = prepare_table(conn, table, states).await {
        abandon(conn, table).await;
        return Err(err);
    }

    conn.begin().await.map_err(failed_at(table, LoadState::Loaded))?;
    let rows = match conn.insert_rows(batch).await {
        Ok(rows) => rows,
        Err(source) => {
            abandon(conn, table).await;
            warn!(
                table = table.name,
                "append failed after truncate; destination table is empty"
            );
            return Err(failed_at(table, LoadState::Loaded)(source));
        }
    };
    states.push(LoadState::Loaded);

    conn.commit().await.map_err(failed_at(table, LoadState::Closed))?;
    Ok(rows)
}

async fn prepare_table(
    conn: &mut dyn WarehouseConnection,
    table: &TableSchema,
    states: &mut Vec<LoadState>,
) -> Result<()> {
    conn.ensure_table(table)
        .await
        .map_err(failed_at(table, LoadState::TableEnsured))?;
    states.push(LoadState::TableEnsured);

    conn.truncate(table)
        .await
        .map_err(failed_at(table, LoadState::Truncated))?;
    conn.commit()
        .await
        .map_err(failed_at(table, LoadState::Truncated))?;
    states.push(LoadState::Truncated);
    info!(table = table.name, "destination table truncated");
    Ok(())
}

async fn abandon(conn: &mut dyn WarehouseConnection, table: &TableSchema) {
    match conn.rollback().await {
        Ok(()) => debug!(table = table.name, "transaction rolled back"),
        Err(WarehouseError::NoTransaction) => {}
        Err(err) => warn!(table = table.name, error = %err, "rollback failed"),
    }
}
