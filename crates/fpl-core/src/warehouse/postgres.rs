use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgQueryResult};
use sqlx::query::Query;
use sqlx::{Postgres, QueryBuilder, Transaction};
use tracing::debug;

use super::{Warehouse, WarehouseConnection, WarehouseError};
use crate::config::PostgresConfig;
use crate::enforce::{Cell, LoadBatch};
use crate::schema::TableSchema;

/// Postgres caps a single statement at this many bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;

/// Postgres-backed warehouse. Every [`connect`](Warehouse::connect) opens a
/// single-connection pool owned by the caller until it is closed.
#[derive(Debug, Clone)]
pub struct PgWarehouse {
    options: PgConnectOptions,
    connect_timeout: Duration,
}

impl PgWarehouse {
    pub fn new(config: &PostgresConfig) -> Self {
        Self {
            options: config.connect_options(),
            connect_timeout: config.connect_timeout,
        }
    }

    pub fn from_url(url: &str, connect_timeout: Duration) -> Result<Self, WarehouseError> {
        let options: PgConnectOptions = url.parse()?;
        Ok(Self {
            options,
            connect_timeout,
        })
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn connect(&self) -> Result<Box<dyn WarehouseConnection>, WarehouseError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.connect_timeout)
            .connect_with(self.options.clone());
        let pool = tokio::time::timeout(self.connect_timeout, pool)
            .await
            .map_err(|_| WarehouseError::Timeout(self.connect_timeout))??;
        Ok(Box::new(PgWarehouseConnection { pool, tx: None }))
    }
}

struct PgWarehouseConnection {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgWarehouseConnection {
    async fn run(
        &mut self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<PgQueryResult, WarehouseError> {
        let result = match self.tx.as_mut() {
            Some(tx) => query.execute(&mut **tx).await?,
            None => query.execute(&self.pool).await?,
        };
        Ok(result)
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, WarehouseError> {
        debug!(sql, "executing statement");
        let result = self.run(sqlx::query(sql)).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl WarehouseConnection for PgWarehouseConnection {
    async fn begin(&mut self) -> Result<(), WarehouseError> {
        if self.tx.is_some() {
            return Err(WarehouseError::Rejected(
                "transaction already in progress".to_string(),
            ));
        }
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), WarehouseError> {
        let tx = self.tx.take().ok_or(WarehouseError::NoTransaction)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), WarehouseError> {
        let tx = self.tx.take().ok_or(WarehouseError::NoTransaction)?;
        tx.rollback().await?;
        Ok(())
    }

    async fn ensure_table(&mut self, table: &TableSchema) -> Result<(), WarehouseError> {
        self.execute(&table.create_table_sql()).await?;
        self.execute(&table.comment_sql()).await?;
        Ok(())
    }

    async fn truncate(&mut self, table: &TableSchema) -> Result<(), WarehouseError> {
        self.execute(&table.truncate_sql()).await?;
        Ok(())
    }

    async fn insert_rows(&mut self, batch: &LoadBatch) -> Result<u64, WarehouseError> {
        let width = batch.columns().len();
        if width == 0 || batch.row_count() == 0 {
            return Ok(0);
        }

        let prefix = format!(
            "INSERT INTO {} ({}) ",
            batch.table.name,
            batch.table.column_names().join(", ")
        );
        let mut written = 0u64;

        for chunk in chunk_ranges(batch.row_count(), width) {
            let (start, end) = (chunk.start, chunk.end);
            let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(&prefix);
            builder.push_values(chunk, |mut row_values, row| {
                for col in 0..width {
                    match batch.cell(row, col) {
                        Cell::BigInt(v) => row_values.push_bind(v),
                        Cell::Double(v) => row_values.push_bind(v),
                        Cell::Text(v) => row_values.push_bind(v),
                        Cell::Timestamp(v) => row_values.push_bind(v),
                        Cell::Boolean(v) => row_values.push_bind(v),
                    };
                }
            });
            let result = self.run(builder.build()).await?;
            written += result.rows_affected();
            debug!(table = batch.table.name, start, end, "inserted chunk");
        }

        Ok(written)
    }

    async fn close(self: Box<Self>) -> Result<(), WarehouseError> {
        let mut this = *self;
        let rolled_back = match this.tx.take() {
            Some(tx) => tx.rollback().await.map_err(WarehouseError::from),
            None => Ok(()),
        };
        this.pool.close().await;
        rolled_back
    }
}

/// Splits `rows` into consecutive ranges small enough that `width` binds per row stay
/// within one statement's parameter limit.
fn chunk_ranges(rows: usize, width: usize) -> impl Iterator<Item = Range<usize>> {
    let chunk = (MAX_BIND_PARAMS / width.max(1)).max(1);
    (0..rows)
        .step_by(chunk)
        .map(move |start| start..(start + chunk).min(rows))
}
