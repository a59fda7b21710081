//! Connection seam to the relational warehouse.

use async_trait::async_trait;
use thiserror::Error;

use crate::enforce::LoadBatch;
use crate::schema::TableSchema;

pub mod memory;
pub mod postgres;

pub use memory::{FailurePoint, MemoryWarehouse, Value};
pub use postgres::PgWarehouse;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("table '{0}' does not exist")]
    MissingTable(String),
    #[error("no transaction is open")]
    NoTransaction,
    #[error("statement rejected: {0}")]
    Rejected(String),
}

/// Opens connections to the destination store.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn WarehouseConnection>, WarehouseError>;
}

/// One exclusively owned connection. Outside an explicit transaction each call
/// commits on its own.
#[async_trait]
pub trait WarehouseConnection: Send {
    async fn begin(&mut self) -> Result<(), WarehouseError>;
    async fn commit(&mut self) -> Result<(), WarehouseError>;
    async fn rollback(&mut self) -> Result<(), WarehouseError>;

    /// Creates the table from its fixed schema if it does not exist yet.
    async fn ensure_table(&mut self, table: &TableSchema) -> Result<(), WarehouseError>;
    async fn truncate(&mut self, table: &TableSchema) -> Result<(), WarehouseError>;
    /// Appends every row of `batch` to `batch.table`, returning the number written.
    async fn insert_rows(&mut self, batch: &LoadBatch) -> Result<u64, WarehouseError>;

    /// Releases the connection. An open transaction is rolled back.
    async fn close(self: Box<Self>) -> Result<(), WarehouseError>;
}
