use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDateTime;

use super::{Warehouse, WarehouseConnection, WarehouseError};
use crate::enforce::{Cell, LoadBatch};
use crate::schema::TableSchema;

/// An owned copy of a stored cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    BigInt(Option<i64>),
    Double(Option<f64>),
    Text(Option<String>),
    Timestamp(Option<NaiveDateTime>),
    Boolean(Option<bool>),
}

impl From<Cell<'_>> for Value {
    fn from(cell: Cell<'_>) -> Self {
        match cell {
            Cell::BigInt(v) => Value::BigInt(v),
            Cell::Double(v) => Value::Double(v),
            Cell::Text(v) => Value::Text(v.map(str::to_string)),
            Cell::Timestamp(v) => Value::Timestamp(v),
            Cell::Boolean(v) => Value::Boolean(v),
        }
    }
}

/// Where an injected failure fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    Connect,
    EnsureTable,
    Truncate,
    Insert,
    Commit,
    Close,
}

#[derive(Debug)]
struct MemoryTable {
    version: u32,
    columns: Vec<&'static str>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    fail_at: Option<FailurePoint>,
    open_connections: usize,
    connections_opened: usize,
}

impl MemoryState {
    fn check(&self, point: FailurePoint) -> Result<(), WarehouseError> {
        if self.fail_at == Some(point) {
            return Err(WarehouseError::Rejected(format!(
                "injected failure at {point:?}"
            )));
        }
        Ok(())
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable, WarehouseError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| WarehouseError::MissingTable(name.to_string()))
    }

    fn apply(&mut self, op: PendingOp) -> Result<(), WarehouseError> {
        match op {
            PendingOp::Truncate(name) => self.table_mut(&name)?.rows.clear(),
            PendingOp::Insert(name, rows) => self.table_mut(&name)?.rows.extend(rows),
        }
        Ok(())
    }
}

#[derive(Debug)]
enum PendingOp {
    Truncate(String),
    Insert(String, Vec<Vec<Value>>),
}

/// Warehouse kept in process memory, with optional failure injection. Clones share
/// the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        lock_state(&self.state)
    }

    pub fn fail_at(&self, point: Option<FailurePoint>) {
        self.lock().fail_at = point;
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.lock().tables.contains_key(table)
    }

    pub fn schema_version(&self, table: &str) -> Option<u32> {
        self.lock().tables.get(table).map(|t| t.version)
    }

    pub fn columns(&self, table: &str) -> Option<Vec<&'static str>> {
        self.lock().tables.get(table).map(|t| t.columns.clone())
    }

    /// Committed rows of `table`.
    pub fn rows(&self, table: &str) -> Option<Vec<Vec<Value>>> {
        self.lock().tables.get(table).map(|t| t.rows.clone())
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.lock().tables.get(table).map(|t| t.rows.len())
    }

    pub fn open_connections(&self) -> usize {
        self.lock().open_connections
    }

    pub fn connections_opened(&self) -> usize {
        self.lock().connections_opened
    }
}

fn lock_state(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|err| err.into_inner())
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn connect(&self) -> Result<Box<dyn WarehouseConnection>, WarehouseError> {
        let mut state = self.lock();
        state.check(FailurePoint::Connect)?;
        state.open_connections += 1;
        state.connections_opened += 1;
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            pending: None,
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
    pending: Option<Vec<PendingOp>>,
}

impl MemoryConnection {
    fn submit(&mut self, op: PendingOp) -> Result<(), WarehouseError> {
        let mut state = lock_state(&self.state);
        match op {
            PendingOp::Truncate(ref name) | PendingOp::Insert(ref name, _) => {
                state.table_mut(name)?;
            }
        }
        match self.pending.as_mut() {
            Some(pending) => pending.push(op),
            None => state.apply(op)?,
        }
        Ok(())
    }
}

#[async_trait]
impl WarehouseConnection for MemoryConnection {
    async fn begin(&mut self) -> Result<(), WarehouseError> {
        if self.pending.is_some() {
            return Err(WarehouseError::Rejected(
                "transaction already in progress".to_string(),
            ));
        }
        self.pending = Some(Vec::new());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), WarehouseError> {
        let ops = self.pending.take().ok_or(WarehouseError::NoTransaction)?;
        let mut state = lock_state(&self.state);
        state.check(FailurePoint::Commit)?;
        for op in ops {
            state.apply(op)?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), WarehouseError> {
        self.pending.take().ok_or(WarehouseError::NoTransaction)?;
        Ok(())
    }

    async fn ensure_table(&mut self, table: &TableSchema) -> Result<(), WarehouseError> {
        let mut state = lock_state(&self.state);
        state.check(FailurePoint::EnsureTable)?;
        state
            .tables
            .entry(table.name.to_string())
            .or_insert_with(|| MemoryTable {
                version: table.version,
                columns: table.column_names(),
                rows: Vec::new(),
            });
        Ok(())
    }

    async fn truncate(&mut self, table: &TableSchema) -> Result<(), WarehouseError> {
        lock_state(&self.state).check(FailurePoint::Truncate)?;
        self.submit(PendingOp::Truncate(table.name.to_string()))
    }

    async fn insert_rows(&mut self, batch: &LoadBatch) -> Result<u64, WarehouseError> {
        lock_state(&self.state).check(FailurePoint::Insert)?;
        let rows: Vec<Vec<Value>> = (0..batch.row_count())
            .map(|idx| batch.row(idx).into_iter().map(Value::from).collect())
            .collect();
        let written = rows.len() as u64;
        self.submit(PendingOp::Insert(batch.table.name.to_string(), rows))?;
        Ok(written)
    }

    async fn close(self: Box<Self>) -> Result<(), WarehouseError> {
        let mut state = lock_state(&self.state);
        // The connection is released even when closing reports an error.
        state.open_connections = state.open_connections.saturating_sub(1);
        state.check(FailurePoint::Close)
    }
}
