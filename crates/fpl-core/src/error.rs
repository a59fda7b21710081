// crates/fpl-core/src/error.rs

use std::fmt;

use fpl_bucket::BucketError;
use serde::Serialize;
use thiserror::Error;

use crate::loader::LoadState;
use crate::warehouse::WarehouseError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("fetch from bucket '{bucket}' failed: {reason}")]
    Fetch { bucket: String, reason: String },

    #[error("object store error: {0}")]
    Bucket(#[from] BucketError),

    #[error("CSV parsing error in '{object}': {source}")]
    Csv {
        object: String,
        #[source]
        source: csv::Error,
    },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("column '{column}' row {row}: cannot coerce {value:?} to {target}")]
    TypeCoercion {
        column: String,
        row: usize,
        value: String,
        target: &'static str,
    },

    #[error("load into '{table}' failed while entering {state}: {source}")]
    Load {
        table: String,
        state: LoadState,
        #[source]
        source: WarehouseError,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Transform,
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Transform => "transform",
            Stage::Load => "load",
        };
        f.write_str(name)
    }
}

/// A [`PipelineError`] tagged with the stage and destination table it surfaced from.
#[derive(Error, Debug)]
#[error("{stage} stage failed for table '{table}'")]
pub struct RunError {
    pub stage: Stage,
    pub table: &'static str,
    #[source]
    pub source: PipelineError,
}

impl RunError {
    pub fn new(stage: Stage, table: &'static str, source: PipelineError) -> Self {
        Self {
            stage,
            table,
            source,
        }
    }
}
