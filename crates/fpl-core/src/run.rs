use fpl_bucket::{fetch_all, BucketStore};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::enforce::enforce_schema;
use crate::error::{PipelineError, RunError, Stage};
use crate::ingestion::{ingest_objects, ObjectReport};
use crate::loader::{load_full_refresh, LoadReport, LoadState};
use crate::opponents::OpponentSummary;
use crate::pipelines::ProcessingPipeline;
use crate::warehouse::Warehouse;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Fetch and transform only; nothing is written.
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub pipeline: &'static str,
    pub version: &'static str,
    pub table: &'static str,
    pub objects: Vec<ObjectReport>,
    pub raw_rows: usize,
    pub transformed_rows: usize,
    pub opponents: Option<OpponentSummary>,
    pub states: Vec<LoadState>,
    pub load: Option<LoadReport>,
}

/// Runs one pipeline end to end: fetch every object from its bucket, transform, then
/// replace the destination table's contents.
pub async fn run_pipeline(
    pipeline: &dyn ProcessingPipeline,
    store: &dyn BucketStore,
    warehouse: &dyn Warehouse,
    options: RunOptions,
) -> Result<RunReport, RunError> {
    let run_id = Uuid::new_v4();
    let table = pipeline.table();
    let bucket = pipeline.source_bucket();
    let fail = |stage: Stage| move |source: PipelineError| RunError::new(stage, table.name, source);

    info!(
        %run_id,
        pipeline = pipeline.code_identifier(),
        bucket,
        table = table.name,
        dry_run = options.dry_run,
        "starting run"
    );

    let objects = fetch_all(store, bucket)
        .await
        .map_err(PipelineError::from)
        .map_err(fail(Stage::Fetch))?;
    let batch = ingest_objects(bucket, &objects).map_err(fail(Stage::Fetch))?;
    let mut states = vec![LoadState::Fetched];

    let output = pipeline.transform(&batch.raw).map_err(fail(Stage::Transform))?;
    let load_batch = enforce_schema(&output.frame, table).map_err(fail(Stage::Transform))?;
    states.push(LoadState::Transformed);
    info!(%run_id, rows = load_batch.row_count(), "transformed batch ready");

    let load = if options.dry_run {
        info!(%run_id, table = table.name, "dry run; skipping load");
        None
    } else {
        let report = load_full_refresh(warehouse, &load_batch)
            .await
            .map_err(fail(Stage::Load))?;
        states.extend(report.states.iter().skip(1).copied());
        Some(report)
    };

    Ok(RunReport {
        run_id,
        pipeline: pipeline.code_identifier(),
        version: pipeline.version(),
        table: table.name,
        raw_rows: batch.raw.height(),
        transformed_rows: load_batch.row_count(),
        objects: batch.reports,
        opponents: output.opponents,
        states,
        load,
    })
}
