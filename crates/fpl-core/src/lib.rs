pub mod columns;
pub mod config;
pub mod dedupe;
pub mod enforce;
pub mod error;
pub mod ingestion;
pub mod loader;
pub mod normalize;
pub mod opponents;
pub mod pipelines;
pub mod run;
pub mod schema;
pub mod season;
pub mod warehouse;

pub use error::{PipelineError, Result, RunError, Stage};
pub use run::{run_pipeline, RunOptions, RunReport};
