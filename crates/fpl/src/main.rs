use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_table::Table;
use fpl_bucket::S3BucketStore;
use fpl_core::config::PipelineConfig;
use fpl_core::pipelines::{all_pipelines, find_pipeline, ProcessingPipeline};
use fpl_core::warehouse::PgWarehouse;
use fpl_core::{run_pipeline, RunOptions};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fantasy Premier League staging loader", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, transform and full-refresh load one or all staging tables
    Run(RunArgs),
    /// List the registered pipelines
    Pipelines,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(value_enum)]
    target: Target,
    /// Fetch and transform only; leave the warehouse untouched
    #[arg(long)]
    dry_run: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Gameweeks,
    Fixtures,
    All,
}

impl Target {
    fn pipelines(self) -> Result<Vec<&'static dyn ProcessingPipeline>> {
        let name = match self {
            Target::All => return Ok(all_pipelines().to_vec()),
            Target::Gameweeks => "gameweeks",
            Target::Fixtures => "fixtures",
        };
        let pipeline =
            find_pipeline(name).with_context(|| format!("no pipeline registered for {name}"))?;
        Ok(vec![pipeline])
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Pipelines => {
            print_pipelines();
            Ok(())
        }
        Command::Run(args) => run(args).await,
    }
}

fn print_pipelines() {
    let mut table = Table::new();
    table.set_header(vec!["code", "version", "bucket", "table", "description"]);
    for pipeline in all_pipelines() {
        table.add_row(vec![
            pipeline.code_identifier(),
            pipeline.version(),
            pipeline.source_bucket(),
            pipeline.table().name,
            pipeline.description(),
        ]);
    }
    println!("{table}");
}

async fn run(args: RunArgs) -> Result<()> {
    dotenvy::dotenv().ok();
    let config = PipelineConfig::from_env().context("failed to load configuration")?;
    let pipelines = args.target.pipelines()?;

    for pipeline in &pipelines {
        config
            .validate_destination(*pipeline)
            .with_context(|| format!("refusing to run {}", pipeline.code_identifier()))?;
    }

    let store = S3BucketStore::new(config.object_store.s3_config())
        .await
        .context("failed to build object store client")?;
    let warehouse = PgWarehouse::new(&config.postgres);
    let options = RunOptions {
        dry_run: args.dry_run,
    };

    let single = args.target != Target::All;
    let mut failures = 0usize;
    for pipeline in pipelines {
        match run_pipeline(pipeline, &store, &warehouse, options).await {
            Ok(report) => {
                info!(
                    pipeline = report.pipeline,
                    rows = report.transformed_rows,
                    "run finished"
                );
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Err(err) => {
                failures += 1;
                error!(
                    pipeline = pipeline.code_identifier(),
                    stage = %err.stage,
                    table = err.table,
                    error = %err.source,
                    "run failed"
                );
                if single {
                    return Err(anyhow::Error::new(err));
                }
            }
        }
    }

    if failures > 0 {
        bail!("{failures} pipeline run(s) failed");
    }
    Ok(())
}
