use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::config::{ConfigArgs, PipelineConfig};
use crate::fetch::{self, FetchOutcome};
use crate::store::{self, LoadReport};

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Upsert on the primary key instead of appending
    #[arg(short, long)]
    pub upsert: bool,

    /// Delete the database file before loading
    #[arg(short, long)]
    pub fresh: bool,
}

#[derive(Debug)]
pub struct PipelineReport {
    pub fetch: FetchOutcome,
    pub load: LoadReport,
}

pub async fn run_pipeline(config: &PipelineConfig) -> Result<PipelineReport> {
    let fetch = fetch::fetch_and_write(config).await?;

    let mut db = store::open_database(config)?;
    let load = store::load_tables(&mut db, config).context("Failed to create tables")?;
    db.close().context("Failed to close database")?;

    info!(
        "Done: {} DOIs, {} batches ({} failed), {} works, {} authorships",
        fetch.dois,
        fetch.batches,
        fetch.failures.len(),
        fetch.works.len(),
        fetch.authorships.len()
    );

    Ok(PipelineReport { fetch, load })
}

pub fn run(args: RunArgs) -> Result<()> {
    crate::init_tracing();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(args))
}

pub async fn run_async(args: RunArgs) -> Result<()> {
    let mut config = args.config.resolve()?;
    config.upsert |= args.upsert;
    config.fresh_db |= args.fresh;

    run_pipeline(&config).await?;
    Ok(())
}
