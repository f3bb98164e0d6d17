use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigArgs, PipelineConfig};
use crate::transform::{self, write_json_file};
use crate::{AuthorshipRecord, WorkRecord};

mod batch;
mod catalog;
mod client;
pub use batch::{generate_batches, split_dois, BatchParams, BatchRequest, BATCH_SIZE, DOI_DELIMITER};
pub use catalog::paginate;
pub use client::{BatchFailure, BatchOutcome, OpenAlexClient};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}: expected a JSON array")]
    UnexpectedShape(String),
    #[error("no DOIs in catalog data")]
    NoDois,
}

#[derive(Args)]
pub struct FetchArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Everything the fetch stage produced.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub catalog_records: usize,
    pub dois: usize,
    pub batches: usize,
    pub failures: Vec<BatchFailure>,
    pub works: Vec<WorkRecord>,
    pub authorships: Vec<AuthorshipRecord>,
    pub works_path: Option<PathBuf>,
    pub authorships_path: Option<PathBuf>,
}

/// Non-blank string values of `field`, in catalog order.
pub fn extract_dois(records: &[Value], field: &str) -> Vec<String> {
    records
        .iter()
        .filter_map(|record| record.get(field).and_then(Value::as_str))
        .map(str::trim)
        .filter(|doi| !doi.is_empty())
        .map(String::from)
        .collect()
}

/// Catalog → DOI batches → OpenAlex → flattened records. Writes nothing.
pub async fn fetch_records(config: &PipelineConfig) -> Result<FetchOutcome> {
    let client = OpenAlexClient::new(config.timeout_secs)?;

    let records = paginate(client.http(), &config.catalog_url)
        .await
        .with_context(|| format!("Failed to fetch catalog from {}", config.catalog_url))?;
    info!("Fetched {} catalog records", records.len());

    let mut dois = extract_dois(&records, &config.doi_field);
    if let Some(max) = config.max_dois {
        dois.truncate(max);
    }
    if dois.is_empty() {
        return Err(FetchError::NoDois.into());
    }

    let doi_list = dois.join(DOI_DELIMITER);
    let batches = generate_batches(&config.openalex_url, &doi_list, &config.mailto);
    info!(
        "Querying OpenAlex for {} DOIs in {} batches",
        dois.len(),
        batches.len()
    );

    let outcome = client.request_batches(&batches).await;
    if !outcome.failures.is_empty() {
        warn!(
            "{} of {} batches failed",
            outcome.failures.len(),
            batches.len()
        );
    }

    let works = transform::flatten_works(&outcome.responses)
        .context("Failed to flatten OpenAlex works")?;
    let authorships = transform::flatten_authorships(&outcome.responses)
        .context("Failed to flatten OpenAlex authorships")?;
    info!(
        "Flattened {} works and {} authorships",
        works.len(),
        authorships.len()
    );

    Ok(FetchOutcome {
        catalog_records: records.len(),
        dois: dois.len(),
        batches: batches.len(),
        failures: outcome.failures,
        works,
        authorships,
        works_path: None,
        authorships_path: None,
    })
}

/// [`fetch_records`], then write both record sets as JSON files.
pub async fn fetch_and_write(config: &PipelineConfig) -> Result<FetchOutcome> {
    let mut outcome = fetch_records(config).await?;

    let works_path = write_json_file(&outcome.works, &config.works_dir, &config.works_file)
        .context("Failed to write works file")?;
    let authorships_path = write_json_file(
        &outcome.authorships,
        &config.authorships_dir,
        &config.authorships_file,
    )
    .context("Failed to write authorships file")?;

    info!("Output: {}", works_path.display());
    info!("Output: {}", authorships_path.display());

    outcome.works_path = Some(works_path);
    outcome.authorships_path = Some(authorships_path);
    Ok(outcome)
}

pub fn run(args: FetchArgs) -> Result<()> {
    crate::init_tracing();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(args))
}

pub async fn run_async(args: FetchArgs) -> Result<()> {
    let config = args.config.resolve()?;
    fetch_and_write(&config).await?;
    Ok(())
}
