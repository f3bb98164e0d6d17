use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use super::batch::BatchRequest;
use super::FetchError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub batch_number: usize,
    pub doi_count: usize,
    pub error: String,
}

/// Responses kept from a batch run, plus the batches that failed.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub responses: Vec<Value>,
    pub failures: Vec<BatchFailure>,
}

pub struct OpenAlexClient {
    client: Client,
}

impl OpenAlexClient {
    pub fn new(timeout_secs: u64) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self { client })
    }

    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Returns the parsed body, `Ok(None)` when it has no `results` field.
    pub async fn request_batch(&self, batch: &BatchRequest) -> Result<Option<Value>, FetchError> {
        let response = self
            .client
            .get(&batch.url)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;

        if body.get("results").is_some() {
            Ok(Some(body))
        } else {
            Ok(None)
        }
    }

    /// Issue every batch in order. A failed batch is logged and skipped.
    pub async fn request_batches(&self, batches: &[BatchRequest]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        let pb = ProgressBar::new(batches.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        for batch in batches {
            match self.request_batch(batch).await {
                Ok(Some(body)) => outcome.responses.push(body),
                Ok(None) => debug!("Batch {} returned no results field", batch.batch_number),
                Err(e) => {
                    error!("API request for batch {} failed: {}", batch.batch_number, e);
                    outcome.failures.push(BatchFailure {
                        batch_number: batch.batch_number,
                        doi_count: batch.doi_count,
                        error: e.to_string(),
                    });
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        outcome
    }
}
