use serde::{Deserialize, Serialize};

pub mod config;
pub mod fetch;
pub mod pipeline;
pub mod store;
pub mod transform;

/// Install the global fmt subscriber. Safe to call more than once.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("openalex_loader=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .ok();
}

/// One OpenAlex work, flattened for the works table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkRecord {
    pub id: String,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub source: Option<String>,
    pub is_oa: Option<bool>,
}

/// One authorship entry of a work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorshipRecord {
    pub id: String,
    pub author: Option<String>,
    pub orcid: Option<String>,
}
