use serde::{Deserialize, Serialize};
use urlencoding::encode;

/// OpenAlex accepts at most 50 values in one `doi:` filter.
pub const BATCH_SIZE: usize = 50;
pub const DOI_DELIMITER: &str = "|";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchParams {
    pub filter: String,
    pub page: u32,
    #[serde(rename = "per-page")]
    pub per_page: usize,
    pub mailto: String,
}

impl BatchParams {
    /// Percent-encoded `key=value` pairs in request order.
    pub fn to_query_string(&self) -> String {
        format!(
            "filter={}&page={}&per-page={}&mailto={}",
            encode(&self.filter),
            self.page,
            self.per_page,
            encode(&self.mailto)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub batch_number: usize,
    pub doi_count: usize,
    pub dois: Vec<String>,
    pub url: String,
    pub params: BatchParams,
}

pub fn split_dois(doi_list: &str) -> Vec<String> {
    doi_list
        .split(DOI_DELIMITER)
        .map(str::trim)
        .filter(|doi| !doi.is_empty())
        .map(String::from)
        .collect()
}

/// Build one request per group of up to [`BATCH_SIZE`] DOIs.
///
/// `doi_list` is a `|`-delimited string; blank entries are ignored, so an
/// empty or blank-only string yields no batches.
pub fn generate_batches(base_url: &str, doi_list: &str, mailto: &str) -> Vec<BatchRequest> {
    let dois = split_dois(doi_list);

    dois.chunks(BATCH_SIZE)
        .enumerate()
        .map(|(idx, chunk)| {
            let params = BatchParams {
                filter: format!("doi:{}", chunk.join(DOI_DELIMITER)),
                page: 1,
                per_page: BATCH_SIZE,
                mailto: mailto.to_string(),
            };
            let url = format!("{}?{}", base_url, params.to_query_string());

            BatchRequest {
                batch_number: idx + 1,
                doi_count: chunk.len(),
                dois: chunk.to_vec(),
                url,
                params,
            }
        })
        .collect()
}
