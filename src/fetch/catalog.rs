use reqwest::header::{HeaderMap, LINK};
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::debug;

use super::FetchError;

/// Fetch every page of a catalog listing, following `Link: <...>; rel="next"`.
pub async fn paginate(client: &Client, url: &str) -> Result<Vec<Value>, FetchError> {
    let mut items = Vec::new();
    let mut next = Some(url.to_string());

    while let Some(current) = next.take() {
        debug!("GET {}", current);
        let response = client.get(&current).send().await?.error_for_status()?;
        next = next_link(response.headers(), &current);

        match response.json::<Value>().await? {
            Value::Array(page) => items.extend(page),
            _ => return Err(FetchError::UnexpectedShape(current)),
        }
    }

    Ok(items)
}

/// Target of the `rel="next"` entry, resolved against the page URL. Any
/// malformed header ends pagination.
fn next_link(headers: &HeaderMap, current: &str) -> Option<String> {
    let value = headers.get(LINK)?.to_str().ok()?;

    let target = value.split('<').skip(1).find_map(|entry| {
        let (target, params) = entry.split_once('>')?;
        let is_next = params.split(';').any(|param| {
            param
                .trim()
                .trim_end_matches(',')
                .trim()
                .strip_prefix("rel=")
                .map(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"))
                .unwrap_or(false)
        });
        is_next.then_some(target)
    })?;

    Url::parse(current)
        .ok()?
        .join(target.trim())
        .ok()
        .map(String::from)
}
