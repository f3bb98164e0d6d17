use serde_json::Value;
use thiserror::Error;

use crate::{AuthorshipRecord, WorkRecord};

mod output;
pub use output::{read_json_file, write_json_file};

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("response {response}: `results` is not an array")]
    ResultsNotArray { response: usize },
    #[error("response {response}, result {result}: missing string field `{field}`")]
    MissingField {
        response: usize,
        result: usize,
        field: &'static str,
    },
}

fn string_at(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(Value::as_str).map(String::from)
}

fn results(response: &Value, idx: usize) -> Result<&[Value], TransformError> {
    match response.get("results") {
        Some(Value::Array(items)) => Ok(items.as_slice()),
        None | Some(Value::Null) => Ok(&[]),
        Some(_) => Err(TransformError::ResultsNotArray { response: idx }),
    }
}

fn work_id(item: &Value, response: usize, result: usize) -> Result<String, TransformError> {
    string_at(item, "/id").ok_or(TransformError::MissingField {
        response,
        result,
        field: "id",
    })
}

/// One [`WorkRecord`] per result item.
///
/// Source and open-access flag come from `primary_location`; when it, its
/// `source` or the flag is absent the field is `None`.
pub fn flatten_works(responses: &[Value]) -> Result<Vec<WorkRecord>, TransformError> {
    let mut works = Vec::new();

    for (response_idx, response) in responses.iter().enumerate() {
        for (result_idx, item) in results(response, response_idx)?.iter().enumerate() {
            works.push(WorkRecord {
                id: work_id(item, response_idx, result_idx)?,
                doi: string_at(item, "/doi"),
                title: string_at(item, "/title"),
                source: string_at(item, "/primary_location/source/display_name"),
                is_oa: item
                    .pointer("/primary_location/is_oa")
                    .and_then(Value::as_bool),
            });
        }
    }

    Ok(works)
}

/// One [`AuthorshipRecord`] per authorship entry, keyed by the work id.
pub fn flatten_authorships(responses: &[Value]) -> Result<Vec<AuthorshipRecord>, TransformError> {
    let mut authorships = Vec::new();

    for (response_idx, response) in responses.iter().enumerate() {
        for (result_idx, item) in results(response, response_idx)?.iter().enumerate() {
            let entries = match item.get("authorships") {
                Some(Value::Array(arr)) => arr,
                _ => continue,
            };
            let id = work_id(item, response_idx, result_idx)?;

            for entry in entries {
                authorships.push(AuthorshipRecord {
                    id: id.clone(),
                    author: string_at(entry, "/author/display_name"),
                    orcid: string_at(entry, "/author/orcid"),
                });
            }
        }
    }

    Ok(authorships)
}
