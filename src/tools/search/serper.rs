use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{check_status, push_candidate, SourceAdapter};
use crate::core::errors::AdapterError;
use crate::rag::types::Candidate;
use crate::tools::dates::parse_published;

const NAME: &str = "serper";
const DEFAULT_ENDPOINT: &str = "https://google.serper.dev/search";

/// Google results through serper.dev.
pub struct SerperAdapter {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl SerperAdapter {
    pub fn new(client: Client, api_key: String) -> Self {
        Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SourceAdapter for SerperAdapter {
    fn name(&self) -> &str {
        NAME
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, AdapterError> {
        let body = json!({
            "q": query,
            "num": limit.max(1),
            "hl": "en",
            "gl": "us",
        });
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| AdapterError::from_reqwest(NAME, err))?;
        check_status(NAME, &response)?;

        let payload: Value = response
            .json()
            .await
            .map_err(|err| AdapterError::malformed(NAME, err))?;
        Ok(parse_results(&payload, limit))
    }
}

fn parse_results(payload: &Value, limit: usize) -> Vec<Candidate> {
    let mut results = Vec::new();
    let Some(items) = payload.get("organic").and_then(|v| v.as_array()) else {
        return results;
    };

    for item in items {
        if results.len() >= limit {
            break;
        }
        let title = item.get("title").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("link").and_then(|v| v.as_str()).unwrap_or("");
        let snippet = item.get("snippet").and_then(|v| v.as_str()).unwrap_or("");
        if let Some(rank) = push_candidate(&mut results, NAME, title, url, snippet) {
            results[rank].published_at = item
                .get("date")
                .and_then(|v| v.as_str())
                .and_then(parse_published);
        }
    }

    results
}
