use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{check_status, push_candidate, SourceAdapter};
use crate::core::errors::AdapterError;
use crate::rag::types::Candidate;
use crate::tools::dates::parse_published;

const NAME: &str = "brave";
const DEFAULT_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

pub struct BraveAdapter {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl BraveAdapter {
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
impl SourceAdapter for BraveAdapter {
    fn name(&self) -> &str {
        NAME
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, AdapterError> {
        let count = limit.clamp(1, 20).to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("count", count.as_str())])
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
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
    let Some(items) = payload
        .get("web")
        .and_then(|w| w.get("results"))
        .and_then(|v| v.as_array())
    else {
        return results;
    };

    for item in items {
        if results.len() >= limit {
            break;
        }
        let title = item.get("title").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("url").and_then(|v| v.as_str()).unwrap_or("");
        let snippet = item
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if let Some(rank) = push_candidate(&mut results, NAME, title, url, snippet) {
            results[rank].published_at = item
                .get("page_age")
                .and_then(|v| v.as_str())
                .and_then(parse_published);
        }
    }

    results
}
