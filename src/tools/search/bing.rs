use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{check_status, push_candidate, SourceAdapter};
use crate::core::errors::AdapterError;
use crate::rag::types::Candidate;

const NAME: &str = "bing";
const DEFAULT_ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/search";

pub struct BingAdapter {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl BingAdapter {
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
impl SourceAdapter for BingAdapter {
    fn name(&self) -> &str {
        NAME
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, AdapterError> {
        let count = limit.clamp(1, 50).to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("count", count.as_str())])
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
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
        .get("webPages")
        .and_then(|wp| wp.get("value"))
        .and_then(|v| v.as_array())
    else {
        return results;
    };

    for item in items {
        if results.len() >= limit {
            break;
        }
        let title = item.get("name").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("url").and_then(|v| v.as_str()).unwrap_or("");
        let snippet = item.get("snippet").and_then(|v| v.as_str()).unwrap_or("");
        push_candidate(&mut results, NAME, title, url, snippet);
    }

    results
}
