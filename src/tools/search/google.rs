use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{check_status, push_candidate, SourceAdapter};
use crate::core::errors::AdapterError;
use crate::rag::types::Candidate;

const NAME: &str = "google";
const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Google Custom Search JSON API.
pub struct GoogleAdapter {
    client: Client,
    endpoint: String,
    api_key: String,
    engine_id: String,
}

impl GoogleAdapter {
    pub fn new(client: Client, api_key: String, engine_id: String) -> Self {
        Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key,
            engine_id,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SourceAdapter for GoogleAdapter {
    fn name(&self) -> &str {
        NAME
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, AdapterError> {
        let num = limit.clamp(1, 10).to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
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
    let Some(items) = payload.get("items").and_then(|v| v.as_array()) else {
        return results;
    };

    for item in items {
        if results.len() >= limit {
            break;
        }
        let title = item.get("title").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("link").and_then(|v| v.as_str()).unwrap_or("");
        let snippet = item.get("snippet").and_then(|v| v.as_str()).unwrap_or("");
        push_candidate(&mut results, NAME, title, url, snippet);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_items_and_skips_untitled_entries() {
        let payload = json!({
            "items": [
                {"title": "Virtue ethics", "link": "https://plato.stanford.edu/entries/ethics-virtue/", "snippet": "Virtue ethics is..."},
                {"title": "", "link": "https://example.org/blank"},
                {"title": "Aristotle", "link": "https://iep.utm.edu/aristotle/"}
            ]
        });
        let results = parse_results(&payload, 10);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].adapter_name, "google");
        assert_eq!(results[1].url, "https://iep.utm.edu/aristotle/");
        assert_eq!(results[1].rank_within_adapter, 1);
    }

    #[test]
    fn missing_items_is_an_empty_result() {
        assert!(parse_results(&json!({"searchInformation": {}}), 5).is_empty());
    }
}
