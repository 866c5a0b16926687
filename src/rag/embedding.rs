use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::core::config::EmbeddingConfig;
use crate::core::errors::EmbedError;

/// Text-to-vector capability. Every vector an embedder returns has the same
/// dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbedError::CountMismatch {
                sent: 1,
                received: vectors.len(),
            });
        }
        vectors.pop().ok_or(EmbedError::CountMismatch {
            sent: 1,
            received: 0,
        })
    }
}

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint.
#[derive(Clone)]
pub struct HttpEmbedder {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EmbedError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(EmbedError::request)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            client,
        })
    }

    /// `None` when no endpoint is configured.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Option<Self>, EmbedError> {
        let Some(endpoint) = config
            .endpoint
            .as_deref()
            .filter(|endpoint| !endpoint.trim().is_empty())
        else {
            return Ok(None);
        };
        Self::new(
            endpoint,
            config.model.clone(),
            config.api_key.clone(),
            Duration::from_millis(config.timeout_ms),
        )
        .map(Some)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await.map_err(|err| {
            if err.is_timeout() {
                EmbedError::Timeout
            } else {
                EmbedError::request(err)
            }
        })?;
        if !res.status().is_success() {
            return Err(EmbedError::Request(format!(
                "embedding endpoint returned {}",
                res.status()
            )));
        }

        let payload: EmbeddingResponse = res
            .json()
            .await
            .map_err(|err| EmbedError::Malformed(err.to_string()))?;

        let mut items = payload.data;
        if items.len() != inputs.len() {
            return Err(EmbedError::CountMismatch {
                sent: inputs.len(),
                received: items.len(),
            });
        }
        if items.iter().all(|item| item.index.is_some()) {
            items.sort_by_key(|item| item.index);
        }

        let vectors: Vec<Vec<f32>> = items.into_iter().map(|item| item.embedding).collect();
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 || vectors.iter().any(|v| v.len() != dimension) {
            return Err(EmbedError::Malformed(
                "embeddings have inconsistent dimensions".to_string(),
            ));
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::test_support::{serve, Route};

    #[tokio::test]
    async fn http_embedder_orders_items_by_index() {
        let server = serve(vec![Route::json(
            "/v1/embeddings",
            r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#,
        )])
        .await;
        let embedder =
            HttpEmbedder::new(&server.url(""), "m", None, Duration::from_secs(2)).expect("client");

        let vectors = embedder
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .expect("embed");
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn http_embedder_rejects_count_mismatch() {
        let server = serve(vec![Route::json(
            "/v1/embeddings",
            r#"{"data":[{"embedding":[1.0,0.0]}]}"#,
        )])
        .await;
        let embedder =
            HttpEmbedder::new(&server.url(""), "m", None, Duration::from_secs(2)).expect("client");

        let err = embedder
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .expect_err("mismatch");
        assert!(matches!(
            err,
            EmbedError::CountMismatch {
                sent: 2,
                received: 1
            }
        ));
    }

    #[tokio::test]
    async fn http_embedder_maps_error_status() {
        let server = serve(vec![Route::status("/v1/embeddings", 503)]).await;
        let embedder =
            HttpEmbedder::new(&server.url(""), "m", None, Duration::from_secs(2)).expect("client");

        assert!(matches!(
            embedder.embed("a").await,
            Err(EmbedError::Request(_))
        ));
    }

    #[test]
    fn missing_endpoint_means_no_embedder() {
        let config = EmbeddingConfig::default();
        assert!(HttpEmbedder::from_config(&config).expect("config").is_none());
    }
}
