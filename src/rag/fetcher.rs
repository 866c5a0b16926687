//! Content fetcher: downloads candidate pages through a bounded worker pool
//! and reduces them to a single main-text passage.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use reqwest::{header, Client};
use tokio::sync::Semaphore;
use url::Url;

use super::extract::{extract_main_text, normalize_text, truncate_at_sentence};
use super::types::Candidate;
use crate::core::config::FetcherConfig;
use crate::core::errors::FetchError;

const MAX_REDIRECTS: usize = 5;

/// Main text recovered from a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub published_at: Option<DateTime<Utc>>,
    pub retrieved_at: DateTime<Utc>,
}

/// Shared across queries. The semaphore caps simultaneous outbound fetches
/// process-wide; a permit is held only while the download runs.
#[derive(Clone)]
pub struct ContentFetcher {
    client: Client,
    pool: Arc<Semaphore>,
    config: FetcherConfig,
}

impl ContentFetcher {
    pub fn new(config: &FetcherConfig, pool_size: usize) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|err| FetchError::failed("<client>", err))?;
        Ok(Self {
            client,
            pool: Arc::new(Semaphore::new(pool_size.max(1))),
            config: config.clone(),
        })
    }

    pub fn available_slots(&self) -> usize {
        self.pool.available_permits()
    }

    /// Fetches and extracts one candidate.
    ///
    /// `Ok(None)` means the page was reachable but too thin to use. Text the
    /// backend already supplied is used without a download.
    pub async fn fetch(
        &self,
        candidate: &Candidate,
        timeout: Duration,
    ) -> Result<Option<FetchedPage>, FetchError> {
        let retrieved_at = Utc::now();

        if let Some(content) = candidate.content.as_deref() {
            let text = normalize_text(content);
            return Ok(self.finish(candidate, None, text, candidate.published_at, retrieved_at));
        }

        let url = self.check_url(&candidate.url)?;

        let permit = self
            .pool
            .clone()
            .acquire_owned()
            .await
            .map_err(|err| FetchError::failed(&candidate.url, err))?;

        let body = tokio::time::timeout(timeout, self.download(url))
            .await
            .map_err(|_| FetchError::Timeout {
                url: candidate.url.clone(),
            })??;
        drop(permit);

        let (title, text, published_at) = match body {
            Body::Html(html) => {
                // HTML parsing is CPU-bound; keep it off the async workers.
                let page = tokio::task::spawn_blocking(move || extract_main_text(&html))
                    .await
                    .map_err(|err| FetchError::failed(&candidate.url, err))?;
                (page.title, page.text, page.published_at)
            }
            Body::Plain(plain) => (None, normalize_text(&plain), None),
        };
        let published_at = published_at.or(candidate.published_at);
        Ok(self.finish(candidate, title, text, published_at, retrieved_at))
    }

    fn finish(
        &self,
        candidate: &Candidate,
        title: Option<String>,
        text: String,
        published_at: Option<DateTime<Utc>>,
        retrieved_at: DateTime<Utc>,
    ) -> Option<FetchedPage> {
        let length = text.chars().count();
        if length < self.config.min_passage_chars {
            tracing::debug!(
                url = %candidate.url,
                chars = length,
                "Extracted text below minimum; discarding"
            );
            return None;
        }

        Some(FetchedPage {
            url: candidate.url.clone(),
            title: title.filter(|t| !t.is_empty()),
            text: truncate_at_sentence(&text, self.config.max_passage_chars),
            published_at,
            retrieved_at,
        })
    }

    fn check_url(&self, raw: &str) -> Result<Url, FetchError> {
        let url = Url::parse(raw).map_err(|err| FetchError::blocked(raw, err.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::blocked(
                raw,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        let lowered = raw.to_lowercase();
        if let Some(pattern) = self
            .config
            .url_denylist
            .iter()
            .find(|pattern| !pattern.is_empty() && lowered.contains(&pattern.to_lowercase()))
        {
            return Err(FetchError::blocked(raw, format!("matches denylist '{}'", pattern)));
        }
        Ok(url)
    }

    async fn download(&self, url: Url) -> Result<Body, FetchError> {
        let raw = url.to_string();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::failed(&raw, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::failed(&raw, format!("HTTP {}", status.as_u16())));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default();
        let is_plain = content_type.starts_with("text/plain");
        if !(content_type.is_empty()
            || is_plain
            || content_type.contains("html")
            || content_type.contains("xhtml"))
        {
            return Err(FetchError::failed(
                &raw,
                format!("unsupported content type '{}'", content_type),
            ));
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| FetchError::failed(&raw, err))?;
            let room = self.config.max_bytes.saturating_sub(bytes.len());
            if chunk.len() >= room {
                bytes.extend_from_slice(&chunk[..room]);
                tracing::debug!(url = %raw, max_bytes = self.config.max_bytes, "Response truncated");
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        let text = String::from_utf8_lossy(&bytes).into_owned();
        Ok(if is_plain {
            Body::Plain(text)
        } else {
            Body::Html(text)
        })
    }
}

enum Body {
    Html(String),
    Plain(String),
}
