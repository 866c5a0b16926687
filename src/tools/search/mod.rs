//! Source adapters: one per web search backend.

mod bing;
mod brave;
mod duckduckgo;
mod google;
mod reddit;
mod serper;
mod site;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use crate::core::config::SearchConfig;
use crate::core::errors::AdapterError;
use crate::rag::types::{AuthorityTier, Candidate};

pub use bing::BingAdapter;
pub use brave::BraveAdapter;
pub use duckduckgo::DuckDuckGoAdapter;
pub use google::GoogleAdapter;
pub use reddit::RedditAdapter;
pub use serper::SerperAdapter;
pub use site::{ModernTopicGate, SiteRestrictedAdapter};

pub const KNOWN_ADAPTERS: [&str; 9] = [
    "duckduckgo",
    "google",
    "serper",
    "brave",
    "bing",
    "reddit",
    "academic",
    "forums",
    "news",
];

/// A web search backend.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Tier for results whose host is not in any configured domain list.
    fn default_tier(&self) -> AuthorityTier {
        AuthorityTier::Unranked
    }

    /// Every returned candidate carries this adapter's name and a 0-based
    /// rank.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, AdapterError>;
}

pub type SharedAdapter = Arc<dyn SourceAdapter>;

/// Turns a transient failure into an empty result so one flaky upstream
/// does not sink a composite search.
pub fn skip_transient(
    result: Result<Vec<Candidate>, AdapterError>,
) -> Result<Vec<Candidate>, AdapterError> {
    match result {
        Err(err) if err.is_transient() => {
            tracing::warn!("Skipping transient search failure: {}", err);
            Ok(Vec::new())
        }
        other => other,
    }
}

/// Appends a candidate ranked after those already collected. Entries
/// without a title or URL are dropped.
pub(crate) fn push_candidate(
    results: &mut Vec<Candidate>,
    adapter: &str,
    title: &str,
    url: &str,
    snippet: &str,
) -> Option<usize> {
    let title = title.trim();
    let url = url.trim();
    if title.is_empty() || url.is_empty() {
        return None;
    }
    let rank = results.len();
    results.push(Candidate::new(adapter, rank, url, title, snippet.trim()));
    Some(rank)
}

pub(crate) fn check_status(
    adapter: &str,
    response: &reqwest::Response,
) -> Result<(), AdapterError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(AdapterError::http(adapter, status.as_u16()))
    }
}

/// The enabled adapters, in configured order.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Vec<SharedAdapter>,
}

impl AdapterRegistry {
    pub fn new(adapters: Vec<SharedAdapter>) -> Self {
        Self { adapters }
    }

    /// Builds every adapter named in the config. Adapters missing their
    /// credentials are logged and left out.
    pub fn from_config(config: &SearchConfig) -> Self {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!("Falling back to default HTTP client: {}", err);
                Client::new()
            });

        let mut adapters = Vec::new();
        for name in &config.search_order() {
            match build_adapter(name, config, &client) {
                Ok(adapter) => adapters.push(adapter),
                Err(err) => tracing::warn!("Search adapter '{}' disabled: {}", name, err),
            }
        }
        tracing::info!(
            adapters = ?adapters.iter().map(|a| a.name().to_string()).collect::<Vec<_>>(),
            "Search adapters ready"
        );
        Self { adapters }
    }

    pub fn adapters(&self) -> &[SharedAdapter] {
        &self.adapters
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

fn build_adapter(
    name: &str,
    config: &SearchConfig,
    client: &Client,
) -> Result<SharedAdapter, AdapterError> {
    let adapter: SharedAdapter = match name {
        "duckduckgo" => Arc::new(DuckDuckGoAdapter::new(client.clone())),
        "google" => {
            let api_key = required(name, &config.google_search_api_key, "google_search_api_key")?;
            let engine_id =
                required(name, &config.google_search_engine_id, "google_search_engine_id")?;
            Arc::new(GoogleAdapter::new(client.clone(), api_key, engine_id))
        }
        "serper" => {
            let api_key = required(name, &config.serper_api_key, "serper_api_key")?;
            Arc::new(SerperAdapter::new(client.clone(), api_key))
        }
        "brave" => {
            let api_key = required(name, &config.brave_search_api_key, "brave_search_api_key")?;
            Arc::new(BraveAdapter::new(client.clone(), api_key))
        }
        "bing" => {
            let api_key = required(name, &config.bing_search_api_key, "bing_search_api_key")?;
            Arc::new(BingAdapter::new(client.clone(), api_key))
        }
        "reddit" => Arc::new(RedditAdapter::new(client.clone(), &config.reddit)),
        "academic" => Arc::new(SiteRestrictedAdapter::new(
            "academic",
            config.academic_sites.clone(),
            site_engine(client),
            AuthorityTier::Academic,
        )),
        "forums" => Arc::new(SiteRestrictedAdapter::new(
            "forums",
            config.forum_sites.clone(),
            site_engine(client),
            AuthorityTier::Forum,
        )),
        "news" => Arc::new(
            SiteRestrictedAdapter::new(
                "news",
                config.news_sites.clone(),
                site_engine(client),
                AuthorityTier::Editorial,
            )
            .with_gate(ModernTopicGate::new(config.modern_topic_keywords.clone())),
        ),
        other => {
            return Err(AdapterError::not_configured(other, "unknown adapter"));
        }
    };
    Ok(adapter)
}

fn site_engine(client: &Client) -> SharedAdapter {
    Arc::new(DuckDuckGoAdapter::new(client.clone()))
}

fn required(adapter: &str, value: &Option<String>, field: &str) -> Result<String, AdapterError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AdapterError::not_configured(adapter, format!("missing {}", field)))
}
