use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;

use super::{check_status, SourceAdapter};
use crate::core::config::RedditConfig;
use crate::core::errors::AdapterError;
use crate::rag::types::{AuthorityTier, Candidate};
use crate::tools::dates::from_unix_seconds;

const NAME: &str = "reddit";
const DEFAULT_BASE_URL: &str = "https://www.reddit.com";
const SNIPPET_CHARS: usize = 500;

/// Subreddit search over Reddit's public JSON listing.
///
/// All configured subreddits go into one multi-subreddit request. Requests
/// are spaced process-wide by a rate limiter.
pub struct RedditAdapter {
    client: Client,
    base_url: String,
    subreddits: Vec<String>,
    per_subreddit_limit: usize,
    limiter: Option<DefaultDirectRateLimiter>,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Deserialize)]
struct Child {
    data: Post,
}

#[derive(Deserialize)]
struct Post {
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    created_utc: Option<f64>,
}

impl RedditAdapter {
    pub fn new(client: Client, config: &RedditConfig) -> Self {
        let limiter = Quota::with_period(Duration::from_millis(config.min_interval_ms))
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            subreddits: config.subreddits.clone(),
            per_subreddit_limit: config.per_subreddit_limit.max(1),
            limiter,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn search_url(&self) -> String {
        let subreddits: Vec<String> = self
            .subreddits
            .iter()
            .map(|name| urlencoding::encode(name.trim()).into_owned())
            .collect();
        format!("{}/r/{}/search.json", self.base_url, subreddits.join("+"))
    }
}

#[async_trait]
impl SourceAdapter for RedditAdapter {
    fn name(&self) -> &str {
        NAME
    }

    fn default_tier(&self) -> AuthorityTier {
        AuthorityTier::Forum
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, AdapterError> {
        if self.subreddits.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let request_limit = (self.per_subreddit_limit * self.subreddits.len())
            .min(limit.max(1))
            .to_string();
        let response = self
            .client
            .get(self.search_url())
            .query(&[
                ("q", query),
                ("restrict_sr", "on"),
                ("sort", "relevance"),
                ("limit", request_limit.as_str()),
            ])
            .send()
            .await
            .map_err(|err| AdapterError::from_reqwest(NAME, err))?;
        check_status(NAME, &response)?;

        let listing: Listing = response
            .json()
            .await
            .map_err(|err| AdapterError::malformed(NAME, err))?;
        Ok(to_candidates(listing, limit))
    }
}

fn to_candidates(listing: Listing, limit: usize) -> Vec<Candidate> {
    let mut results = Vec::new();
    for child in listing.data.children {
        if results.len() >= limit {
            break;
        }
        let post = child.data;
        if post.permalink.is_empty() || (post.title.is_empty() && post.selftext.is_empty()) {
            continue;
        }

        let url = format!("https://www.reddit.com{}", post.permalink);
        let mut candidate = Candidate::new(
            NAME,
            results.len(),
            url,
            post.title.trim(),
            preview(&post.selftext),
        );
        candidate.published_at = post.created_utc.and_then(from_unix_seconds);
        let body = post.selftext.trim();
        if !body.is_empty() {
            candidate.content = Some(format!("{}\n\n{}", post.title.trim(), body));
        }
        results.push(candidate);
    }
    results
}

fn preview(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::test_support::{serve, Route};

    const LISTING: &str = r#"{"data":{"children":[
        {"data":{"title":"Is Stoicism about suppressing emotion?","selftext":"I keep reading that the Stoics wanted us to feel nothing.","permalink":"/r/askphilosophy/comments/abc/is_stoicism/","created_utc":1650000000.0}},
        {"data":{"title":"","selftext":"","permalink":"/r/philosophy/comments/empty/"}},
        {"data":{"title":"Link post","selftext":"","permalink":"/r/philosophy/comments/def/link/"}}
    ]}}"#;

    #[tokio::test]
    async fn searches_all_subreddits_in_one_request() {
        let config = RedditConfig {
            subreddits: vec!["philosophy".to_string(), "askphilosophy".to_string()],
            min_interval_ms: 0,
            per_subreddit_limit: 5,
        };
        let server = serve(vec![Route::json(
            "/r/philosophy+askphilosophy/search.json",
            LISTING,
        )])
        .await;
        let adapter = RedditAdapter::new(Client::new(), &config).with_base_url(server.url(""));

        let results = adapter.search("stoic emotion", 10).await.expect("search");

        assert_eq!(server.requests(), 1);
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].url,
            "https://www.reddit.com/r/askphilosophy/comments/abc/is_stoicism/"
        );
        assert!(results[0].published_at.is_some());
        assert!(results[0]
            .content
            .as_deref()
            .is_some_and(|c| c.contains("feel nothing")));
        assert_eq!(results[1].content, None);
        assert_eq!(results[1].rank_within_adapter, 1);
    }

    #[test]
    fn preview_trims_to_five_hundred_chars() {
        let long = "a".repeat(600);
        let trimmed = preview(&long);
        assert_eq!(trimmed.len(), SNIPPET_CHARS + 3);
        assert!(trimmed.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn zero_interval_disables_rate_limiting() {
        let config = RedditConfig {
            min_interval_ms: 0,
            ..RedditConfig::default()
        };
        assert!(RedditAdapter::new(Client::new(), &config).limiter.is_none());
        assert!(RedditAdapter::new(Client::new(), &RedditConfig::default())
            .limiter
            .is_some());
    }

    #[test]
    fn subreddit_names_are_escaped_in_the_path() {
        let config = RedditConfig {
            subreddits: vec!["philosophy".to_string(), " ask philosophy ".to_string()],
            ..RedditConfig::default()
        };
        let adapter = RedditAdapter::new(Client::new(), &config).with_base_url("http://r.test/");
        assert_eq!(
            adapter.search_url(),
            "http://r.test/r/philosophy+ask%20philosophy/search.json"
        );
    }
}
