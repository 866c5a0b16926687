use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{check_status, push_candidate, SourceAdapter};
use crate::core::errors::AdapterError;
use crate::rag::types::Candidate;

const NAME: &str = "duckduckgo";
const DEFAULT_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// DuckDuckGo's HTML results page. Needs no API key.
pub struct DuckDuckGoAdapter {
    client: Client,
    endpoint: String,
}

impl DuckDuckGoAdapter {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SourceAdapter for DuckDuckGoAdapter {
    fn name(&self) -> &str {
        NAME
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, AdapterError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|err| AdapterError::from_reqwest(NAME, err))?;
        check_status(NAME, &response)?;

        let html = response
            .text()
            .await
            .map_err(|err| AdapterError::from_reqwest(NAME, err))?;
        parse_results(&html, limit)
    }
}

fn parse_results(html: &str, limit: usize) -> Result<Vec<Candidate>, AdapterError> {
    let document = Html::parse_document(html);
    let result_selector = selector(".result")?;
    let link_selector = selector("a.result__a")?;
    let snippet_selector = selector(".result__snippet")?;

    let mut results = Vec::new();
    for result in document.select(&result_selector) {
        if results.len() >= limit {
            break;
        }
        if is_ad(&result) {
            continue;
        }
        let Some(link) = result.select(&link_selector).next() else {
            continue;
        };
        let Some(url) = link.value().attr("href").and_then(decode_result_link) else {
            continue;
        };
        let title = collapse_whitespace(&link.text().collect::<String>());
        let snippet = result
            .select(&snippet_selector)
            .next()
            .map(|s| collapse_whitespace(&s.text().collect::<String>()))
            .unwrap_or_default();
        push_candidate(&mut results, NAME, &title, &url, &snippet);
    }

    Ok(results)
}

fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|err| AdapterError::malformed(NAME, format!("{:?}", err)))
}

fn is_ad(result: &ElementRef<'_>) -> bool {
    result
        .value()
        .attr("class")
        .map(|class| class.contains("result--ad"))
        .unwrap_or(false)
}

/// Result links point at a `/l/?uddg=<target>` redirect; unwrap it.
fn decode_result_link(href: &str) -> Option<String> {
    let base = Url::parse("https://duckduckgo.com/").ok()?;
    let parsed = base.join(href).ok()?;

    let target = if parsed.path().starts_with("/l/") {
        let (_, value) = parsed.query_pairs().find(|(key, _)| key == "uddg")?;
        Url::parse(&value).ok()?
    } else {
        parsed
    };

    match target.scheme() {
        "http" | "https" => Some(target.to_string()),
        _ => None,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
