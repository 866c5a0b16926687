use async_trait::async_trait;
use chrono::{Datelike, Utc};
use futures_util::future::join_all;

use super::{skip_transient, SharedAdapter, SourceAdapter};
use crate::core::errors::AdapterError;
use crate::rag::types::{AuthorityTier, Candidate};

/// Decides whether a query is about current affairs.
#[derive(Debug, Clone)]
pub struct ModernTopicGate {
    keywords: Vec<String>,
}

impl ModernTopicGate {
    pub fn new(keywords: Vec<String>) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Multi-word keywords match as phrases, single words as whole tokens.
    /// A year from 2000 on also counts.
    pub fn matches(&self, query: &str) -> bool {
        let lowered = query.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let keyword_hit = self.keywords.iter().any(|keyword| {
            if keyword.contains(' ') {
                lowered.contains(keyword.as_str())
            } else {
                tokens.iter().any(|token| token == keyword)
            }
        });
        keyword_hit
            || tokens.iter().any(|token| {
                token.len() == 4 && token.parse::<u32>().is_ok_and(|year| year >= 2000)
            })
    }
}

/// Runs an inner engine once per site as `site:<domain> <query>` and merges
/// the hits under its own name.
pub struct SiteRestrictedAdapter {
    name: String,
    sites: Vec<String>,
    inner: SharedAdapter,
    tier: AuthorityTier,
    gate: Option<ModernTopicGate>,
}

impl SiteRestrictedAdapter {
    pub fn new(
        name: impl Into<String>,
        sites: Vec<String>,
        inner: SharedAdapter,
        tier: AuthorityTier,
    ) -> Self {
        Self {
            name: name.into(),
            sites,
            inner,
            tier,
            gate: None,
        }
    }

    /// Only search when the gate accepts the query, adding the current year
    /// to the search text.
    pub fn with_gate(mut self, gate: ModernTopicGate) -> Self {
        self.gate = Some(gate);
        self
    }

    fn site_query(&self, site: &str, query: &str) -> String {
        match &self.gate {
            Some(_) => format!("site:{} {} philosophy {}", site, query, Utc::now().year()),
            None => format!("site:{} {}", site, query),
        }
    }
}

#[async_trait]
impl SourceAdapter for SiteRestrictedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_tier(&self) -> AuthorityTier {
        self.tier
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, AdapterError> {
        if let Some(gate) = &self.gate {
            if !gate.matches(query) {
                tracing::debug!(adapter = %self.name, "Query is not a modern topic; skipping");
                return Ok(Vec::new());
            }
        }
        if self.sites.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let per_site = limit.div_ceil(self.sites.len()).max(1);
        let searches = self.sites.iter().map(|site| {
            let site_query = self.site_query(site, query);
            async move { self.inner.search(&site_query, per_site).await }
        });
        let outcomes = join_all(searches).await;

        let mut merged = Vec::new();
        let mut first_error = None;
        let mut any_ok = false;
        for outcome in outcomes {
            match skip_transient(outcome) {
                Ok(candidates) => {
                    any_ok = true;
                    merged.extend(candidates);
                }
                Err(err) => {
                    tracing::warn!(adapter = %self.name, "Site search failed: {}", err);
                    first_error.get_or_insert(err);
                }
            }
        }
        if !any_ok {
            if let Some(err) = first_error {
                return Err(err);
            }
        }

        merged.truncate(limit);
        for (rank, candidate) in merged.iter_mut().enumerate() {
            candidate.adapter_name = self.name.clone();
            candidate.rank_within_adapter = rank;
        }
        Ok(merged)
    }
}
