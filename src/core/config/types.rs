use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::defaults::*;
use crate::rag::context_builder::ContextBuilderConfig;
use crate::rag::types::BudgetMode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub fetcher: FetcherConfig,
    pub ranking: RankingConfig,
    pub context: ContextBuilderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Directory holding the prebuilt vector index. Relative paths resolve
    /// against the project root.
    pub index_dir: Option<PathBuf>,
    /// Global cap on simultaneous outbound page fetches.
    pub fetch_pool_size: usize,
    pub fast: ModeConfig,
    pub full: ModeConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_dir: None,
            fetch_pool_size: DEFAULT_FETCH_POOL_SIZE,
            fast: ModeConfig::fast(),
            full: ModeConfig::full(),
        }
    }
}

impl RetrievalConfig {
    pub fn mode(&self, mode: BudgetMode) -> &ModeConfig {
        match mode {
            BudgetMode::Fast => &self.fast,
            BudgetMode::Full => &self.full,
        }
    }
}

/// Per-mode budget parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeConfig {
    pub max_passages: usize,
    pub deadline_ms: u64,
    pub adapter_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
    pub local_top_k: usize,
    pub candidates_per_adapter: usize,
}

impl ModeConfig {
    pub fn fast() -> Self {
        Self {
            max_passages: 4,
            deadline_ms: 2_500,
            adapter_timeout_ms: 1_500,
            fetch_timeout_ms: 1_200,
            local_top_k: 6,
            candidates_per_adapter: 3,
        }
    }

    pub fn full() -> Self {
        Self {
            max_passages: 8,
            deadline_ms: 8_000,
            adapter_timeout_ms: 4_000,
            fetch_timeout_ms: 3_000,
            local_top_k: 12,
            candidates_per_adapter: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible server. No endpoint means no
    /// embedder, which leaves local retrieval unavailable.
    pub endpoint: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            api_key: None,
            timeout_ms: DEFAULT_EMBEDDING_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Enabled adapters; list order is also tie-break priority.
    pub adapters: Vec<String>,
    pub user_agent: String,
    pub google_search_api_key: Option<String>,
    pub google_search_engine_id: Option<String>,
    pub brave_search_api_key: Option<String>,
    pub bing_search_api_key: Option<String>,
    pub serper_api_key: Option<String>,
    pub reddit: RedditConfig,
    pub academic_sites: Vec<String>,
    pub forum_sites: Vec<String>,
    pub news_sites: Vec<String>,
    pub modern_topic_keywords: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            adapters: default_adapters(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            google_search_api_key: None,
            google_search_engine_id: None,
            brave_search_api_key: None,
            bing_search_api_key: None,
            serper_api_key: None,
            reddit: RedditConfig::default(),
            academic_sites: default_academic_sites(),
            forum_sites: default_forum_sites(),
            news_sites: default_news_sites(),
            modern_topic_keywords: default_modern_topic_keywords(),
        }
    }
}

impl SearchConfig {
    /// Configured adapter names, normalised, first occurrence wins.
    pub fn search_order(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.adapters
            .iter()
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub subreddits: Vec<String>,
    pub min_interval_ms: u64,
    pub per_subreddit_limit: usize,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            subreddits: default_subreddits(),
            min_interval_ms: DEFAULT_REDDIT_INTERVAL_MS,
            per_subreddit_limit: DEFAULT_REDDIT_PER_SUBREDDIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub user_agent: String,
    pub max_bytes: usize,
    /// Extracted text shorter than this is discarded silently.
    pub min_passage_chars: usize,
    pub max_passage_chars: usize,
    /// Substrings of URLs that must never be fetched.
    pub url_denylist: Vec<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_bytes: DEFAULT_FETCH_MAX_BYTES,
            min_passage_chars: DEFAULT_MIN_PASSAGE_CHARS,
            max_passage_chars: DEFAULT_MAX_PASSAGE_CHARS,
            url_denylist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub semantic: f64,
    pub authority: f64,
    pub recency: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            semantic: DEFAULT_SEMANTIC_WEIGHT,
            authority: DEFAULT_AUTHORITY_WEIGHT,
            recency: DEFAULT_RECENCY_WEIGHT,
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.semantic + self.authority + self.recency
    }

    /// Share of the total score carried by semantic relevance.
    pub fn semantic_share(&self) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        self.semantic / total
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub weights: ScoreWeights,
    /// Word-set Jaccard similarity above which two passages are duplicates.
    pub dedup_threshold: f64,
    /// Cosine similarity above which two embedded passages are duplicates.
    pub embedding_dedup_threshold: f64,
    pub recency_half_life_days: f64,
    pub academic_domains: Vec<String>,
    pub editorial_domains: Vec<String>,
    pub forum_domains: Vec<String>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            dedup_threshold: DEFAULT_DEDUP_THRESHOLD,
            embedding_dedup_threshold: DEFAULT_EMBEDDING_DEDUP_THRESHOLD,
            recency_half_life_days: DEFAULT_RECENCY_HALF_LIFE_DAYS,
            academic_domains: default_academic_domains(),
            editorial_domains: default_editorial_domains(),
            forum_domains: default_forum_domains(),
        }
    }
}
