//! Data model shared by the retrieval pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

use crate::core::config::RetrievalConfig;
use crate::core::errors::RetrievalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Web,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Local => write!(f, "local"),
            Origin::Web => write!(f, "web"),
        }
    }
}

/// Ordinal reliability class of a source. Declared best first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AuthorityTier {
    #[default]
    Academic,
    Editorial,
    Forum,
    Unranked,
}

impl AuthorityTier {
    /// Ranking bonus in [0, 1].
    pub fn bonus(self) -> f64 {
        match self {
            AuthorityTier::Academic => 1.0,
            AuthorityTier::Editorial => 0.5,
            AuthorityTier::Forum | AuthorityTier::Unranked => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthorityTier::Academic => "academic",
            AuthorityTier::Editorial => "editorial",
            AuthorityTier::Forum => "forum",
            AuthorityTier::Unranked => "unranked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub origin: Origin,
    /// File path for local documents, URL for web documents.
    pub locator: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub authority_tier: AuthorityTier,
}

/// Chunk metadata as stored in the index. Row `id` of the embedding matrix
/// holds this chunk's vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: usize,
    pub document_id: usize,
    pub offset: usize,
    pub length: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredChunk {
    pub chunk_id: usize,
    pub similarity: f32,
}

/// Unvalidated hit returned by a source adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub adapter_name: String,
    pub rank_within_adapter: usize,
    pub published_at: Option<DateTime<Utc>>,
    /// Full text supplied by the backend itself. The fetcher uses it in
    /// place of downloading the page.
    pub content: Option<String>,
}

impl Candidate {
    pub fn new(
        adapter_name: impl Into<String>,
        rank_within_adapter: usize,
        url: impl Into<String>,
        title: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
            adapter_name: adapter_name.into(),
            rank_within_adapter,
            published_at: None,
            content: None,
        }
    }
}

/// Stable tie-break key. Local passages use `source = 0`; web passages use
/// the adapter's position in the configured list plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct InsertionKey {
    pub source: usize,
    pub rank: usize,
}

impl InsertionKey {
    pub fn local(rank: usize) -> Self {
        Self { source: 0, rank }
    }

    pub fn web(adapter_index: usize, rank: usize) -> Self {
        Self {
            source: adapter_index + 1,
            rank,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Passage {
    pub text: String,
    pub document: Document,
    pub relevance_score: f64,
    /// Index row of a local chunk. Chunks of one document share a locator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<usize>,
    /// Precomputed query similarity, present for local chunks.
    #[serde(skip)]
    pub similarity: Option<f64>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    #[serde(skip)]
    pub insertion: InsertionKey,
}

impl Passage {
    pub fn origin(&self) -> Origin {
        self.document.origin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetMode {
    #[default]
    Fast,
    Full,
}

impl std::str::FromStr for BudgetMode {
    type Err = RetrievalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(BudgetMode::Fast),
            "full" => Ok(BudgetMode::Full),
            other => Err(RetrievalError::InvalidBudget(format!(
                "unknown mode '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Budget {
    pub deadline: Instant,
    pub max_passages: usize,
    pub mode: BudgetMode,
}

impl Budget {
    pub fn new(deadline: Instant, max_passages: usize, mode: BudgetMode) -> Self {
        Self {
            deadline,
            max_passages,
            mode,
        }
    }

    /// Budget derived from the configured mode, starting now.
    pub fn for_mode(config: &RetrievalConfig, mode: BudgetMode) -> Self {
        let mode_config = config.mode(mode);
        Self::new(
            Instant::now() + Duration::from_millis(mode_config.deadline_ms),
            mode_config.max_passages,
            mode,
        )
    }

    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.max_passages == 0 {
            return Err(RetrievalError::InvalidBudget(
                "max_passages must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    /// Thinker or topic the caller wants evidence biased towards.
    pub focus: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            focus: None,
        }
    }

    pub fn with_focus(mut self, focus: impl Into<String>) -> Self {
        let focus = focus.into();
        self.focus = if focus.trim().is_empty() {
            None
        } else {
            Some(focus)
        };
        self
    }

    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.text.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery(
                "query text is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Text sent to web search backends.
    pub fn search_text(&self) -> String {
        match &self.focus {
            Some(focus) => format!("{} {}", self.text.trim(), focus.trim()),
            None => self.text.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalState {
    #[default]
    Init,
    FanOut,
    Fetching,
    Ranking,
    Done,
}

/// Reason a completed retrieval took a fallback path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum DegradeCause {
    IndexUnavailable { reason: String },
    AllAdaptersFailed,
    NoWebEvidence,
    DeadlineExceeded,
    NoEvidence,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub query_id: String,
    pub mode: BudgetMode,
    pub final_state: RetrievalState,
    pub local_passages: usize,
    pub adapters_attempted: usize,
    pub adapters_failed: usize,
    pub adapters_timed_out: usize,
    /// Adapters whose transient failure was treated as an empty result.
    pub adapters_skipped: usize,
    pub candidates: usize,
    pub fetches_attempted: usize,
    pub fetches_failed: usize,
    pub fetches_timed_out: usize,
    pub fetches_filtered: usize,
    pub fetches_cancelled: usize,
    pub web_passages: usize,
    pub duplicates_removed: usize,
    pub truncated: usize,
    pub causes: Vec<DegradeCause>,
    pub errors: Vec<String>,
    pub elapsed_ms: u64,
}

impl Diagnostics {
    pub fn record_cause(&mut self, cause: DegradeCause) {
        if !self.causes.contains(&cause) {
            self.causes.push(cause);
        }
    }

    pub fn has_cause(&self, predicate: impl Fn(&DegradeCause) -> bool) -> bool {
        self.causes.iter().any(predicate)
    }

    pub fn no_evidence(&self) -> bool {
        self.causes.contains(&DegradeCause::NoEvidence)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalBundle {
    pub passages: Vec<Passage>,
    pub degraded: bool,
    pub diagnostics: Diagnostics,
}

impl RetrievalBundle {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }
}
