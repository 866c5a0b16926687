//! Retrieval orchestrator.
//!
//! One query runs `Init -> FanOut -> Fetching -> Ranking -> Done`. The local
//! branch, every source adapter and every page fetch are tasks in a single
//! `JoinSet`; results are consumed as they arrive, so fetches start while
//! slower adapters are still searching. The query deadline bounds the whole
//! loop and anything still running when it passes is aborted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::{Id as TaskId, JoinSet};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::Instrument;
use uuid::Uuid;

use super::embedding::Embedder;
use super::fetcher::{ContentFetcher, FetchedPage};
use super::index::IndexHandle;
use super::ranking::{authority_tier_for, normalize_locator, rank};
use super::retriever::{LocalOutcome, LocalRetriever};
use super::types::{
    AuthorityTier, Budget, Candidate, DegradeCause, Diagnostics, Document, InsertionKey, Origin,
    Passage, Query, RetrievalBundle, RetrievalState,
};
use crate::core::config::{AppConfig, ModeConfig, RankingConfig, RetrievalConfig};
use crate::core::errors::{AdapterError, FetchError, RetrievalError};
use crate::tools::search::{AdapterRegistry, SharedAdapter};

pub struct Orchestrator {
    retriever: LocalRetriever,
    adapters: AdapterRegistry,
    fetcher: Arc<ContentFetcher>,
    retrieval: RetrievalConfig,
    ranking: RankingConfig,
}

enum BranchEvent {
    Local(LocalOutcome),
    Adapter {
        index: usize,
        tier: AuthorityTier,
        result: Result<Vec<Candidate>, AdapterError>,
    },
    Fetched {
        key: InsertionKey,
        tier: AuthorityTier,
        candidate: Candidate,
        result: Result<Option<(FetchedPage, Option<Vec<f32>>)>, FetchError>,
    },
}

#[derive(Debug, Clone)]
enum Branch {
    Local,
    Adapter(String),
    Fetch(String),
}

impl Orchestrator {
    pub fn new(
        retriever: LocalRetriever,
        adapters: AdapterRegistry,
        fetcher: ContentFetcher,
        retrieval: RetrievalConfig,
        ranking: RankingConfig,
    ) -> Self {
        Self {
            retriever,
            adapters,
            fetcher: Arc::new(fetcher),
            retrieval,
            ranking,
        }
    }

    /// Wires the orchestrator from configuration. The index handle and
    /// embedder are created once at startup and shared by every query.
    pub fn from_config(
        config: &AppConfig,
        index: IndexHandle,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Result<Self, FetchError> {
        let fetcher = ContentFetcher::new(&config.fetcher, config.retrieval.fetch_pool_size)?;
        Ok(Self::new(
            LocalRetriever::new(index, embedder),
            AdapterRegistry::from_config(&config.search),
            fetcher,
            config.retrieval.clone(),
            config.ranking.clone(),
        ))
    }

    pub fn retrieval_config(&self) -> &RetrievalConfig {
        &self.retrieval
    }

    /// Runs one query within `budget`.
    ///
    /// Only a malformed query or budget is an error. Every branch failure,
    /// including running out of time, ends up in the bundle's diagnostics.
    pub async fn retrieve(
        &self,
        query: &Query,
        budget: Budget,
    ) -> Result<RetrievalBundle, RetrievalError> {
        query.validate()?;
        budget.validate()?;

        let query_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("retrieve", query_id = %query_id, mode = ?budget.mode);
        Ok(self.run(query, budget, query_id).instrument(span).await)
    }

    async fn run(&self, query: &Query, budget: Budget, query_id: String) -> RetrievalBundle {
        let started = Instant::now();
        let now = Utc::now();
        let mode = self.retrieval.mode(budget.mode).clone();

        let mut run = Run::new(self, mode, query_id, budget);
        run.diagnostics.mode = budget.mode;
        tracing::info!(
            adapters = self.adapters.len(),
            index_available = self.retriever.index().is_available(),
            "Retrieval started"
        );

        run.enter(RetrievalState::FanOut);
        run.spawn_local(query);
        let search_text = query.search_text();
        for (index, adapter) in self.adapters.adapters().iter().enumerate() {
            run.spawn_adapter(index, adapter.clone(), &search_text);
        }

        run.drive().await;

        run.enter(RetrievalState::Ranking);
        let bundle = run.finish(query, now, started);
        tracing::info!(
            passages = bundle.passages.len(),
            degraded = bundle.degraded,
            elapsed_ms = bundle.diagnostics.elapsed_ms,
            "Retrieval finished"
        );
        bundle
    }
}

/// Query-local state of one retrieval.
struct Run<'a> {
    orchestrator: &'a Orchestrator,
    mode: ModeConfig,
    budget: Budget,
    tasks: JoinSet<BranchEvent>,
    outstanding: HashMap<TaskId, Branch>,
    dispatched: HashSet<String>,
    query_embedding: Option<Vec<f32>>,
    local: Vec<Passage>,
    web: Vec<Passage>,
    diagnostics: Diagnostics,
}

impl<'a> Run<'a> {
    fn new(
        orchestrator: &'a Orchestrator,
        mode: ModeConfig,
        query_id: String,
        budget: Budget,
    ) -> Self {
        Self {
            orchestrator,
            mode,
            budget,
            tasks: JoinSet::new(),
            outstanding: HashMap::new(),
            dispatched: HashSet::new(),
            query_embedding: None,
            local: Vec::new(),
            web: Vec::new(),
            diagnostics: Diagnostics {
                query_id,
                ..Diagnostics::default()
            },
        }
    }

    fn enter(&mut self, state: RetrievalState) {
        if self.diagnostics.final_state != state {
            tracing::debug!(from = ?self.diagnostics.final_state, to = ?state, "Retrieval state");
            self.diagnostics.final_state = state;
        }
    }

    fn spawn_local(&mut self, query: &Query) {
        let retriever = self.orchestrator.retriever.clone();
        let query = query.clone();
        let k = self.mode.local_top_k;
        let handle = self.tasks.spawn(
            async move { BranchEvent::Local(retriever.retrieve(&query, k).await) }
                .in_current_span(),
        );
        self.outstanding.insert(handle.id(), Branch::Local);
    }

    fn spawn_adapter(&mut self, index: usize, adapter: SharedAdapter, search_text: &str) {
        let name = adapter.name().to_string();
        let text = search_text.to_string();
        let limit = self.mode.candidates_per_adapter;
        let per_adapter = Duration::from_millis(self.mode.adapter_timeout_ms);
        self.diagnostics.adapters_attempted += 1;

        let handle = self.tasks.spawn(
            async move {
                let tier = adapter.default_tier();
                let result = match timeout(per_adapter, adapter.search(&text, limit)).await {
                    Ok(result) => result,
                    Err(_) => Err(AdapterError::Timeout {
                        adapter: adapter.name().to_string(),
                    }),
                };
                BranchEvent::Adapter {
                    index,
                    tier,
                    result,
                }
            }
            .in_current_span(),
        );
        self.outstanding.insert(handle.id(), Branch::Adapter(name));
    }

    fn spawn_fetch(&mut self, key: InsertionKey, tier: AuthorityTier, candidate: Candidate) {
        let fetcher = self.orchestrator.fetcher.clone();
        let embedder = self.orchestrator.retriever.embedder().cloned();
        let per_fetch = Duration::from_millis(self.mode.fetch_timeout_ms);
        let url = candidate.url.clone();
        self.diagnostics.fetches_attempted += 1;
        self.enter(RetrievalState::Fetching);

        let handle = self.tasks.spawn(
            async move {
                let result = match fetcher.fetch(&candidate, per_fetch).await {
                    Ok(Some(page)) => {
                        let embedding = match &embedder {
                            Some(embedder) => match embedder.embed(&page.text).await {
                                Ok(vector) => Some(vector),
                                Err(err) => {
                                    tracing::debug!(url = %page.url, "Not embedded: {}", err);
                                    None
                                }
                            },
                            None => None,
                        };
                        Ok(Some((page, embedding)))
                    }
                    Ok(None) => Ok(None),
                    Err(err) => Err(err),
                };
                BranchEvent::Fetched {
                    key,
                    tier,
                    candidate,
                    result,
                }
            }
            .in_current_span(),
        );
        self.outstanding.insert(handle.id(), Branch::Fetch(url));
    }

    /// Consumes branch results until every branch is done or the deadline
    /// passes.
    async fn drive(&mut self) {
        loop {
            match timeout_at(self.budget.deadline, self.tasks.join_next_with_id()).await {
                Err(_) => {
                    self.cut_off();
                    return;
                }
                Ok(None) => return,
                Ok(Some(Ok((id, event)))) => {
                    self.outstanding.remove(&id);
                    self.handle(event);
                }
                Ok(Some(Err(err))) => {
                    let branch = self.outstanding.remove(&err.id());
                    tracing::error!(branch = ?branch, "Retrieval branch panicked: {}", err);
                    self.diagnostics.errors.push(format!("{:?} panicked", branch));
                    match branch {
                        Some(Branch::Adapter(_)) => self.diagnostics.adapters_failed += 1,
                        Some(Branch::Fetch(_)) => self.diagnostics.fetches_failed += 1,
                        Some(Branch::Local) => {
                            self.diagnostics.record_cause(DegradeCause::IndexUnavailable {
                                reason: "local retrieval panicked".to_string(),
                            })
                        }
                        None => {}
                    }
                }
            }
        }
    }

    fn handle(&mut self, event: BranchEvent) {
        match event {
            BranchEvent::Local(outcome) => {
                self.query_embedding = outcome.query_embedding;
                match outcome.result {
                    Ok(passages) => {
                        self.diagnostics.local_passages = passages.len();
                        self.local = passages;
                    }
                    Err(err) => {
                        tracing::warn!("Local retrieval unavailable, continuing web-only: {}", err);
                        let reason = match &err {
                            RetrievalError::IndexUnavailable(reason) => reason.clone(),
                            other => other.to_string(),
                        };
                        self.diagnostics.errors.push(err.to_string());
                        self.diagnostics
                            .record_cause(DegradeCause::IndexUnavailable { reason });
                    }
                }
            }
            BranchEvent::Adapter {
                index,
                tier,
                result,
            } => match result {
                Ok(candidates) => {
                    self.diagnostics.candidates += candidates.len();
                    let limit = self.mode.candidates_per_adapter;
                    for candidate in candidates.into_iter().take(limit) {
                        if !self.dispatched.insert(normalize_locator(&candidate.url)) {
                            tracing::debug!(url = %candidate.url, "Candidate already dispatched");
                            continue;
                        }
                        let key = InsertionKey::web(index, candidate.rank_within_adapter);
                        let passage_tier =
                            authority_tier_for(&self.orchestrator.ranking, &candidate.url, tier);
                        self.spawn_fetch(key, passage_tier, candidate);
                    }
                }
                Err(err) => {
                    if matches!(err, AdapterError::Timeout { .. }) {
                        tracing::warn!(adapter = err.adapter(), "Source adapter timed out: {}", err);
                        self.diagnostics.adapters_timed_out += 1;
                    } else if err.is_transient() {
                        tracing::warn!(
                            adapter = err.adapter(),
                            "Skipping transient search failure: {}",
                            err
                        );
                        self.diagnostics.adapters_skipped += 1;
                    } else {
                        tracing::warn!(adapter = err.adapter(), "Source adapter failed: {}", err);
                        self.diagnostics.adapters_failed += 1;
                    }
                    self.diagnostics.errors.push(err.to_string());
                }
            },
            BranchEvent::Fetched {
                key,
                tier,
                candidate,
                result,
            } => match result {
                Ok(Some((page, embedding))) => {
                    self.diagnostics.web_passages += 1;
                    self.web.push(web_passage(page, embedding, &candidate, key, tier));
                }
                Ok(None) => self.diagnostics.fetches_filtered += 1,
                Err(err) => {
                    tracing::warn!("{}", err);
                    if err.is_timeout() {
                        self.diagnostics.fetches_timed_out += 1;
                    } else {
                        self.diagnostics.fetches_failed += 1;
                    }
                    self.diagnostics.errors.push(err.to_string());
                }
            },
        }
    }

    /// Deadline reached: abort everything still running and account for it.
    fn cut_off(&mut self) {
        self.tasks.abort_all();
        if self.outstanding.is_empty() {
            return;
        }
        tracing::warn!(
            outstanding = self.outstanding.len(),
            "Deadline reached; cancelling outstanding branches"
        );
        for branch in self.outstanding.values() {
            match branch {
                Branch::Local => self
                    .diagnostics
                    .errors
                    .push("local retrieval cut off by deadline".to_string()),
                Branch::Adapter(name) => {
                    self.diagnostics.adapters_timed_out += 1;
                    self.diagnostics
                        .errors
                        .push(format!("adapter '{}' cut off by deadline", name));
                }
                Branch::Fetch(url) => {
                    tracing::debug!(url = %url, "Fetch cancelled");
                    self.diagnostics.fetches_cancelled += 1;
                }
            }
        }
        self.outstanding.clear();
        self.diagnostics.record_cause(DegradeCause::DeadlineExceeded);
    }

    fn finish(mut self, query: &Query, now: DateTime<Utc>, started: Instant) -> RetrievalBundle {
        let mut passages = std::mem::take(&mut self.local);
        passages.append(&mut self.web);

        let outcome = rank(
            &self.orchestrator.ranking,
            &query.text,
            self.query_embedding.as_deref(),
            now,
            passages,
            self.budget.max_passages,
        );
        self.diagnostics.duplicates_removed = outcome.duplicates_removed;
        self.diagnostics.truncated = outcome.truncated;

        let diagnostics = &mut self.diagnostics;
        let failed = diagnostics.adapters_failed + diagnostics.adapters_timed_out;
        if diagnostics.adapters_attempted > 0 && failed >= diagnostics.adapters_attempted {
            diagnostics.record_cause(DegradeCause::AllAdaptersFailed);
        } else if diagnostics.web_passages == 0 {
            // Also covers a registry with no usable adapters.
            diagnostics.record_cause(DegradeCause::NoWebEvidence);
        }
        if outcome.passages.is_empty() {
            diagnostics.record_cause(DegradeCause::NoEvidence);
        }

        self.enter(RetrievalState::Done);
        self.diagnostics.elapsed_ms = started.elapsed().as_millis() as u64;
        RetrievalBundle {
            passages: outcome.passages,
            degraded: !self.diagnostics.causes.is_empty(),
            diagnostics: self.diagnostics,
        }
    }
}

fn web_passage(
    page: FetchedPage,
    embedding: Option<Vec<f32>>,
    candidate: &Candidate,
    insertion: InsertionKey,
    tier: AuthorityTier,
) -> Passage {
    let title = page
        .title
        .filter(|_| candidate.title.trim().is_empty())
        .unwrap_or_else(|| candidate.title.clone());
    Passage {
        text: page.text,
        document: Document {
            origin: Origin::Web,
            locator: page.url,
            title,
            author: None,
            retrieved_at: Some(page.retrieved_at),
            published_at: page.published_at,
            authority_tier: tier,
        },
        relevance_score: 0.0,
        chunk_id: None,
        similarity: None,
        embedding,
        insertion,
    }
}
