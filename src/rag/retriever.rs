//! Local semantic retriever over the prebuilt vector index.

use std::sync::Arc;

use super::embedding::Embedder;
use super::index::IndexHandle;
use super::types::{InsertionKey, Passage, Query, ScoredChunk};
use crate::core::errors::RetrievalError;

/// Outcome of the local branch. The query embedding is kept even when the
/// index is unavailable so web passages can still be scored against it.
#[derive(Debug)]
pub struct LocalOutcome {
    pub query_embedding: Option<Vec<f32>>,
    pub result: Result<Vec<Passage>, RetrievalError>,
}

#[derive(Clone)]
pub struct LocalRetriever {
    index: IndexHandle,
    embedder: Option<Arc<dyn Embedder>>,
}

impl LocalRetriever {
    pub fn new(index: IndexHandle, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    pub fn embedder(&self) -> Option<&Arc<dyn Embedder>> {
        self.embedder.as_ref()
    }

    /// Any embedding failure surfaces as `IndexUnavailable`.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            RetrievalError::IndexUnavailable("no embedding provider configured".to_string())
        })?;
        embedder
            .embed(text)
            .await
            .map_err(RetrievalError::index_unavailable)
    }

    /// The `k` nearest chunks, similarity descending then chunk id ascending.
    ///
    /// With a focus, `2k` neighbours are considered and chunks whose author
    /// matches the focus are chosen first.
    pub fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        focus: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let index = self.index.get()?;
        let Some(focus) = focus.map(|f| f.trim().to_lowercase()).filter(|f| !f.is_empty()) else {
            return index
                .top_k(query_embedding, k)
                .map_err(RetrievalError::index_unavailable);
        };

        let pool = index
            .top_k(query_embedding, k.saturating_mul(2))
            .map_err(RetrievalError::index_unavailable)?;
        let (preferred, others): (Vec<ScoredChunk>, Vec<ScoredChunk>) =
            pool.into_iter().partition(|hit| {
                index
                    .chunk(hit.chunk_id)
                    .and_then(|chunk| index.document_for(chunk))
                    .and_then(|document| document.author.as_deref())
                    .map(|author| author_matches(author, &focus))
                    .unwrap_or(false)
            });

        let mut selected: Vec<ScoredChunk> =
            preferred.into_iter().chain(others).take(k).collect();
        selected.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        Ok(selected)
    }

    /// Turns hits into local passages, numbered in hit order.
    pub fn passages(&self, hits: &[ScoredChunk]) -> Result<Vec<Passage>, RetrievalError> {
        let index = self.index.get()?;
        let passages = hits
            .iter()
            .enumerate()
            .filter_map(|(rank, hit)| {
                let chunk = index.chunk(hit.chunk_id)?;
                let document = index.document_for(chunk)?;
                Some(Passage {
                    text: chunk.text.clone(),
                    document: document.to_document(),
                    relevance_score: 0.0,
                    chunk_id: Some(hit.chunk_id),
                    similarity: Some(f64::from(hit.similarity)),
                    embedding: index.embedding(hit.chunk_id),
                    insertion: InsertionKey::local(rank),
                })
            })
            .collect();
        Ok(passages)
    }

    pub async fn retrieve(&self, query: &Query, k: usize) -> LocalOutcome {
        let query_embedding = match self.embed_query(&query.text).await {
            Ok(embedding) => embedding,
            Err(err) => {
                let err = match self.index.get() {
                    Err(unavailable) => unavailable,
                    Ok(_) => err,
                };
                return LocalOutcome {
                    query_embedding: None,
                    result: Err(err),
                };
            }
        };

        let result = self
            .search(&query_embedding, k, query.focus.as_deref())
            .and_then(|hits| self.passages(&hits));
        if let Ok(passages) = &result {
            tracing::debug!(count = passages.len(), "Local retrieval finished");
        }
        LocalOutcome {
            query_embedding: Some(query_embedding),
            result,
        }
    }
}

fn author_matches(author: &str, focus: &str) -> bool {
    let author = author.to_lowercase();
    author.contains(focus) || focus.contains(&author)
}
