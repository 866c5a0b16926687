//! Hybrid retrieval: a local vector index and web search, fused into one
//! ranked bundle of passages under a per-query deadline.

pub mod builder;
pub mod context_builder;
pub mod embedding;
pub mod extract;
pub mod fetcher;
pub mod index;
pub mod orchestrator;
pub mod ranking;
pub mod retriever;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use builder::{BuilderConfig, IndexBuilder};
pub use context_builder::{ContextBuilder, ContextBuilderConfig};
pub use embedding::{Embedder, HttpEmbedder};
pub use fetcher::ContentFetcher;
pub use index::{IndexHandle, VectorIndex};
pub use orchestrator::Orchestrator;
pub use retriever::LocalRetriever;
pub use types::{Budget, BudgetMode, Passage, Query, RetrievalBundle};
