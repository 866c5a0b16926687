//! Read-only vector index over local chunks.
//!
//! On disk an index is a directory with four files:
//! - `manifest.json`: format version, dimension, chunk count, model, checksum
//! - `documents.json`: source documents
//! - `chunks.json`: chunk metadata, ids dense `0..N-1` in row order
//! - `embeddings.f32`: little-endian row-major `N x D` matrix
//!
//! Rows are L2-normalised at load so cosine similarity is a dot product.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use ndarray::{Array1, Array2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::types::{AuthorityTier, Chunk, Document, Origin, ScoredChunk};
use crate::core::errors::{IndexError, RetrievalError};
use crate::tools::vector_math::{normalize_rows, normalized};

pub const INDEX_FORMAT_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";
pub const DOCUMENTS_FILE: &str = "documents.json";
pub const CHUNKS_FILE: &str = "chunks.json";
pub const EMBEDDINGS_FILE: &str = "embeddings.f32";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub dimension: usize,
    pub chunk_count: usize,
    pub embedding_model: String,
    pub embeddings_sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: usize,
    pub locator: String,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub authority_tier: AuthorityTier,
}

impl IndexedDocument {
    pub fn to_document(&self) -> Document {
        Document {
            origin: Origin::Local,
            locator: self.locator.clone(),
            title: self.title.clone(),
            author: self.author.clone(),
            retrieved_at: None,
            published_at: None,
            authority_tier: self.authority_tier,
        }
    }
}

#[derive(Debug)]
pub struct VectorIndex {
    embedding_model: String,
    documents: Vec<IndexedDocument>,
    chunks: Vec<Chunk>,
    embeddings: Array2<f32>,
}

impl VectorIndex {
    /// Builds an index from in-memory parts, checking the same invariants
    /// as [`VectorIndex::load`].
    pub fn from_parts(
        embedding_model: impl Into<String>,
        documents: Vec<IndexedDocument>,
        chunks: Vec<Chunk>,
        mut embeddings: Array2<f32>,
    ) -> Result<Self, IndexError> {
        let (rows, dimension) = embeddings.dim();
        if dimension == 0 {
            return Err(IndexError::Format("dimension must be positive".to_string()));
        }
        if rows != chunks.len() {
            return Err(IndexError::Format(format!(
                "{} chunks but {} embedding rows",
                chunks.len(),
                rows
            )));
        }
        for (position, document) in documents.iter().enumerate() {
            if document.id != position {
                return Err(IndexError::Format(format!(
                    "document id {} at position {}",
                    document.id, position
                )));
            }
        }
        for (position, chunk) in chunks.iter().enumerate() {
            if chunk.id != position {
                return Err(IndexError::Format(format!(
                    "chunk ids must be dense: found id {} at row {}",
                    chunk.id, position
                )));
            }
            if chunk.document_id >= documents.len() {
                return Err(IndexError::Format(format!(
                    "chunk {} references unknown document {}",
                    chunk.id, chunk.document_id
                )));
            }
        }
        if embeddings.iter().any(|v| !v.is_finite()) {
            return Err(IndexError::Format(
                "embeddings contain non-finite values".to_string(),
            ));
        }

        normalize_rows(&mut embeddings);
        Ok(Self {
            embedding_model: embedding_model.into(),
            documents,
            chunks,
            embeddings,
        })
    }

    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        let manifest: IndexManifest = read_json(&dir.join(MANIFEST_FILE))?;
        if manifest.format_version != INDEX_FORMAT_VERSION {
            return Err(IndexError::Format(format!(
                "unsupported format version {} (expected {})",
                manifest.format_version, INDEX_FORMAT_VERSION
            )));
        }
        if manifest.dimension == 0 {
            return Err(IndexError::Format("dimension must be positive".to_string()));
        }

        let documents: Vec<IndexedDocument> = read_json(&dir.join(DOCUMENTS_FILE))?;
        let chunks: Vec<Chunk> = read_json(&dir.join(CHUNKS_FILE))?;
        if chunks.len() != manifest.chunk_count {
            return Err(IndexError::Format(format!(
                "manifest declares {} chunks, chunks file has {}",
                manifest.chunk_count,
                chunks.len()
            )));
        }

        let embeddings_path = dir.join(EMBEDDINGS_FILE);
        if !embeddings_path.exists() {
            return Err(IndexError::Missing(embeddings_path));
        }
        let bytes = fs::read(&embeddings_path).map_err(|source| IndexError::Io {
            path: embeddings_path.clone(),
            source,
        })?;

        let actual = hex::encode(Sha256::digest(&bytes));
        if !actual.eq_ignore_ascii_case(&manifest.embeddings_sha256) {
            return Err(IndexError::Checksum {
                expected: manifest.embeddings_sha256,
                actual,
            });
        }

        let expected_len = manifest.chunk_count * manifest.dimension * 4;
        if bytes.len() != expected_len {
            return Err(IndexError::Format(format!(
                "embeddings file has {} bytes, expected {}",
                bytes.len(),
                expected_len
            )));
        }

        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let embeddings = Array2::from_shape_vec((manifest.chunk_count, manifest.dimension), values)
            .map_err(|err| IndexError::Format(err.to_string()))?;

        Self::from_parts(manifest.embedding_model, documents, chunks, embeddings)
    }

    pub fn dimension(&self) -> usize {
        self.embeddings.ncols()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn chunk(&self, id: usize) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn document_for(&self, chunk: &Chunk) -> Option<&IndexedDocument> {
        self.documents.get(chunk.document_id)
    }

    pub fn embedding(&self, id: usize) -> Option<Vec<f32>> {
        (id < self.len()).then(|| self.embeddings.row(id).to_vec())
    }

    /// The `k` most similar chunks, similarity descending, ties by
    /// ascending chunk id.
    pub fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if query.len() != self.dimension() {
            return Err(IndexError::Dimension {
                expected: self.dimension(),
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query = match normalized(query) {
            Some(unit) => Array1::from(unit),
            None => Array1::zeros(self.dimension()),
        };
        let scores = self.embeddings.dot(&query);

        let mut scored: Vec<ScoredChunk> = scores
            .iter()
            .enumerate()
            .map(|(chunk_id, similarity)| ScoredChunk {
                chunk_id,
                similarity: *similarity,
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

/// Writes an index directory readable by [`VectorIndex::load`].
pub fn write_index(
    dir: &Path,
    embedding_model: &str,
    documents: &[IndexedDocument],
    chunks: &[Chunk],
    embeddings: &[Vec<f32>],
) -> Result<IndexManifest, IndexError> {
    if chunks.len() != embeddings.len() {
        return Err(IndexError::Format(format!(
            "{} chunks but {} embeddings",
            chunks.len(),
            embeddings.len()
        )));
    }
    let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
    if let Some(bad) = embeddings.iter().find(|row| row.len() != dimension) {
        return Err(IndexError::Dimension {
            expected: dimension,
            actual: bad.len(),
        });
    }

    fs::create_dir_all(dir).map_err(|source| IndexError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let bytes: Vec<u8> = embeddings
        .iter()
        .flat_map(|row| row.iter().flat_map(|v| v.to_le_bytes()))
        .collect();
    let manifest = IndexManifest {
        format_version: INDEX_FORMAT_VERSION,
        dimension,
        chunk_count: chunks.len(),
        embedding_model: embedding_model.to_string(),
        embeddings_sha256: hex::encode(Sha256::digest(&bytes)),
    };

    write_file(&dir.join(EMBEDDINGS_FILE), &bytes)?;
    write_json(&dir.join(DOCUMENTS_FILE), documents)?;
    write_json(&dir.join(CHUNKS_FILE), chunks)?;
    write_json(&dir.join(MANIFEST_FILE), &manifest)?;
    Ok(manifest)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, IndexError> {
    if !path.exists() {
        return Err(IndexError::Missing(path.to_path_buf()));
    }
    let contents = fs::read_to_string(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| IndexError::Metadata {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), IndexError> {
    let contents = serde_json::to_vec_pretty(value).map_err(|source| IndexError::Metadata {
        path: path.to_path_buf(),
        source,
    })?;
    write_file(path, &contents)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), IndexError> {
    fs::write(path, contents).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Process-wide handle to the index, fixed at startup.
///
/// A failed load is kept as `Unavailable` so queries fall back to web-only
/// retrieval instead of the process aborting.
#[derive(Debug, Clone)]
pub enum IndexHandle {
    Ready(Arc<VectorIndex>),
    Unavailable(Arc<str>),
}

impl IndexHandle {
    pub fn load(dir: &Path) -> Self {
        match VectorIndex::load(dir) {
            Ok(index) => {
                tracing::info!(
                    chunks = index.len(),
                    dimension = index.dimension(),
                    model = index.embedding_model(),
                    "Vector index loaded from {}",
                    dir.display()
                );
                Self::ready(index)
            }
            Err(err) => {
                tracing::warn!("Vector index unavailable ({}): {}", dir.display(), err);
                Self::unavailable(err.to_string())
            }
        }
    }

    pub fn ready(index: VectorIndex) -> Self {
        Self::Ready(Arc::new(index))
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(Arc::from(reason.into()))
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn get(&self) -> Result<&Arc<VectorIndex>, RetrievalError> {
        match self {
            Self::Ready(index) => Ok(index),
            Self::Unavailable(reason) => Err(RetrievalError::IndexUnavailable(reason.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_parts() -> (Vec<IndexedDocument>, Vec<Chunk>, Vec<Vec<f32>>) {
        let documents = vec![IndexedDocument {
            id: 0,
            locator: "texts/ethics.txt".to_string(),
            title: "Ethics".to_string(),
            author: Some("Aristotle".to_string()),
            authority_tier: AuthorityTier::Academic,
        }];
        let chunks = (0..3)
            .map(|id| Chunk {
                id,
                document_id: 0,
                offset: id * 10,
                length: 10,
                text: format!("chunk {}", id),
            })
            .collect();
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![2.0, 0.0]];
        (documents, chunks, embeddings)
    }

    #[test]
    fn write_then_load_preserves_rows_and_metadata() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (documents, chunks, embeddings) = sample_parts();
        let manifest = write_index(dir.path(), "test-model", &documents, &chunks, &embeddings)
            .expect("write");
        assert_eq!(manifest.chunk_count, 3);

        let index = VectorIndex::load(dir.path()).expect("load");
        assert_eq!(index.dimension(), 2);
        assert_eq!(index.embedding_model(), "test-model");
        assert_eq!(index.chunk(1).map(|c| c.text.as_str()), Some("chunk 1"));
        // row 2 was [2, 0] and is normalised on load
        assert_eq!(index.embedding(2), Some(vec![1.0, 0.0]));
    }

    #[test]
    fn top_k_breaks_ties_by_ascending_chunk_id() {
        let (documents, chunks, embeddings) = sample_parts();
        let matrix = Array2::from_shape_vec((3, 2), embeddings.concat()).expect("shape");
        let index = VectorIndex::from_parts("m", documents, chunks, matrix).expect("index");

        let hits = index.top_k(&[1.0, 0.0], 2).expect("search");
        let ids: Vec<usize> = hits.iter().map(|h| h.chunk_id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn top_k_rejects_wrong_dimension() {
        let (documents, chunks, embeddings) = sample_parts();
        let matrix = Array2::from_shape_vec((3, 2), embeddings.concat()).expect("shape");
        let index = VectorIndex::from_parts("m", documents, chunks, matrix).expect("index");

        assert!(matches!(
            index.top_k(&[1.0, 0.0, 0.0], 1),
            Err(IndexError::Dimension { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn corrupted_embeddings_fail_checksum() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (documents, chunks, embeddings) = sample_parts();
        write_index(dir.path(), "m", &documents, &chunks, &embeddings).expect("write");

        let path = dir.path().join(EMBEDDINGS_FILE);
        let mut bytes = fs::read(&path).expect("read");
        bytes[0] ^= 0xFF;
        fs::write(&path, bytes).expect("rewrite");

        assert!(matches!(
            VectorIndex::load(dir.path()),
            Err(IndexError::Checksum { .. })
        ));
    }

    #[test]
    fn sparse_chunk_ids_are_rejected() {
        let (documents, mut chunks, embeddings) = sample_parts();
        chunks[1].id = 7;
        let matrix = Array2::from_shape_vec((3, 2), embeddings.concat()).expect("shape");
        assert!(matches!(
            VectorIndex::from_parts("m", documents, chunks, matrix),
            Err(IndexError::Format(_))
        ));
    }

    #[test]
    fn missing_directory_yields_unavailable_handle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handle = IndexHandle::load(&dir.path().join("absent"));
        assert!(!handle.is_available());
        assert!(matches!(
            handle.get(),
            Err(RetrievalError::IndexUnavailable(_))
        ));
    }
}
