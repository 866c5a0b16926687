//! Offline index builder: chunks a directory of plain-text works, embeds the
//! chunks and writes an index directory for [`VectorIndex::load`].
//!
//! [`VectorIndex::load`]: super::index::VectorIndex::load

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use super::embedding::Embedder;
use super::index::{write_index, IndexManifest, IndexedDocument};
use super::types::{AuthorityTier, Chunk};
use crate::core::errors::IndexError;

const GUTENBERG_START: &str = "START OF THIS PROJECT GUTENBERG";
const GUTENBERG_START_SHORT: &str = "START OF THE PROJECT GUTENBERG";
const GUTENBERG_END: &str = "END OF THIS PROJECT GUTENBERG";
const GUTENBERG_END_SHORT: &str = "END OF THE PROJECT GUTENBERG";

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Maximum words per chunk
    pub chunk_words: usize,
    /// Words carried over from the end of one chunk into the next
    pub overlap_words: usize,
    /// Chunks per embedding request
    pub batch_size: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            chunk_words: 512,
            overlap_words: 50,
            batch_size: 32,
        }
    }
}

/// A byte span of a source text and its whitespace-collapsed content.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub offset: usize,
    pub length: usize,
    pub text: String,
}

/// One source work ready for chunking.
#[derive(Debug, Clone)]
pub struct SourceText {
    pub locator: String,
    pub title: String,
    pub author: Option<String>,
    pub authority_tier: AuthorityTier,
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
struct SourceMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    philosopher: Option<String>,
    #[serde(default)]
    authority: Option<AuthorityTier>,
}

pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    config: BuilderConfig,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, config: BuilderConfig) -> Self {
        Self { embedder, config }
    }

    /// Reads every `*.txt` under `input`, then writes the index to `output`.
    pub async fn build(&self, input: &Path, output: &Path) -> Result<IndexManifest, IndexError> {
        let sources = read_sources(input)?;
        if sources.is_empty() {
            return Err(IndexError::Format(format!(
                "no .txt sources found in {}",
                input.display()
            )));
        }
        self.build_from(&sources, output).await
    }

    pub async fn build_from(
        &self,
        sources: &[SourceText],
        output: &Path,
    ) -> Result<IndexManifest, IndexError> {
        let mut documents = Vec::with_capacity(sources.len());
        let mut chunks = Vec::new();

        for source in sources {
            let document_id = documents.len();
            documents.push(IndexedDocument {
                id: document_id,
                locator: source.locator.clone(),
                title: source.title.clone(),
                author: source.author.clone(),
                authority_tier: source.authority_tier,
            });
            for span in chunk_text(&source.text, self.config.chunk_words, self.config.overlap_words) {
                chunks.push(Chunk {
                    id: chunks.len(),
                    document_id,
                    offset: span.offset,
                    length: span.length,
                    text: span.text,
                });
            }
            tracing::info!(locator = %source.locator, "Chunked source");
        }
        if chunks.is_empty() {
            return Err(IndexError::Format("sources produced no chunks".to_string()));
        }

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.config.batch_size.max(1)) {
            let inputs: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            embeddings.extend(self.embedder.embed_batch(&inputs).await?);
            tracing::debug!(done = embeddings.len(), total = chunks.len(), "Embedded batch");
        }

        let manifest = write_index(
            output,
            self.embedder.model(),
            &documents,
            &chunks,
            &embeddings,
        )?;
        tracing::info!(
            documents = documents.len(),
            chunks = manifest.chunk_count,
            dimension = manifest.dimension,
            "Index written to {}",
            output.display()
        );
        Ok(manifest)
    }
}

/// Loads `*.txt` files from `dir` in name order, with their optional
/// `<stem>_metadata.json` sidecars.
pub fn read_sources(dir: &Path) -> Result<Vec<SourceText>, IndexError> {
    let entries = fs::read_dir(dir).map_err(|source| IndexError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    paths.sort();

    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = fs::read_to_string(&path).map_err(|source| IndexError::Io {
            path: path.clone(),
            source,
        })?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let metadata = read_metadata(&path.with_file_name(format!("{}_metadata.json", stem)))?;

        sources.push(SourceText {
            locator: path.to_string_lossy().replace('\\', "/"),
            title: metadata.title.unwrap_or_else(|| stem.clone()),
            author: metadata.author.or(metadata.philosopher),
            authority_tier: metadata.authority.unwrap_or_default(),
            text: strip_gutenberg(&raw).to_string(),
        });
    }
    Ok(sources)
}

fn read_metadata(path: &Path) -> Result<SourceMetadata, IndexError> {
    if !path.exists() {
        return Ok(SourceMetadata::default());
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

/// The text between Project Gutenberg's start and end markers, or all of it
/// when the markers are absent.
pub fn strip_gutenberg(text: &str) -> &str {
    let upper = text.to_uppercase();
    if upper.len() != text.len() {
        // case mapping changed byte offsets; markers are ASCII so search raw
        return strip_between(text, text);
    }
    strip_between(text, &upper)
}

fn strip_between<'t>(text: &'t str, haystack: &str) -> &'t str {
    let start = [GUTENBERG_START, GUTENBERG_START_SHORT]
        .iter()
        .filter_map(|marker| haystack.find(marker))
        .min()
        .and_then(|pos| text[pos..].find('\n').map(|nl| pos + nl + 1))
        .unwrap_or(0);
    let end = [GUTENBERG_END, GUTENBERG_END_SHORT]
        .iter()
        .filter_map(|marker| haystack[start..].rfind(marker).map(|pos| start + pos))
        .max()
        .map(|pos| text[..pos].rfind('\n').unwrap_or(pos).max(start))
        .unwrap_or(text.len());
    text[start..end].trim()
}

/// Sentence-window chunking.
///
/// Sentences end at words finishing in `.`, `!` or `?`. Whole sentences are
/// added while the chunk stays within `chunk_words`; each new chunk opens
/// with the last `overlap_words` words of the previous one. A sentence longer
/// than `chunk_words` becomes a chunk of its own.
pub fn chunk_text(text: &str, chunk_words: usize, overlap_words: usize) -> Vec<TextSpan> {
    let words = word_spans(text);
    if words.is_empty() {
        return Vec::new();
    }
    let chunk_words = chunk_words.max(1);

    let mut sentences = Vec::new();
    let mut sentence_start = 0;
    for (i, &(start, end)) in words.iter().enumerate() {
        if ends_sentence(&text[start..end]) || i + 1 == words.len() {
            sentences.push((sentence_start, i + 1));
            sentence_start = i + 1;
        }
    }

    let emit = |from: usize, to: usize| {
        let offset = words[from].0;
        let end = words[to - 1].1;
        TextSpan {
            offset,
            length: end - offset,
            text: text[offset..end].split_whitespace().collect::<Vec<_>>().join(" "),
        }
    };

    let mut spans = Vec::new();
    let (mut from, mut to) = sentences[0];
    for &(sentence_from, sentence_to) in &sentences[1..] {
        if (to - from) + (sentence_to - sentence_from) <= chunk_words {
            to = sentence_to;
            continue;
        }
        spans.push(emit(from, to));
        from = if overlap_words > 0 && to - from > overlap_words {
            to - overlap_words
        } else {
            sentence_from
        };
        to = sentence_to;
    }
    spans.push(emit(from, to));
    spans
}

fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

fn ends_sentence(word: &str) -> bool {
    word.trim_end_matches(['"', '\'', ')', ']', '\u{201d}', '\u{2019}'])
        .ends_with(['.', '!', '?'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::index::VectorIndex;
    use crate::rag::test_support::HashEmbedder;

    #[test]
    fn chunks_close_on_sentence_boundaries_with_overlap() {
        let text = "One two three. Four five six. Seven eight nine. Ten eleven twelve.";
        let spans = chunk_text(text, 6, 2);

        let texts: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "One two three. Four five six.",
                "five six. Seven eight nine.",
                "eight nine. Ten eleven twelve.",
            ]
        );
    }

    #[test]
    fn spans_point_back_into_the_source() {
        let text = "First  sentence\nhere. Second one follows! And a third?";
        for span in chunk_text(text, 4, 1) {
            let raw = &text[span.offset..span.offset + span.length];
            assert_eq!(raw.split_whitespace().collect::<Vec<_>>().join(" "), span.text);
        }
    }

    #[test]
    fn overlong_sentence_is_its_own_chunk() {
        let text = "a b c d e f g h. i j.";
        let spans = chunk_text(text, 3, 0);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "a b c d e f g h.");
        assert_eq!(spans[1].text, "i j.");
        assert!(chunk_text("   ", 10, 2).is_empty());
    }

    #[test]
    fn gutenberg_boilerplate_is_removed() {
        let text = "Header junk\n*** START OF THIS PROJECT GUTENBERG EBOOK ***\nThe real text.\n*** END OF THIS PROJECT GUTENBERG EBOOK ***\nLicense";
        assert_eq!(strip_gutenberg(text), "The real text.");
        assert_eq!(strip_gutenberg("  plain text  "), "plain text");
    }

    #[test]
    fn sidecar_metadata_is_applied() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("meditations.txt"), "Waste no time.").expect("write");
        fs::write(
            dir.path().join("meditations_metadata.json"),
            r#"{"title": "Meditations", "philosopher": "Marcus Aurelius", "authority": "editorial"}"#,
        )
        .expect("write");
        fs::write(dir.path().join("notes.txt"), "Untitled notes.").expect("write");
        fs::write(dir.path().join("ignored.md"), "# not a source").expect("write");

        let sources = read_sources(dir.path()).expect("read");
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title, "Meditations");
        assert_eq!(sources[0].author.as_deref(), Some("Marcus Aurelius"));
        assert_eq!(sources[0].authority_tier, AuthorityTier::Editorial);
        assert_eq!(sources[1].title, "notes");
        assert_eq!(sources[1].authority_tier, AuthorityTier::Academic);
    }

    #[tokio::test]
    async fn built_index_loads_back() {
        let input = tempfile::tempdir().expect("input");
        let output = tempfile::tempdir().expect("output");
        fs::write(
            input.path().join("ethics.txt"),
            "Every art aims at some good. The good is that at which all things aim. \
             Happiness is an activity of the soul.",
        )
        .expect("write");

        let builder = IndexBuilder::new(
            Arc::new(HashEmbedder::new(32)),
            BuilderConfig {
                chunk_words: 12,
                overlap_words: 3,
                batch_size: 2,
            },
        );
        let manifest = builder.build(input.path(), output.path()).await.expect("build");
        assert!(manifest.chunk_count >= 2);
        assert_eq!(manifest.dimension, 32);
        assert_eq!(manifest.embedding_model, "hash");

        let index = VectorIndex::load(output.path()).expect("load");
        assert_eq!(index.len(), manifest.chunk_count);
        let chunk = index.chunk(0).expect("chunk");
        assert_eq!(chunk.document_id, 0);
        assert!(chunk.text.starts_with("Every art"));
    }

    #[tokio::test]
    async fn empty_input_is_an_error() {
        let input = tempfile::tempdir().expect("input");
        let output = tempfile::tempdir().expect("output");
        let builder = IndexBuilder::new(Arc::new(HashEmbedder::new(8)), BuilderConfig::default());
        assert!(builder.build(input.path(), output.path()).await.is_err());
    }
}
