//! Fixtures shared by the unit and scenario tests: a tiny HTTP responder,
//! a deterministic embedder and scripted source adapters.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ndarray::Array2;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::embedding::Embedder;
use super::index::{IndexedDocument, VectorIndex};
use super::types::{AuthorityTier, Candidate, Chunk};
use crate::core::errors::{AdapterError, EmbedError};
use crate::tools::search::SourceAdapter;

// ---------------------------------------------------------------------------
// HTTP responder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Route {
    path: String,
    status: u16,
    content_type: String,
    body: String,
    delay: Duration,
}

impl Route {
    fn new(path: &str, status: u16, content_type: &str, body: String) -> Self {
        Self {
            path: path.to_string(),
            status,
            content_type: content_type.to_string(),
            body,
            delay: Duration::ZERO,
        }
    }

    pub fn json(path: &str, body: impl Into<String>) -> Self {
        Self::new(path, 200, "application/json", body.into())
    }

    pub fn html(path: &str, body: impl Into<String>) -> Self {
        Self::new(path, 200, "text/html; charset=utf-8", body.into())
    }

    pub fn text(path: &str, body: impl Into<String>) -> Self {
        Self::new(path, 200, "text/plain; charset=utf-8", body.into())
    }

    pub fn status(path: &str, status: u16) -> Self {
        Self::new(path, status, "text/plain", format!("status {}", status))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct Stats {
    requests: AtomicUsize,
    in_flight: AtomicUsize,
    max_concurrent: AtomicUsize,
}

/// Serves fixed routes on an ephemeral localhost port until dropped.
pub struct TestServer {
    addr: SocketAddr,
    stats: Arc<Stats>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> usize {
        self.stats.requests.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.stats.max_concurrent.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn serve(routes: Vec<Route>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let routes = Arc::new(routes);
    let stats = Arc::new(Stats::default());

    let handle = {
        let stats = stats.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = routes.clone();
                let stats = stats.clone();
                tokio::spawn(async move {
                    let _ = respond(stream, &routes, &stats).await;
                });
            }
        })
    };

    TestServer {
        addr,
        stats,
        handle,
    }
}

async fn respond(mut stream: TcpStream, routes: &[Route], stats: &Stats) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let target = head.split_whitespace().nth(1).unwrap_or("/");
    let path = target.split('?').next().unwrap_or("/");

    stats.requests.fetch_add(1, Ordering::SeqCst);
    let current = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    stats.max_concurrent.fetch_max(current, Ordering::SeqCst);

    let fallback = Route::status(path, 404);
    let route = routes.iter().find(|r| r.path == path).unwrap_or(&fallback);
    if !route.delay.is_zero() {
        tokio::time::sleep(route.delay).await;
    }

    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        route.status,
        if route.status < 400 { "OK" } else { "Error" },
        route.content_type,
        route.body.len(),
        route.body
    );
    let written = stream.write_all(response.as_bytes()).await;
    stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    written?;
    stream.shutdown().await
}

// ---------------------------------------------------------------------------
// Embedders
// ---------------------------------------------------------------------------

/// Bag-of-words embedder: each lowercased token is hashed into one of
/// `dimension` buckets. Deterministic, so texts sharing words are similar.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    pub dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = (fnv1a(&token.to_lowercase()) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model(&self) -> &str {
        "hash"
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(inputs.iter().map(|text| self.vector(text)).collect())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model(&self) -> &str {
        "failing"
    }

    async fn embed_batch(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Request("embedding service down".to_string()))
    }
}

/// Never answers.
pub struct HangingEmbedder;

#[async_trait]
impl Embedder for HangingEmbedder {
    fn model(&self) -> &str {
        "hanging"
    }

    async fn embed_batch(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        std::future::pending().await
    }
}

/// One document and one chunk per `(author, text)` pair, embedded with
/// `embedder`.
pub fn index_of(embedder: &HashEmbedder, entries: &[(&str, &str)]) -> VectorIndex {
    let documents = entries
        .iter()
        .enumerate()
        .map(|(id, (author, _))| IndexedDocument {
            id,
            locator: format!("texts/{}.txt", id),
            title: format!("Works of {}", author),
            author: Some(author.to_string()),
            authority_tier: AuthorityTier::Academic,
        })
        .collect();
    let chunks = entries
        .iter()
        .enumerate()
        .map(|(id, (_, text))| Chunk {
            id,
            document_id: id,
            offset: 0,
            length: text.len(),
            text: text.to_string(),
        })
        .collect();
    let rows: Vec<f32> = entries
        .iter()
        .flat_map(|(_, text)| embedder.vector(text))
        .collect();
    let matrix = Array2::from_shape_vec((entries.len(), embedder.dimension), rows).expect("shape");
    VectorIndex::from_parts(embedder.model(), documents, chunks, matrix).expect("index")
}

/// Index over a single document split into consecutive chunks.
pub fn book_of(embedder: &HashEmbedder, author: &str, chunks: &[&str]) -> VectorIndex {
    let documents = vec![IndexedDocument {
        id: 0,
        locator: "texts/book.txt".to_string(),
        title: format!("Works of {}", author),
        author: Some(author.to_string()),
        authority_tier: AuthorityTier::Academic,
    }];
    let mut offset = 0;
    let chunk_rows = chunks
        .iter()
        .enumerate()
        .map(|(id, text)| {
            let chunk = Chunk {
                id,
                document_id: 0,
                offset,
                length: text.len(),
                text: text.to_string(),
            };
            offset += text.len() + 1;
            chunk
        })
        .collect();
    let rows: Vec<f32> = chunks.iter().flat_map(|text| embedder.vector(text)).collect();
    let matrix = Array2::from_shape_vec((chunks.len(), embedder.dimension), rows).expect("shape");
    VectorIndex::from_parts(embedder.model(), documents, chunk_rows, matrix).expect("index")
}

// ---------------------------------------------------------------------------
// Source adapters
// ---------------------------------------------------------------------------

/// Returns a fixed list of candidates, optionally after a delay.
pub struct StaticAdapter {
    name: String,
    candidates: Vec<Candidate>,
    tier: AuthorityTier,
    delay: Duration,
}

impl StaticAdapter {
    /// Candidates for `urls`, ranked in the given order.
    pub fn new(name: &str, urls: &[String]) -> Self {
        let candidates = urls
            .iter()
            .enumerate()
            .map(|(rank, url)| Candidate::new(name, rank, url.clone(), format!("Result {}", rank), ""))
            .collect();
        Self::with_candidates(name, candidates)
    }

    pub fn with_candidates(name: &str, candidates: Vec<Candidate>) -> Self {
        Self {
            name: name.to_string(),
            candidates,
            tier: AuthorityTier::Unranked,
            delay: Duration::ZERO,
        }
    }

    pub fn with_tier(mut self, tier: AuthorityTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl SourceAdapter for StaticAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_tier(&self) -> AuthorityTier {
        self.tier
    }

    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<Candidate>, AdapterError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.candidates.iter().take(limit).cloned().collect())
    }
}

pub struct FailingAdapter {
    name: String,
    transient: bool,
}

impl FailingAdapter {
    /// Fails with a non-retryable error (bad credentials).
    pub fn permanent(name: &str) -> Self {
        Self {
            name: name.to_string(),
            transient: false,
        }
    }

    /// Fails with a throttling error.
    pub fn transient(name: &str) -> Self {
        Self {
            name: name.to_string(),
            transient: true,
        }
    }
}

#[async_trait]
impl SourceAdapter for FailingAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<Candidate>, AdapterError> {
        let status = if self.transient { 429 } else { 401 };
        Err(AdapterError::http(self.name.clone(), status))
    }
}

/// Never returns.
pub struct HangingAdapter {
    name: String,
}

impl HangingAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl SourceAdapter for HangingAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<Candidate>, AdapterError> {
        std::future::pending().await
    }
}

/// Records every query and answers with `limit` hits on the `site:` domain
/// named in the query.
pub struct RecordingAdapter {
    name: String,
    queries: Mutex<Vec<String>>,
}

impl RecordingAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("queries lock").clone()
    }
}

#[async_trait]
impl SourceAdapter for RecordingAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, AdapterError> {
        self.queries
            .lock()
            .expect("queries lock")
            .push(query.to_string());
        let site = query
            .split_whitespace()
            .find_map(|word| word.strip_prefix("site:"))
            .unwrap_or("example.org");
        Ok((0..limit)
            .map(|rank| {
                Candidate::new(
                    self.name.as_str(),
                    rank,
                    format!("https://{}/result/{}", site, rank),
                    format!("{} hit {}", site, rank),
                    "",
                )
            })
            .collect())
    }
}
