//! Similarity search over the artifacts of one document.
//!
//! Artifacts are split into overlapping chunks, embedded through an
//! [`Embedder`] and ranked by cosine similarity against a query.

use crate::config::EmbeddingConfig;
use crate::error::{BenchError, Result};
use crate::llm::{Embedder, cosine_similarity};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Configuration for text chunking.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

impl From<&EmbeddingConfig> for ChunkConfig {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            chunk_overlap: config.chunk_overlap,
        }
    }
}

/// A chunk of an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Artifact file the chunk came from.
    pub source: String,
    pub text: String,
    /// Character offsets in the artifact.
    pub start_pos: usize,
    pub end_pos: usize,
}

/// Split `text` into overlapping chunks, preferring sentence boundaries.
pub fn chunk_text(source: &str, text: &str, config: &ChunkConfig) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let size = config.chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < len {
        let mut end = (start + size).min(len);

        // Pull the end back to a sentence end within the last 100 chars,
        // but never so far that the next chunk would not advance.
        if end < len {
            let window_start = end.saturating_sub(100).max(start + config.chunk_overlap + 1);
            if let Some(pos) = (window_start..end)
                .rev()
                .find(|&i| matches!(chars[i - 1], '.' | '!' | '?'))
            {
                end = pos;
            }
        }

        let piece: String = chars[start..end].iter().collect();
        if !piece.trim().is_empty() {
            chunks.push(Chunk {
                source: source.to_string(),
                text: piece.trim().to_string(),
                start_pos: start,
                end_pos: end,
            });
        }

        if end >= len {
            break;
        }
        let next = end.saturating_sub(config.chunk_overlap);
        start = if next > start { next } else { end };
    }
    chunks
}

/// Chunk embeddings for one document.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: Vec<(Chunk, Vec<f32>)>,
    /// Tokens billed while building the index.
    pub embedding_tokens: u64,
}

/// One ranked chunk.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

impl VectorIndex {
    /// Embed `chunks` in batches of `batch_size`.
    pub async fn build(chunks: Vec<Chunk>, embedder: &dyn Embedder, batch_size: usize) -> Result<Self> {
        let mut index = Self::default();

        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = embedder.embed_batch(&texts).await?;
            if embedded.vectors.len() != batch.len() {
                return Err(BenchError::LlmParse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embedded.vectors.len()
                )));
            }
            index.embedding_tokens += embedded.total_tokens;
            index
                .entries
                .extend(batch.iter().cloned().zip(embedded.vectors));
        }

        debug!(chunks = index.len(), tokens = index.embedding_tokens, "vector index built");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rank chunks against an embedded query, best first.
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|(chunk, embedding)| SearchHit {
                chunk: chunk.clone(),
                score: cosine_similarity(query_embedding, embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        hits
    }
}

/// Chunks of every readable artifact under `document_dir`, in path order.
pub fn collect_chunks(document_dir: &Path, config: &ChunkConfig) -> Result<Vec<Chunk>> {
    if !document_dir.is_dir() {
        return Err(BenchError::InvalidInputDir(document_dir.to_path_buf()));
    }

    let mut chunks = Vec::new();
    for entry in WalkDir::new(document_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let source = path
            .strip_prefix(document_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();
        match std::fs::read_to_string(path) {
            Ok(text) => chunks.extend(chunk_text(&source, &text, config)),
            Err(e) => warn!(file = %path.display(), error = %e, "skipping unreadable artifact"),
        }
    }
    Ok(chunks)
}

/// Result of searching one document.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    /// Tokens spent on chunks and query together.
    pub embedding_tokens: u64,
    pub chunks: usize,
}

/// Embed the artifacts of `document_dir` and rank them against `query`.
pub async fn search_document(
    document_dir: &Path,
    query: &str,
    embedder: &dyn Embedder,
    config: &EmbeddingConfig,
    top_k: usize,
) -> Result<SearchOutcome> {
    let chunks = collect_chunks(document_dir, &ChunkConfig::from(config))?;
    let index = VectorIndex::build(chunks, embedder, config.batch_size).await?;

    let query_batch = embedder.embed_batch(&[query.to_string()]).await?;
    let query_embedding = query_batch
        .vectors
        .into_iter()
        .next()
        .ok_or_else(|| BenchError::LlmParse("no embedding returned for query".to_string()))?;

    Ok(SearchOutcome {
        hits: index.search(&query_embedding, top_k),
        embedding_tokens: index.embedding_tokens + query_batch.total_tokens,
        chunks: index.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::EmbeddingBatch;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    /// Two-dimensional embedding: counts of "revenue" and "weather".
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch> {
            let vectors = texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        t.matches("revenue").count() as f32 + 0.01,
                        t.matches("weather").count() as f32 + 0.01,
                    ]
                })
                .collect();
            Ok(EmbeddingBatch {
                vectors,
                total_tokens: texts.len() as u64 * 3,
            })
        }
    }

    #[test]
    fn test_chunk_text_overlaps_and_covers() {
        let text = "This is a test. Another sentence here. And one more.";
        let config = ChunkConfig {
            chunk_size: 20,
            chunk_overlap: 5,
        };

        let chunks = chunk_text("a.txt", text, &config);
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].text, "This is a test.");
        assert_eq!(chunks.last().unwrap().end_pos, text.chars().count());
        for pair in chunks.windows(2) {
            assert!(pair[1].start_pos < pair[0].end_pos);
            assert!(pair[1].start_pos > pair[0].start_pos);
        }
    }

    #[test]
    fn test_chunk_empty_text() {
        assert!(chunk_text("a.txt", "   ", &ChunkConfig::default()).is_empty());
    }

    #[tokio::test]
    async fn test_search_document_ranks_and_counts_tokens() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "Revenue grew. Revenue doubled.").unwrap();
        fs::write(dir.path().join("b.md"), "The weather was mild.").unwrap();

        let config = EmbeddingConfig {
            batch_size: 1,
            ..Default::default()
        };
        let outcome = search_document(dir.path(), "revenue", &KeywordEmbedder, &config, 1)
            .await
            .unwrap();

        assert_eq!(outcome.chunks, 2);
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].chunk.source, "a.txt");
        assert_eq!(outcome.embedding_tokens, 9);
    }

    #[tokio::test]
    async fn test_search_missing_dir() {
        let dir = TempDir::new().unwrap();
        let result = search_document(
            &dir.path().join("missing"),
            "q",
            &KeywordEmbedder,
            &EmbeddingConfig::default(),
            3,
        )
        .await;
        assert!(matches!(result, Err(BenchError::InvalidInputDir(_))));
    }
}
