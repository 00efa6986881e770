//! Remote embedding client for OpenAI-compatible `/v1/embeddings` endpoints.

use super::client::ApiError;
use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Embeddings for a batch of texts plus the tokens billed for them.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingBatch {
    pub vectors: Vec<Vec<f32>>,
    pub total_tokens: u64,
}

/// Anything that can embed a batch of texts.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Deserialize)]
struct EmbeddingUsage {
    #[serde(default)]
    total_tokens: u64,
}

/// HTTP embedding client sharing the LLM endpoint and key.
#[derive(Clone)]
pub struct EmbeddingClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl EmbeddingClient {
    pub fn new(llm: &LlmConfig, embeddings: &EmbeddingConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(llm.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_base: llm.api_base.clone(),
            api_key: llm.api_key.clone(),
            model: embeddings.model.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/embeddings", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        if texts.is_empty() {
            return Ok(EmbeddingBatch::default());
        }

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(BenchError::LlmApi(format!(
                "Embedding request failed ({}): {}",
                status, message
            )));
        }

        parse_embeddings(&body, texts.len())
    }
}

fn parse_embeddings(body: &str, expected: usize) -> Result<EmbeddingBatch> {
    let mut parsed: EmbeddingResponse = serde_json::from_str(body)?;
    if parsed.data.len() != expected {
        return Err(BenchError::LlmParse(format!(
            "Expected {} embeddings, got {}",
            expected,
            parsed.data.len()
        )));
    }
    parsed.data.sort_by_key(|d| d.index);

    Ok(EmbeddingBatch {
        vectors: parsed.data.into_iter().map(|d| d.embedding).collect(),
        total_tokens: parsed.usage.map(|u| u.total_tokens).unwrap_or(0),
    })
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);

        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
    }

    #[test]
    fn test_parse_embeddings_reorders_by_index() {
        let body = r#"{
            "data": [
                {"embedding": [0.0, 1.0], "index": 1},
                {"embedding": [1.0, 0.0], "index": 0}
            ],
            "usage": {"prompt_tokens": 7, "total_tokens": 7}
        }"#;
        let batch = parse_embeddings(body, 2).unwrap();
        assert_eq!(batch.vectors[0], vec![1.0, 0.0]);
        assert_eq!(batch.total_tokens, 7);
    }

    #[test]
    fn test_parse_embeddings_count_mismatch() {
        let body = r#"{"data": [{"embedding": [1.0], "index": 0}]}"#;
        assert!(parse_embeddings(body, 2).is_err());
    }
}
