//! LLM integration module.
//!
//! Provides OpenAI-compatible chat and embedding clients and the prompts
//! used for answering, grading and OCR correction.

mod client;
mod embeddings;
mod prompts;

pub use client::{ChatBackend, LlmClient, LlmResponse, Message, Role, TokenUsage};
pub use embeddings::{EmbeddingBatch, EmbeddingClient, Embedder, cosine_similarity};
pub use prompts::Prompts;
