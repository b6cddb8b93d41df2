//! Book Finder LLM Integration
//!
//! Ollama API client (embeddings and generation) and LLM reranking

mod client;
mod llm_trait;
mod prompts;
mod rerank;
mod types;

pub use client::OllamaClient;
pub use llm_trait::LlmClient;
pub use prompts::{rerank_prompt, DESCRIPTION_EXCERPT_CHARS, RERANK_PICKS};
pub use rerank::{parse_rerank_response, LlmReranker, RerankCandidate, RerankDecision, Reranker};
pub use types::{
    EmbedRequest, EmbedResponse, GenerateOptions, GenerateRequest, GenerateResponse, ModelTag,
    TagsResponse,
};
