//! LLM-as-judge reranking of retrieved candidates

use crate::llm_trait::LlmClient;
use crate::prompts::{rerank_prompt, RERANK_PICKS};
use crate::types::{GenerateOptions, GenerateRequest};
use async_trait::async_trait;
use bookfinder_common::{BookFinderError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// What the reranker sees of one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerankCandidate {
    pub title: String,
    pub author: Option<String>,
    pub description: String,
}

/// One reranker pick, pointing back into the candidate list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerankDecision {
    pub index: usize,
    pub explanation: Option<String>,
    /// Relevance judged by the reranker (0-100)
    pub match_score: Option<u8>,
}

/// Secondary relevance ordering
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Picks in relevance order; indices are valid and unique
    async fn rerank(&self, query: &str, candidates: &[RerankCandidate]) -> Result<Vec<RerankDecision>>;
}

/// Reranker backed by a generative model
pub struct LlmReranker {
    client: Arc<dyn LlmClient>,
    model: String,
    picks: usize,
}

impl LlmReranker {
    /// Create new LLM reranker
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            picks: RERANK_PICKS,
        }
    }

    /// Builder: number of picks requested from the model
    pub fn with_picks(mut self, picks: usize) -> Self {
        self.picks = picks.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(&self, query: &str, candidates: &[RerankCandidate]) -> Result<Vec<RerankDecision>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let request = GenerateRequest::new(&self.model, rerank_prompt(query, candidates, self.picks))
            .json()
            .with_options(GenerateOptions {
                temperature: Some(0.2),
                ..Default::default()
            });

        let response = self
            .client
            .generate(request)
            .await
            .map_err(|e| BookFinderError::rerank(e.to_string()))?;

        let decisions = parse_rerank_response(&response, candidates.len(), self.picks)?;
        debug!(
            "Reranker {} picked {:?}",
            self.model,
            decisions.iter().map(|d| d.index).collect::<Vec<_>>()
        );
        Ok(decisions)
    }
}

/// Parse a reranker reply
///
/// Accepts `{"recommendations": [{index, explanation, match_score}]}` or a
/// bare JSON list of indices, optionally surrounded by prose. Out-of-range
/// and repeated indices are dropped; at most `max_picks` are kept.
pub fn parse_rerank_response(
    text: &str,
    candidate_count: usize,
    max_picks: usize,
) -> Result<Vec<RerankDecision>> {
    let value = extract_json(text)
        .ok_or_else(|| BookFinderError::rerank("reply contains no JSON"))?;

    let items = match &value {
        Value::Object(map) => map
            .get("recommendations")
            .and_then(Value::as_array)
            .ok_or_else(|| BookFinderError::rerank("reply has no recommendations list"))?,
        Value::Array(items) => items,
        _ => return Err(BookFinderError::rerank("reply is neither an object nor a list")),
    };

    let mut seen = HashSet::new();
    let decisions: Vec<RerankDecision> = items
        .iter()
        .filter_map(decision_from)
        .filter(|d| d.index < candidate_count && seen.insert(d.index))
        .take(max_picks)
        .collect();

    if decisions.is_empty() {
        return Err(BookFinderError::rerank("reply selected no valid candidates"));
    }

    Ok(decisions)
}

fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    [('{', '}'), ('[', ']')].iter().find_map(|(open, close)| {
        let start = trimmed.find(*open)?;
        let end = trimmed.rfind(*close)?;
        if end <= start {
            return None;
        }
        serde_json::from_str(&trimmed[start..=end]).ok()
    })
}

fn as_index(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|i| i as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn decision_from(item: &Value) -> Option<RerankDecision> {
    if let Some(index) = as_index(item) {
        return Some(RerankDecision {
            index,
            explanation: None,
            match_score: None,
        });
    }

    let index = as_index(item.get("index")?)?;
    let explanation = item
        .get("explanation")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);
    let match_score = item
        .get("match_score")
        .and_then(Value::as_f64)
        .map(|score| score.clamp(0.0, 100.0).round() as u8);

    Some(RerankDecision {
        index,
        explanation,
        match_score,
    })
}
