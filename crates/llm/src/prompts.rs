//! Prompt templates for reranking

use crate::rerank::RerankCandidate;

/// Characters of each description shown to the reranker
pub const DESCRIPTION_EXCERPT_CHARS: usize = 250;

/// Number of picks the reranker is asked for
pub const RERANK_PICKS: usize = 5;

/// Base instructions for the librarian persona
pub const RERANK_INSTRUCTIONS: &str = r#"You are an expert librarian. A reader describes the book they want; pick the candidates that truly fit the request.

For each pick provide:
1. Its index from the candidate list.
2. A two-sentence explanation of why it fits the request.
3. A match score from 0 to 100.

Return ONLY a JSON object exactly like this:
{"recommendations": [{"index": 3, "explanation": "...", "match_score": 95}]}"#;

/// Truncate on a character boundary, marking the cut with "..."
fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Prompt asking for the top picks among retrieved candidates
pub fn rerank_prompt(query: &str, candidates: &[RerankCandidate], picks: usize) -> String {
    let mut listing = String::new();
    for (i, candidate) in candidates.iter().enumerate() {
        listing.push_str(&format!("[{}] Title: {}\n", i, candidate.title));
        if let Some(author) = &candidate.author {
            listing.push_str(&format!("Author: {}\n", author));
        }
        listing.push_str(&format!(
            "Description: {}\n\n",
            excerpt(&candidate.description, DESCRIPTION_EXCERPT_CHARS)
        ));
    }

    format!(
        "{}\n\nReader request: \"{}\"\n\nPick the TOP {} of these {} candidates, most relevant first.\n\nCandidates:\n{}",
        RERANK_INSTRUCTIONS,
        query,
        picks.min(candidates.len()),
        candidates.len(),
        listing.trim_end()
    )
}
