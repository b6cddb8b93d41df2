use ndarray::{Array1, ArrayView1, ArrayView2};
use std::cmp::Ordering;

use crate::types::Neighbor;

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    a.dot(&b) / (norm_a * norm_b)
}

/// Scale a vector to unit length in place
///
/// Returns false (leaving the vector untouched) for a zero vector.
pub fn l2_normalize(vector: &mut [f32]) -> bool {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    vector.iter_mut().for_each(|x| *x /= norm);
    true
}

/// Similarity of a unit query against every row of a row-normalized matrix
pub fn score_rows(matrix: ArrayView2<'_, f32>, unit_query: &[f32]) -> Array1<f32> {
    matrix.dot(&ArrayView1::from(unit_query))
}

/// Best `k` rows by score, ties broken by row position
pub fn top_k(scores: &[f32], k: usize) -> Vec<Neighbor> {
    let mut ranked: Vec<Neighbor> = scores
        .iter()
        .enumerate()
        .map(|(position, &similarity)| Neighbor {
            position,
            similarity: if similarity.is_nan() { f32::MIN } else { similarity },
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then(a.position.cmp(&b.position))
    });
    ranked.truncate(k);
    ranked
}
