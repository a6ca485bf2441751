//! Vector similarity.

use crate::error::{RagError, Result};

/// Compute the cosine similarity between two vectors.
///
/// Both vectors must be non-empty and of equal length, otherwise
/// [`RagError::DimensionMismatch`] is returned. If either vector has zero
/// magnitude the similarity is `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.is_empty() || a.len() != b.len() {
        return Err(RagError::DimensionMismatch { expected: a.len(), actual: b.len() });
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = magnitude(a);
    let norm_b = magnitude(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    // Rounding can push near-parallel vectors slightly outside [-1, 1].
    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
