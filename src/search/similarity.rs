//! Similarity scoring and dimension reconciliation
//!
//! One convention everywhere: cosine similarity in [-1, 1], higher is closer.

use std::borrow::Cow;

use crate::error::{Error, Result};

/// Cosine similarity between two equal-length vectors.
///
/// Returns 0.0 when either vector has zero magnitude.
///
/// # Panics
///
/// Panics if the lengths differ; callers reconcile dimensions first.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(
        a.len(),
        b.len(),
        "cosine_similarity on unreconciled vectors ({} vs {})",
        a.len(),
        b.len()
    );

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Fit `vector` to `dimension`, zero-padding or truncating when the length
/// difference is strictly below `tolerance`.
pub fn reconcile_dimension(
    vector: &[f32],
    dimension: usize,
    tolerance: usize,
) -> Result<Cow<'_, [f32]>> {
    let actual = vector.len();
    if actual == dimension {
        return Ok(Cow::Borrowed(vector));
    }

    if actual.abs_diff(dimension) >= tolerance {
        return Err(Error::DimensionMismatch {
            expected: dimension,
            actual,
            tolerance,
        });
    }

    let mut fitted = vector.to_vec();
    fitted.resize(dimension, 0.0);
    Ok(Cow::Owned(fitted))
}
