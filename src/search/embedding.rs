//! Embedding provider seam and a local, deterministic provider
//!
//! The engine never computes embeddings itself; it asks an
//! [`EmbeddingProvider`]. [`HarmonicEmbedder`] is the offline stand-in used by
//! the CLI: Harmonic Token Projection (https://arxiv.org/html/2511.20665), a
//! training-free method that projects each token onto unit circles of
//! coprime moduli. It matches shared tokens, not meaning.

use async_trait::async_trait;
use std::f64::consts::TAU;

use crate::error::{Error, Result};

/// External collaborator that turns text into a fixed-length vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>>;
}

/// Code points considered per token
const MAX_TOKEN_CHARS: usize = 64;

/// Deterministic harmonic token projection embedder
#[derive(Debug, Clone)]
pub struct HarmonicEmbedder {
    moduli: Vec<u64>,
}

impl HarmonicEmbedder {
    /// `dimension` is rounded up to the next even number (two components
    /// per modulus).
    pub fn new(dimension: usize) -> Self {
        let count = dimension.div_ceil(2).max(1);
        Self {
            moduli: first_primes(count),
        }
    }

    pub fn dimension(&self) -> usize {
        self.moduli.len() * 2
    }

    /// Mean of token projections, L2-normalized. Text without tokens maps to
    /// the zero vector.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut sum = vec![0.0f64; self.dimension()];
        let mut tokens = 0usize;

        for token in tokenize(text) {
            let n = token_value(&token);
            for (i, &m) in self.moduli.iter().enumerate() {
                let theta = TAU * (n % m) as f64 / m as f64;
                sum[2 * i] += theta.sin();
                sum[2 * i + 1] += theta.cos();
            }
            tokens += 1;
        }

        if tokens == 0 {
            return vec![0.0; self.dimension()];
        }

        let norm = sum.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm == 0.0 {
            return vec![0.0; self.dimension()];
        }
        sum.iter().map(|x| (x / norm) as f32).collect()
    }
}

#[async_trait]
impl EmbeddingProvider for HarmonicEmbedder {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.embed(text);
        if vector.iter().all(|v| *v == 0.0) {
            return Err(Error::Collaborator("text has no embeddable tokens".into()));
        }
        Ok(vector)
    }
}

/// Lowercased words split on whitespace and ASCII punctuation
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
}

/// Token code points read as a base-2^16 number (wrapping)
fn token_value(token: &str) -> u64 {
    token
        .chars()
        .take(MAX_TOKEN_CHARS)
        .fold(0u64, |n, c| n.wrapping_mul(1 << 16).wrapping_add(c as u64))
}

/// First `count` primes (trial division against the primes found so far)
fn first_primes(count: usize) -> Vec<u64> {
    let mut primes: Vec<u64> = Vec::with_capacity(count);
    let mut candidate = 2u64;
    while primes.len() < count {
        if primes
            .iter()
            .take_while(|&&p| p * p <= candidate)
            .all(|&p| candidate % p != 0)
        {
            primes.push(candidate);
        }
        candidate += 1;
    }
    primes
}
