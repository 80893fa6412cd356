//! Embedder contract (§6): consumed, not implemented, by the Repo Engine.
//! A deterministic [`FakeEmbedder`] test double is provided so the builder
//! and updater can be exercised without a live network embedding service.

use sha2::{Digest, Sha256};

use crate::error::SemanticError;

/// `{ id(), dims(), embed_batch(texts) }`, mirroring the external embedder
/// contract in §6. The builder assumes `result[i].len() == dims()` and
/// preserves input order.
pub trait Embedder: Send + Sync {
    fn id(&self) -> &str;
    fn dims(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SemanticError>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

/// Deterministic hash-derived embedder: each text maps to a fixed-dimension
/// vector derived from its SHA-256 digest. Used in tests and as a
/// placeholder until a real embedder is wired in by the orchestrator.
pub struct FakeEmbedder {
    id: String,
    dims: usize,
}

impl FakeEmbedder {
    pub fn new(id: impl Into<String>, dims: usize) -> Self {
        Self { id: id.into(), dims }
    }
}

impl Embedder for FakeEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SemanticError> {
        Ok(texts.iter().map(|t| hash_embed(t, self.dims)).collect())
    }
}

fn hash_embed(text: &str, dims: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(dims);
    let mut counter: u32 = 0;
    while out.len() < dims {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();
        for chunk in digest.chunks_exact(4) {
            if out.len() == dims {
                break;
            }
            let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            out.push((raw as f32 / u32::MAX as f32) * 2.0 - 1.0);
        }
        counter += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_embedder_is_deterministic_and_preserves_order() {
        let embedder = FakeEmbedder::new("fake-v1", 8);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let first = embedder.embed_batch(&texts).unwrap();
        let second = embedder.embed_batch(&texts).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].len(), 8);
        assert_ne!(first[0], first[1]);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
