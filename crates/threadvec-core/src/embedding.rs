//! Embedding capability trait and vector utilities.
//!
//! Defines the [`Embedder`] trait every embedding backend implements, plus
//! pure helpers for vector serialization, distance, and score computation.
//!
//! Concrete providers (OpenAI, Ollama, hashing, fastembed) live in the
//! `threadvec` app crate.

use anyhow::Result;
use async_trait::async_trait;

/// The embedding capability consumed by the indexing pipeline and search.
///
/// Implementations may differ in dimensionality; the store they feed is
/// configured with one fixed length and rejects anything else.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Release provider resources. Most providers hold nothing.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use threadvec_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Euclidean (L2) distance between two vectors of equal length.
///
/// Callers validate lengths beforehand; mismatched inputs yield
/// `f64::INFINITY` so they can never rank first.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Map a distance onto a similarity score in `(0, 1]`.
///
/// ```text
/// score = 1 / (1 + distance)
/// ```
pub fn distance_to_score(distance: f64) -> f64 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}
