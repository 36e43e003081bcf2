//! Deterministic feature-hashing embedder.
//!
//! Each lowercased alphanumeric token is hashed with SHA-256; the first eight
//! bytes pick a bucket and the ninth byte picks a sign. The bucket counts are
//! L2-normalized, so texts sharing vocabulary land close together. Useful for
//! offline setups and tests where a real model is unavailable.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use threadvec_core::embedding::{normalize, Embedder};

use crate::config::EmbeddingConfig;

const DEFAULT_MODEL: &str = "hash-v1";

pub struct HashEmbedder {
    model: String,
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Result<Self> {
        if dims == 0 {
            bail!("hash embedder needs dims > 0");
        }
        Ok(Self {
            model: DEFAULT_MODEL.to_string(),
            dims,
        })
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let mut embedder = Self::new(config.dims.unwrap_or(0))?;
        if let Some(model) = &config.model {
            embedder.model = model.clone();
        }
        Ok(embedder)
    }

    /// Synchronous core of [`Embedder::embed`].
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}
