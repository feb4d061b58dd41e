//! Deterministic feature-hashing embedder.
//!
//! Each lowercase word token and each character bigram (whitespace
//! excluded, so CJK text without spaces still produces features) is hashed
//! with SHA-256 into one of `dims` buckets with a hash-derived sign. The
//! bucket vector is L2-normalized. Texts that share vocabulary land close
//! together under cosine similarity, which is enough for offline runs and
//! tests; it is not a semantic model.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use filing_rag_core::embedding::{l2_normalize, EmbeddingProvider};
use filing_rag_core::ServiceError;

use crate::config::EmbeddingConfig;

const DEFAULT_DIMS: usize = 256;
const WORD_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;

pub struct HashEmbedder {
    model: String,
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            model: format!("feature-hash-{}", dims),
            dims: dims.max(1),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let mut embedder = Self::new(config.dims.unwrap_or(DEFAULT_DIMS));
        if let Some(model) = &config.model {
            embedder.model = model.clone();
        }
        embedder
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        let lower = text.to_lowercase();

        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            self.add_feature(&mut v, "w", word, WORD_WEIGHT);
        }

        let chars: Vec<char> = lower.chars().filter(|c| !c.is_whitespace()).collect();
        for pair in chars.windows(2) {
            let bigram: String = pair.iter().collect();
            self.add_feature(&mut v, "b", &bigram, BIGRAM_WEIGHT);
        }

        l2_normalize(&mut v);
        v
    }

    fn add_feature(&self, v: &mut [f32], kind: &str, feature: &str, weight: f32) {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update([0u8]);
        hasher.update(feature.as_bytes());
        let digest = hasher.finalize();
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filing_rag_core::embedding::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalized() {
        let e = HashEmbedder::new(64);
        let a = e.embed_one("Revenue grew in the civil engineering segment");
        let b = e.embed_one("Revenue grew in the civil engineering segment");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let e = HashEmbedder::new(256);
        let q = e.embed_one("growth strategy");
        let near = e.embed_one("Our medium-term growth strategy targets public works.");
        let far = e.embed_one("Dividends per share were unchanged at 40 yen.");
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[test]
    fn test_cjk_text_produces_features() {
        let e = HashEmbedder::new(32);
        let v = e.embed_one("成長戦略");
        assert!(v.iter().any(|x| *x != 0.0));
    }

    #[test]
    fn test_empty_text_is_zero() {
        let e = HashEmbedder::new(8);
        assert_eq!(e.embed_one(""), vec![0.0; 8]);
    }
}
