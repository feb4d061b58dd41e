//! Nearest-neighbour retrieval over one company's collection.
//!
//! Retrieval operates entirely through the [`VectorStore`] trait. The
//! calling application embeds the query (with its own retry policy) and
//! hands the vector to [`search_collection`].
//!
//! # Ranking
//!
//! 1. Score every passage by cosine similarity to the query vector.
//! 2. Sort by score (desc), then `seq` (asc) so earlier passages win ties.
//! 3. Truncate to `k`, clamped to the collection size.

use std::cmp::Ordering;

use crate::embedding::cosine_similarity;
use crate::error::PipelineError;
use crate::models::{IndexedPassage, RetrievalResult, RetrievedPassage};
use crate::store::VectorStore;

/// Look up the live collection for `company` and rank it against
/// `query_vec`.
///
/// # Errors
///
/// - [`PipelineError::InvalidConfig`] if `k == 0`.
/// - [`PipelineError::IndexNotFound`] if the company has no collection.
/// - [`PipelineError::EmbeddingDimensionMismatch`] if the query vector's
///   length differs from the collection's dimensionality.
/// - [`PipelineError::Storage`] if the store cannot be read.
pub async fn search_collection<S: VectorStore + ?Sized>(
    store: &S,
    company: &str,
    query_vec: &[f32],
    k: usize,
) -> Result<RetrievalResult, PipelineError> {
    if k == 0 {
        return Err(PipelineError::InvalidConfig("k must be >= 1".to_string()));
    }

    let (info, passages) = store
        .load_collection(company)
        .await
        .map_err(|e| PipelineError::Storage(format!("{:#}", e)))?
        .ok_or_else(|| PipelineError::IndexNotFound {
            company: company.to_string(),
        })?;

    if query_vec.len() != info.dims {
        return Err(PipelineError::EmbeddingDimensionMismatch {
            expected: info.dims,
            actual: query_vec.len(),
        });
    }

    Ok(RetrievalResult {
        hits: rank(query_vec, &passages, k),
    })
}

/// Score and order `passages` against `query_vec`, keeping the best `k`.
pub fn rank(query_vec: &[f32], passages: &[IndexedPassage], k: usize) -> Vec<RetrievedPassage> {
    let mut hits: Vec<RetrievedPassage> = passages
        .iter()
        .map(|ip| RetrievedPassage {
            passage: ip.passage.clone(),
            score: cosine_similarity(query_vec, &ip.vector),
        })
        .collect();
    sort_hits(&mut hits);
    hits.truncate(k);
    hits
}

/// Order hits by descending score, ties by ascending passage `seq`.
pub fn sort_hits(hits: &mut [RetrievedPassage]) {
    hits.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.passage.seq.cmp(&b.passage.seq),
        other => other,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CollectionInfo, Passage};
    use crate::store::memory::InMemoryStore;

    fn ip(seq: usize, vector: Vec<f32>) -> IndexedPassage {
        IndexedPassage {
            passage: Passage {
                id: format!("A-{:05}", seq),
                company_code: "A".into(),
                seq,
                start: seq,
                end: seq + 1,
                text: format!("t{}", seq),
                hash: String::new(),
            },
            vector,
        }
    }

    async fn store_with(passages: Vec<IndexedPassage>) -> InMemoryStore {
        let store = InMemoryStore::new();
        let count = passages.len();
        store.stage_passages("A", "v1", &passages).await.unwrap();
        store
            .commit_collection(&CollectionInfo {
                company_code: "A".into(),
                version: "v1".into(),
                model: "m".into(),
                dims: 2,
                passage_count: count,
                chunk_size: 10,
                overlap: 2,
                source_hash: String::new(),
                built_at: 0,
            })
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_rank_orders_by_score() {
        let passages = vec![
            ip(0, vec![0.0, 1.0]),
            ip(1, vec![1.0, 0.0]),
            ip(2, vec![1.0, 1.0]),
        ];
        let hits = rank(&[1.0, 0.0], &passages, 3);
        let seqs: Vec<usize> = hits.iter().map(|h| h.passage.seq).collect();
        assert_eq!(seqs, vec![1, 2, 0]);
    }

    #[test]
    fn test_ties_broken_by_seq() {
        let passages = vec![
            ip(3, vec![1.0, 0.0]),
            ip(1, vec![2.0, 0.0]),
            ip(2, vec![0.5, 0.0]),
        ];
        let hits = rank(&[1.0, 0.0], &passages, 2);
        let seqs: Vec<usize> = hits.iter().map(|h| h.passage.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_k_larger_than_collection_is_clamped() {
        let store = store_with(vec![
            ip(0, vec![1.0, 0.0]),
            ip(1, vec![0.0, 1.0]),
            ip(2, vec![1.0, 1.0]),
        ])
        .await;
        let result = search_collection(&store, "A", &[1.0, 0.2], 5).await.unwrap();
        assert_eq!(result.len(), 3);
        for w in result.hits.windows(2) {
            assert!(w[0].score >= w[1].score);
        }
    }

    #[tokio::test]
    async fn test_repeat_queries_identical() {
        let store = store_with(vec![ip(0, vec![1.0, 0.0]), ip(1, vec![1.0, 0.0])]).await;
        let a = search_collection(&store, "A", &[1.0, 0.0], 2).await.unwrap();
        let b = search_collection(&store, "A", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.passage_ids(), vec!["A-00000", "A-00001"]);
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let store = InMemoryStore::new();
        let err = search_collection(&store, "A", &[1.0, 0.0], 3).await.unwrap_err();
        assert!(matches!(err, PipelineError::IndexNotFound { .. }));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_and_zero_k() {
        let store = store_with(vec![ip(0, vec![1.0, 0.0])]).await;
        let err = search_collection(&store, "A", &[1.0, 0.0, 0.0], 3)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::EmbeddingDimensionMismatch {
                expected: 2,
                actual: 3
            }
        );
        let err = search_collection(&store, "A", &[1.0, 0.0], 0).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
