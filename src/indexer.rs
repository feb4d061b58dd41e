//! Embedding indexer: idempotent, copy-then-swap collection builds.
//!
//! # Build
//!
//! 1. If the company already has a collection and `force` is false, report
//!    [`IndexAction::AlreadyExists`] without embedding anything.
//! 2. Claim the company's build marker under a fresh UUID version.
//! 3. Embed passages in batches of `embedding.batch_size`, each batch with
//!    bounded retry.
//! 4. Stage every passage and vector under the new version.
//! 5. Commit: repoint the collection and drop the previous version.
//!
//! Any failure in steps 3-5 discards the staged rows and leaves the previous
//! collection (or its absence) untouched. The marker is always released.

use filing_rag_core::embedding::EmbeddingProvider;
use filing_rag_core::models::{CollectionInfo, IndexAction, IndexResult, IndexedPassage, Passage};
use filing_rag_core::store::VectorStore;
use filing_rag_core::PipelineError;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embedding::embed_sanitized;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::retry::{with_retry, RetryPolicy};

/// Tuning values the indexer needs, lifted out of [`Config`].
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub chunk_size: usize,
    pub overlap: usize,
    pub batch_size: usize,
    pub max_input_chars: usize,
    pub lock_timeout_secs: i64,
    pub retry: RetryPolicy,
}

impl IndexSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunking.chunk_size,
            overlap: config.chunking.overlap,
            batch_size: config.embedding.batch_size.max(1),
            max_input_chars: config.embedding.max_input_chars,
            lock_timeout_secs: config.index.lock_timeout_secs,
            retry: config.embedding.retry_policy(),
        }
    }
}

pub struct Indexer<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn EmbeddingProvider,
    settings: IndexSettings,
    progress: &'a dyn ProgressReporter,
}

impl<'a> Indexer<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        embedder: &'a dyn EmbeddingProvider,
        settings: IndexSettings,
        progress: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            store,
            embedder,
            settings,
            progress,
        }
    }

    /// Build (or reuse) the collection for `company` from `passages`.
    ///
    /// `source_hash` is the fingerprint of the document the passages came
    /// from; it is stored with the collection and compared on reuse.
    pub async fn build_index(
        &self,
        company: &str,
        passages: &[Passage],
        source_hash: &str,
        force: bool,
    ) -> Result<IndexResult, PipelineError> {
        let build_failed = |reason: String| PipelineError::IndexBuildFailed {
            company: company.to_string(),
            reason,
        };

        let existing = self
            .store
            .collection(company)
            .await
            .map_err(|e| build_failed(format!("{:#}", e)))?;

        if let Some(collection) = existing {
            if !force {
                self.warn_if_stale(&collection, source_hash);
                info!(
                    company,
                    version = %collection.version,
                    passages = collection.passage_count,
                    "index already exists, reusing"
                );
                return Ok(IndexResult {
                    action: IndexAction::AlreadyExists,
                    collection,
                });
            }
        }

        let version = uuid::Uuid::new_v4().to_string();
        let acquired = self
            .store
            .try_acquire_build(company, &version, self.settings.lock_timeout_secs)
            .await
            .map_err(|e| build_failed(format!("{:#}", e)))?;
        if !acquired {
            return Err(PipelineError::BuildInProgress {
                company: company.to_string(),
            });
        }

        let outcome = self
            .build_version(company, &version, passages, source_hash)
            .await;

        if outcome.is_err() {
            if let Err(e) = self.store.discard_version(company, &version).await {
                warn!(company, version = %version, error = %e, "failed to discard staged passages");
            }
        }
        if let Err(e) = self.store.release_build(company, &version).await {
            warn!(company, version = %version, error = %e, "failed to release build marker");
        }

        outcome
    }

    async fn build_version(
        &self,
        company: &str,
        version: &str,
        passages: &[Passage],
        source_hash: &str,
    ) -> Result<IndexResult, PipelineError> {
        let build_failed = |reason: String| PipelineError::IndexBuildFailed {
            company: company.to_string(),
            reason,
        };

        let vectors = self.embed_all(company, passages).await?;
        let indexed: Vec<IndexedPassage> = passages
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(passage, vector)| IndexedPassage { passage, vector })
            .collect();

        self.store
            .stage_passages(company, version, &indexed)
            .await
            .map_err(|e| build_failed(format!("staging failed: {:#}", e)))?;

        let collection = CollectionInfo {
            company_code: company.to_string(),
            version: version.to_string(),
            model: self.embedder.model_name().to_string(),
            dims: self.embedder.dims(),
            passage_count: indexed.len(),
            chunk_size: self.settings.chunk_size,
            overlap: self.settings.overlap,
            source_hash: source_hash.to_string(),
            built_at: chrono::Utc::now().timestamp(),
        };

        let previous = self
            .store
            .commit_collection(&collection)
            .await
            .map_err(|e| build_failed(format!("commit failed: {:#}", e)))?;

        info!(
            company,
            version,
            previous = previous.as_deref().unwrap_or("-"),
            passages = collection.passage_count,
            model = %collection.model,
            "index built"
        );

        Ok(IndexResult {
            action: IndexAction::Built,
            collection,
        })
    }

    async fn embed_all(
        &self,
        company: &str,
        passages: &[Passage],
    ) -> Result<Vec<Vec<f32>>, PipelineError> {
        let dims = self.embedder.dims();
        let total = passages.len() as u64;
        let mut vectors = Vec::with_capacity(passages.len());

        for (batch_no, batch) in passages.chunks(self.settings.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
            let label = format!("embed {} batch {}", company, batch_no);
            let batch_vectors = with_retry(&self.settings.retry, &label, || {
                embed_sanitized(self.embedder, &texts, self.settings.max_input_chars)
            })
            .await
            .map_err(|e| PipelineError::IndexBuildFailed {
                company: company.to_string(),
                reason: format!("embedding failed: {}", e),
            })?;

            for v in &batch_vectors {
                if v.len() != dims {
                    return Err(PipelineError::EmbeddingDimensionMismatch {
                        expected: dims,
                        actual: v.len(),
                    });
                }
            }
            vectors.extend(batch_vectors);

            debug!(company, batch = batch_no, done = vectors.len(), "embedded batch");
            self.progress.report(ProgressEvent::Embedding {
                code: company.to_string(),
                n: vectors.len() as u64,
                total,
            });
        }

        Ok(vectors)
    }

    fn warn_if_stale(&self, collection: &CollectionInfo, source_hash: &str) {
        if collection.source_hash != source_hash {
            warn!(
                company = %collection.company_code,
                "filing changed since the index was built; rerun with --force to rebuild"
            );
        }
        if collection.chunk_size != self.settings.chunk_size
            || collection.overlap != self.settings.overlap
        {
            warn!(
                company = %collection.company_code,
                built_chunk_size = collection.chunk_size,
                built_overlap = collection.overlap,
                chunk_size = self.settings.chunk_size,
                overlap = self.settings.overlap,
                "index was built with different chunking; rerun with --force to rebuild"
            );
        }
        if collection.model != self.embedder.model_name() {
            warn!(
                company = %collection.company_code,
                built_model = %collection.model,
                model = self.embedder.model_name(),
                "index was built with a different embedding model"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use filing_rag_core::chunk::chunk_text;
    use filing_rag_core::store::memory::InMemoryStore;
    use filing_rag_core::ServiceError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::embedding::HashEmbedder;
    use crate::progress::NoProgress;

    fn settings() -> IndexSettings {
        IndexSettings {
            chunk_size: 20,
            overlap: 5,
            batch_size: 2,
            max_input_chars: 1000,
            lock_timeout_secs: 3600,
            retry: RetryPolicy::immediate(3),
        }
    }

    /// Embeds normally for the first `ok_calls` calls, then fails.
    struct FailingAfter {
        inner: HashEmbedder,
        ok_calls: usize,
        calls: AtomicUsize,
        transient: bool,
    }

    impl FailingAfter {
        fn new(ok_calls: usize, transient: bool) -> Self {
            Self {
                inner: HashEmbedder::new(16),
                ok_calls,
                calls: AtomicUsize::new(0),
                transient,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FailingAfter {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            16
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.ok_calls {
                self.inner.embed(texts).await
            } else if self.transient {
                Err(ServiceError::Transient("503 service unavailable".into()))
            } else {
                Err(ServiceError::Permanent("400 bad request".into()))
            }
        }
    }

    struct WrongDims;

    #[async_trait]
    impl EmbeddingProvider for WrongDims {
        fn model_name(&self) -> &str {
            "wrong"
        }
        fn dims(&self) -> usize {
            8
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
            Ok(texts.iter().map(|_| vec![1.0; 4]).collect())
        }
    }

    const TEXT: &str = "The company builds roads, bridges and public facilities across the region.";

    #[tokio::test]
    async fn test_second_build_without_force_is_noop() {
        let store = InMemoryStore::new();
        let embedder = HashEmbedder::new(16);
        let indexer = Indexer::new(&store, &embedder, settings(), &NoProgress);
        let passages = chunk_text("A", TEXT, 20, 5).unwrap();

        let first = indexer.build_index("A", &passages, "h1", false).await.unwrap();
        assert_eq!(first.action, IndexAction::Built);
        let before = store.load_collection("A").await.unwrap().unwrap();

        let second = indexer.build_index("A", &passages, "h1", false).await.unwrap();
        assert_eq!(second.action, IndexAction::AlreadyExists);
        assert_eq!(second.collection.passage_count, first.collection.passage_count);
        let after = store.load_collection("A").await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_force_replaces_collection() {
        let store = InMemoryStore::new();
        let embedder = HashEmbedder::new(16);
        let indexer = Indexer::new(&store, &embedder, settings(), &NoProgress);
        let long = chunk_text("A", TEXT, 20, 5).unwrap();
        indexer.build_index("A", &long, "h1", false).await.unwrap();

        let short = chunk_text("A", &TEXT[..30], 20, 5).unwrap();
        let rebuilt = indexer.build_index("A", &short, "h2", true).await.unwrap();
        assert_eq!(rebuilt.action, IndexAction::Built);

        let (_, passages) = store.load_collection("A").await.unwrap().unwrap();
        let ids: Vec<String> = passages.iter().map(|p| p.passage.id.clone()).collect();
        assert_eq!(ids.len(), short.len());
        assert!(!ids.contains(&long.last().unwrap().id));
        assert_eq!(store.stored_versions().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_collection() {
        let store = InMemoryStore::new();
        let good = HashEmbedder::new(16);
        let passages = chunk_text("A", TEXT, 20, 5).unwrap();
        Indexer::new(&store, &good, settings(), &NoProgress)
            .build_index("A", &passages, "h1", false)
            .await
            .unwrap();
        let before = store.load_collection("A").await.unwrap().unwrap();

        // First batch succeeds, the second keeps failing.
        let flaky = FailingAfter::new(1, true);
        let err = Indexer::new(&store, &flaky, settings(), &NoProgress)
            .build_index("A", &passages, "h2", true)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::IndexBuildFailed { .. }));
        // One good call plus three attempts on the failing batch.
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 4);

        assert_eq!(store.load_collection("A").await.unwrap().unwrap(), before);
        assert_eq!(store.stored_versions().len(), 1);
        assert!(!store.is_locked("A"));
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried_and_nothing_created() {
        let store = InMemoryStore::new();
        let broken = FailingAfter::new(0, false);
        let passages = chunk_text("A", TEXT, 20, 5).unwrap();
        let err = Indexer::new(&store, &broken, settings(), &NoProgress)
            .build_index("A", &passages, "h", false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("400 bad request"));
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
        assert!(store.collection("A").await.unwrap().is_none());
        assert!(store.stored_versions().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_fast() {
        let store = InMemoryStore::new();
        let passages = chunk_text("A", TEXT, 20, 5).unwrap();
        let err = Indexer::new(&store, &WrongDims, settings(), &NoProgress)
            .build_index("A", &passages, "h", false)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::EmbeddingDimensionMismatch {
                expected: 8,
                actual: 4
            }
        );
    }

    #[tokio::test]
    async fn test_build_in_progress() {
        let store = InMemoryStore::new();
        store.try_acquire_build("A", "other", 3600).await.unwrap();
        let embedder = HashEmbedder::new(16);
        let passages = chunk_text("A", TEXT, 20, 5).unwrap();
        let err = Indexer::new(&store, &embedder, settings(), &NoProgress)
            .build_index("A", &passages, "h", false)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::BuildInProgress { .. }));
        assert!(store.is_locked("A"));
    }
}
