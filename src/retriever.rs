//! Query-time retrieval: embed a query with retry, then rank the company's
//! collection through the core [`search_collection`].

use filing_rag_core::embedding::EmbeddingProvider;
use filing_rag_core::models::RetrievalResult;
use filing_rag_core::retrieve::search_collection;
use filing_rag_core::store::VectorStore;
use filing_rag_core::PipelineError;
use tracing::debug;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_provider, embed_sanitized};
use crate::retry::{with_retry, RetryPolicy};
use crate::sqlite_store::SqliteStore;

pub struct Retriever<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn EmbeddingProvider,
    retry: RetryPolicy,
    max_input_chars: usize,
}

impl<'a> Retriever<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        embedder: &'a dyn EmbeddingProvider,
        retry: RetryPolicy,
        max_input_chars: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            retry,
            max_input_chars,
        }
    }

    /// Top-`k` passages of `company`'s collection for `query`.
    ///
    /// The collection is checked before the query is embedded, so a missing
    /// index or a provider with the wrong dimensionality fails without a
    /// network call.
    pub async fn retrieve(
        &self,
        company: &str,
        query: &str,
        k: usize,
    ) -> Result<RetrievalResult, PipelineError> {
        if k == 0 {
            return Err(PipelineError::InvalidConfig("k must be >= 1".to_string()));
        }

        let info = self
            .store
            .collection(company)
            .await
            .map_err(|e| PipelineError::Storage(format!("{:#}", e)))?
            .ok_or_else(|| PipelineError::IndexNotFound {
                company: company.to_string(),
            })?;
        if info.dims != self.embedder.dims() {
            return Err(PipelineError::EmbeddingDimensionMismatch {
                expected: info.dims,
                actual: self.embedder.dims(),
            });
        }

        let texts = vec![query.to_string()];
        let label = format!("embed query for {}", company);
        let mut vectors = with_retry(&self.retry, &label, || {
            embed_sanitized(self.embedder, &texts, self.max_input_chars)
        })
        .await
        .map_err(|e| PipelineError::Storage(format!("query embedding failed: {}", e)))?;
        let query_vec = vectors.pop().unwrap_or_default();

        let result = search_collection(self.store, company, &query_vec, k).await?;
        debug!(company, query, hits = result.len(), "retrieved");
        Ok(result)
    }

    /// Retrieve every query and merge the hits by passage id.
    pub async fn retrieve_all(
        &self,
        company: &str,
        queries: &[String],
        k: usize,
    ) -> Result<RetrievalResult, PipelineError> {
        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            results.push(self.retrieve(company, query, k).await?);
        }
        Ok(RetrievalResult::merge(results))
    }
}

/// Run `filing-rag search`: retrieve and print ranked passages.
pub async fn run_search(
    config: &Config,
    code: &str,
    query: &str,
    k: Option<usize>,
) -> anyhow::Result<()> {
    if config.company(code).is_none() {
        anyhow::bail!(
            "Unknown company code: '{}'. Run `filing-rag companies` to list configured codes.",
            code
        );
    }
    if !config.embedding.is_enabled() {
        anyhow::bail!("Search requires an embedding provider. Set [embedding] provider in the config.");
    }
    let embedder = create_provider(&config.embedding)?;
    let pool = db::open(config).await?;
    let store = SqliteStore::new(pool.clone());
    let retriever = Retriever::new(
        &store,
        embedder.as_ref(),
        config.embedding.retry_policy(),
        config.embedding.max_input_chars,
    );

    let result = retriever
        .retrieve(code, query, k.unwrap_or(config.retrieval.top_k))
        .await?;
    pool.close().await;

    if result.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in result.hits.iter().enumerate() {
        println!(
            "{}. [{:.4}] {}  chars {}..{}",
            i + 1,
            hit.score,
            hit.passage.id,
            hit.passage.start,
            hit.passage.end
        );
        println!("    {}", snippet(&hit.passage.text, 240));
        println!();
    }
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}
