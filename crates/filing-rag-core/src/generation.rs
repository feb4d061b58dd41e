//! Text-generation capability trait.
//!
//! Concrete backends (OpenAI chat completions, Ollama) live in the
//! `filing-rag` app crate's `llm` module.

use async_trait::async_trait;

use crate::error::ServiceError;

/// A language-generation backend.
///
/// Like [`EmbeddingProvider`](crate::embedding::EmbeddingProvider),
/// `generate` makes a single attempt and classifies its failure.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier recorded in summary artifacts.
    fn model_name(&self) -> &str;
    /// Complete `prompt` and return the raw response text.
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}
