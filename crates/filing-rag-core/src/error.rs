//! Error taxonomy for the indexing and summarization pipeline.
//!
//! [`PipelineError`] is the permanent, per-company failure surfaced to the
//! orchestrator. [`ServiceError`] classifies a single call to an external
//! capability (embedding, generation) so the retry loop knows whether
//! another attempt can help.

use thiserror::Error;

/// A stage-level failure attributable to one company.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    /// Bad chunking or retrieval parameters. Raised before any I/O.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Retrieval was attempted before the company's collection was built.
    #[error("no index collection for company {company}; build it first")]
    IndexNotFound { company: String },

    /// Embedding or storage failed after retries. The previous collection,
    /// if any, is left intact.
    #[error("index build failed for {company}: {reason}")]
    IndexBuildFailed { company: String, reason: String },

    /// A vector did not match the collection or provider dimensionality.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    /// The language-generation capability failed after retries.
    #[error("summary generation failed for {company}: {reason}")]
    GenerationFailed { company: String, reason: String },

    /// Another build currently holds the company's build marker.
    #[error("an index build for {company} is already in progress")]
    BuildInProgress { company: String },

    /// The filing document is missing, unreadable, or has no text.
    #[error("filing document unavailable for {company}: {reason}")]
    DocumentUnavailable { company: String, reason: String },

    /// Retrieval produced no grounding context to summarize.
    #[error("no grounding context retrieved for {company}")]
    EmptyContext { company: String },

    /// The summary artifact could not be written.
    #[error("failed to write summary for {company}: {reason}")]
    OutputWriteFailed { company: String, reason: String },

    /// Vector store I/O failed outside of an index build.
    #[error("vector store error: {0}")]
    Storage(String),

    /// The orchestrator tried to skip or repeat a stage.
    #[error("{company}: cannot move from {from} to {to}")]
    StageOrder {
        company: String,
        from: String,
        to: String,
    },
}

impl PipelineError {
    /// Short machine-friendly label used in run reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidConfig(_) => "InvalidConfig",
            PipelineError::IndexNotFound { .. } => "IndexNotFound",
            PipelineError::IndexBuildFailed { .. } => "IndexBuildFailed",
            PipelineError::EmbeddingDimensionMismatch { .. } => "EmbeddingDimensionMismatch",
            PipelineError::GenerationFailed { .. } => "GenerationFailed",
            PipelineError::BuildInProgress { .. } => "BuildInProgress",
            PipelineError::DocumentUnavailable { .. } => "DocumentUnavailable",
            PipelineError::EmptyContext { .. } => "EmptyContext",
            PipelineError::OutputWriteFailed { .. } => "OutputWriteFailed",
            PipelineError::Storage(_) => "Storage",
            PipelineError::StageOrder { .. } => "StageOrder",
        }
    }
}

/// Outcome classification for one call to an external capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Network failure, rate limit, server error, or an unusable response
    /// that a later attempt may fix.
    #[error("transient: {0}")]
    Transient(String),

    /// A failure that will not change on retry (bad request, auth, disabled
    /// provider, malformed response).
    #[error("{0}")]
    Permanent(String),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            ServiceError::Transient(m) | ServiceError::Permanent(m) => m,
        }
    }
}
