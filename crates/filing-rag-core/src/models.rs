//! Core data models that flow through the indexing and summarization
//! pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Reference data for one company. Loaded from configuration and never
/// mutated by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Company {
    /// Company code; also the key of its index collection.
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
}

impl Company {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: None,
            region: None,
            industry: None,
        }
    }

    /// Human-readable label: the name if configured, else the code.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.code)
    }
}

/// Extracted text of one company's filing document.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub company_code: String,
    /// Where the text came from (file path, page range, ...).
    pub source: String,
    pub text: String,
    /// SHA-256 of `text`, used to detect a reused collection built from a
    /// different document.
    pub fingerprint: String,
}

impl RawDocument {
    pub fn new(company_code: &str, source: &str, text: String) -> Self {
        let fingerprint = sha256_hex(&text);
        Self {
            company_code: company_code.to_string(),
            source: source.to_string(),
            text,
            fingerprint,
        }
    }

    /// Length in characters (not bytes).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A contiguous slice of a [`RawDocument`], the unit of embedding and
/// retrieval.
///
/// `start` and `end` are character offsets into the source text, `end`
/// exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// Stable id derived from company code and `seq`.
    pub id: String,
    pub company_code: String,
    /// Zero-based position within the document.
    pub seq: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

impl Passage {
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// A passage together with its embedding vector, as persisted in a
/// collection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPassage {
    pub passage: Passage,
    pub vector: Vec<f32>,
}

/// Metadata describing the live version of one company's collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    pub company_code: String,
    /// Version id of the passage set the collection currently points at.
    pub version: String,
    pub model: String,
    pub dims: usize,
    pub passage_count: usize,
    pub chunk_size: usize,
    pub overlap: usize,
    /// Fingerprint of the document the collection was built from.
    pub source_hash: String,
    /// Unix timestamp (seconds) of the swap that made this version live.
    pub built_at: i64,
}

/// Whether a build call produced a new collection version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexAction {
    /// A collection existed and `force` was false; nothing was recomputed.
    AlreadyExists,
    /// A new version was embedded and swapped in.
    Built,
}

impl std::fmt::Display for IndexAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexAction::AlreadyExists => write!(f, "already_exists"),
            IndexAction::Built => write!(f, "built"),
        }
    }
}

/// Result of an index build call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexResult {
    pub action: IndexAction,
    pub collection: CollectionInfo,
}

/// One retrieved passage with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    pub passage: Passage,
    pub score: f32,
}

/// Passages ranked by descending score, ties by ascending `seq`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievedPassage>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn passage_ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.passage.id.as_str()).collect()
    }

    /// Merge results of several queries over the same collection.
    ///
    /// Each passage appears once with its highest score; the merged list
    /// keeps the retrieval order (score descending, then `seq`).
    pub fn merge(results: impl IntoIterator<Item = RetrievalResult>) -> RetrievalResult {
        let mut best: Vec<RetrievedPassage> = Vec::new();
        for result in results {
            for hit in result.hits {
                match best.iter_mut().find(|b| b.passage.id == hit.passage.id) {
                    Some(existing) => {
                        if hit.score > existing.score {
                            existing.score = hit.score;
                        }
                    }
                    None => best.push(hit),
                }
            }
        }
        crate::retrieve::sort_hits(&mut best);
        RetrievalResult { hits: best }
    }
}

/// The persisted per-company summary artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryOutput {
    pub company_code: String,
    pub summary: String,
    /// Topic queries the grounding context was retrieved for.
    pub queries: Vec<String>,
    /// Passage ids that made it into the grounding context, in context
    /// order.
    pub passage_ids: Vec<String>,
    pub model: String,
    pub generated_at: DateTime<Utc>,
}

/// Hex-encoded SHA-256 of a string.
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
