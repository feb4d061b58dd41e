//! Grounding-context assembly.
//!
//! Turns a [`RetrievalResult`] into the single text block handed to the
//! generator. Greedy and relevance-first: passages are taken in retrieval
//! order, one that would overflow the budget is skipped, and assembly stops
//! once no further passage could fit.
//!
//! Lengths are counted in characters, never bytes.

use crate::models::RetrievalResult;

/// Placed between consecutive passages.
pub const SEPARATOR: &str = "\n\n---\n\n";

/// The assembled context and the passages that made it in, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledContext {
    pub text: String,
    pub passage_ids: Vec<String>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Assemble context text only.
pub fn assemble(results: &RetrievalResult, max_chars: usize) -> String {
    assemble_context(results, max_chars).text
}

/// Assemble context, keeping track of which passages were used.
///
/// - Never longer than `max_chars` characters; `max_chars == 0` yields an
///   empty context.
/// - A passage whose text is contained in an already included passage is
///   dropped as redundant.
/// - Empty `results` yields an empty context, not an error.
pub fn assemble_context(results: &RetrievalResult, max_chars: usize) -> AssembledContext {
    let sep_len = SEPARATOR.chars().count();
    let mut out = AssembledContext::default();
    let mut included: Vec<&str> = Vec::new();
    let mut used = 0usize;

    for hit in &results.hits {
        let text = hit.passage.text.as_str();
        if text.is_empty() {
            continue;
        }
        // Budget exhausted: not even a one-char passage fits.
        let overhead = if included.is_empty() { 0 } else { sep_len };
        if used + overhead >= max_chars {
            break;
        }
        if included.iter().any(|prev| prev.contains(text)) {
            continue;
        }

        let len = text.chars().count();
        if used + overhead + len > max_chars {
            continue;
        }

        if !included.is_empty() {
            out.text.push_str(SEPARATOR);
        }
        out.text.push_str(text);
        out.passage_ids.push(hit.passage.id.clone());
        included.push(text);
        used += overhead + len;
    }

    out
}
