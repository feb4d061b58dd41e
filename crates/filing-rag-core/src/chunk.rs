//! Fixed-window, overlapping text chunker.
//!
//! Splits a filing document's extracted text into [`Passage`]s of at most
//! `chunk_size` characters. Each passage after the first starts `overlap`
//! characters before the previous one ended, so context that straddles a
//! split boundary appears in both neighbours.
//!
//! # Algorithm
//!
//! 1. Validate `0 < overlap < chunk_size`.
//! 2. Work in character offsets (not bytes), so multi-byte text never
//!    splits inside a code point.
//! 3. Emit the window `[start, min(start + chunk_size, len))`.
//! 4. Stop once a window reaches the end of the text; otherwise advance
//!    `start` by `chunk_size - overlap`.
//!
//! Passage ids come from the company code and the zero-based sequence
//! index, never from content, so a rebuild after the document changes
//! produces replaceable ids at the same positions.
//!
//! # Example
//!
//! ```rust
//! use filing_rag_core::chunk::chunk_text;
//!
//! let text = "x".repeat(2500);
//! let passages = chunk_text("12044", &text, 1000, 100).unwrap();
//! let starts: Vec<usize> = passages.iter().map(|p| p.start).collect();
//! assert_eq!(starts, vec![0, 900, 1800]);
//! assert_eq!(passages.last().unwrap().end, 2500);
//! ```

use crate::error::PipelineError;
use crate::models::{sha256_hex, Passage, RawDocument};

/// Chunk a [`RawDocument`] using its company code for passage ids.
pub fn chunk_document(
    doc: &RawDocument,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Passage>, PipelineError> {
    chunk_text(&doc.company_code, &doc.text, chunk_size, overlap)
}

/// Split `text` into overlapping passages.
///
/// # Guarantees
///
/// - Passages are ordered by `start` with contiguous `seq` `0..N`.
/// - Every passage is at most `chunk_size` characters; only the last may
///   be shorter.
/// - Consecutive passages share exactly `overlap` characters, except that
///   the final window is simply cut at the end of the text.
/// - The passages cover the whole text with no gaps. Empty text yields no
///   passages.
///
/// # Errors
///
/// [`PipelineError::InvalidConfig`] if either parameter is zero or
/// `overlap >= chunk_size`.
pub fn chunk_text(
    company_code: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Passage>, PipelineError> {
    validate_params(chunk_size, overlap)?;

    // Byte offset of every char, plus the end of the string.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = offsets.len() - 1;
    let step = chunk_size - overlap;

    let mut passages = Vec::with_capacity(total / step + 1);
    let mut start = 0usize;

    while start < total {
        let end = (start + chunk_size).min(total);
        let slice = &text[offsets[start]..offsets[end]];
        passages.push(make_passage(company_code, passages.len(), start, end, slice));
        if end == total {
            break;
        }
        start += step;
    }

    Ok(passages)
}

/// Check chunking parameters without touching any text.
pub fn validate_params(chunk_size: usize, overlap: usize) -> Result<(), PipelineError> {
    if chunk_size == 0 {
        return Err(PipelineError::InvalidConfig(
            "chunk_size must be > 0".to_string(),
        ));
    }
    if overlap == 0 {
        return Err(PipelineError::InvalidConfig(
            "overlap must be > 0".to_string(),
        ));
    }
    if overlap >= chunk_size {
        return Err(PipelineError::InvalidConfig(format!(
            "overlap ({}) must be smaller than chunk_size ({})",
            overlap, chunk_size
        )));
    }
    Ok(())
}

/// Stable passage id for a company and sequence index.
pub fn passage_id(company_code: &str, seq: usize) -> String {
    format!("{}-{:05}", company_code, seq)
}

fn make_passage(company_code: &str, seq: usize, start: usize, end: usize, text: &str) -> Passage {
    Passage {
        id: passage_id(company_code, seq),
        company_code: company_code.to_string(),
        seq,
        start,
        end,
        text: text.to_string(),
        hash: sha256_hex(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rebuild the source from each passage's non-overlapping prefix.
    fn reconstruct(passages: &[Passage]) -> String {
        let mut out = String::new();
        for (i, p) in passages.iter().enumerate() {
            let unique_end = passages.get(i + 1).map(|n| n.start).unwrap_or(p.end);
            let take = unique_end - p.start;
            out.extend(p.text.chars().take(take));
        }
        out
    }

    #[test]
    fn test_filing_scenario_starts() {
        let text: String = (0..10_000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let passages = chunk_text("A", &text, 1000, 100).unwrap();
        let starts: Vec<usize> = passages.iter().map(|p| p.start).collect();
        let expected: Vec<usize> = (0..=10).map(|i| i * 900).filter(|s| *s < 10_000).collect();
        assert_eq!(starts, expected);
        assert_eq!(passages.last().unwrap().end, 10_000);
        for p in &passages[..passages.len() - 1] {
            assert_eq!(p.char_len(), 1000);
        }
    }

    #[test]
    fn test_reconstructs_exactly() {
        let text = "The company operates civil engineering and building construction \
                    businesses in the Tohoku region. Orders from public works grew.";
        for (size, overlap) in [(10, 3), (7, 1), (50, 49), (500, 10)] {
            let passages = chunk_text("A", text, size, overlap).unwrap();
            assert_eq!(reconstruct(&passages), text, "size={} overlap={}", size, overlap);
        }
    }

    #[test]
    fn test_overlap_is_repeated() {
        let passages = chunk_text("A", "abcdefghij", 4, 2).unwrap();
        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "cdef", "efgh", "ghij"]);
    }

    #[test]
    fn test_last_passage_shorter() {
        let passages = chunk_text("A", "abcdefg", 4, 1).unwrap();
        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "defg"]);
        let passages = chunk_text("A", "abcdefgh", 4, 1).unwrap();
        assert_eq!(passages.last().unwrap().text, "gh");
    }

    #[test]
    fn test_multibyte_offsets_are_chars() {
        let text = "有価証券報告書の要約を作成する";
        let passages = chunk_text("12044", text, 5, 2).unwrap();
        assert_eq!(passages[0].text, "有価証券報");
        assert_eq!(passages[1].start, 3);
        assert_eq!(passages[1].text, "券報告書の");
        assert_eq!(reconstruct(&passages), text);
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("A", "", 10, 2).unwrap().is_empty());
    }

    #[test]
    fn test_short_text_single_passage() {
        let passages = chunk_text("A", "short", 1000, 100).unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!((passages[0].start, passages[0].end), (0, 5));
    }

    #[test]
    fn test_invalid_params() {
        assert!(matches!(
            chunk_text("A", "abc", 10, 10),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(matches!(
            chunk_text("A", "abc", 10, 20),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(matches!(
            chunk_text("A", "abc", 0, 0),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(matches!(
            chunk_text("A", "abc", 10, 0),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_ids_positional_and_deterministic() {
        let a = chunk_text("A", "first version of the text", 8, 2).unwrap();
        let b = chunk_text("A", "second version, edited text", 8, 2).unwrap();
        assert_eq!(a[0].id, "A-00000");
        assert_eq!(a[1].id, b[1].id);
        assert_ne!(a[1].hash, b[1].hash);
        let again = chunk_text("A", "first version of the text", 8, 2).unwrap();
        assert_eq!(a, again);
    }
}
