//! Filing discovery and text extraction.
//!
//! A company's filing is its explicit `filing` path, or the first file
//! (sorted by relative path) under `filings.dir` whose file name matches
//! `filings.pattern` with `{code}` substituted. Matching is
//! case-insensitive, so `*.pdf` also finds `REPORT.PDF`.
//!
//! PDFs go through `pdf-extract`; `.txt` and `.md` are read as UTF-8.
//! Extracted text has its whitespace runs collapsed to single spaces.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::GlobBuilder;
use walkdir::WalkDir;

use filing_rag_core::models::RawDocument;
use filing_rag_core::PipelineError;

use crate::config::{CompanyConfig, Config, FilingsConfig};

/// Locate the filing for `company`, or `None` if nothing matches.
pub fn resolve_filing(filings: &FilingsConfig, company: &CompanyConfig) -> Result<Option<PathBuf>> {
    if let Some(path) = &company.filing {
        return Ok(Some(path.clone()));
    }

    let root = &filings.dir;
    if !root.exists() {
        return Ok(None);
    }

    let pattern = filings.pattern.replace("{code}", &company.code);
    let matcher = GlobBuilder::new(&pattern)
        .case_insensitive(true)
        .literal_separator(true)
        .build()
        .with_context(|| format!("Invalid filings.pattern: {}", pattern))?
        .compile_matcher();

    let mut candidates = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if matcher.is_match(name.as_ref()) {
            candidates.push(entry.into_path());
        }
    }

    // Sort for deterministic ordering
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Run `filing-rag companies`: list configured companies and their filings.
pub fn list_companies(config: &Config) -> Result<()> {
    if config.companies.is_empty() {
        println!("No companies configured.");
        return Ok(());
    }

    println!(
        "{:<12} {:<28} {:<12} {:<16} {}",
        "CODE", "NAME", "REGION", "INDUSTRY", "FILING"
    );
    println!("{}", "-".repeat(96));
    for c in &config.companies {
        let filing = match resolve_filing(&config.filings, c) {
            Ok(Some(path)) => path.display().to_string(),
            Ok(None) => "(not found)".to_string(),
            Err(e) => format!("(error: {})", e),
        };
        println!(
            "{:<12} {:<28} {:<12} {:<16} {}",
            c.code,
            c.name.as_deref().unwrap_or("-"),
            c.region.as_deref().unwrap_or("-"),
            c.industry.as_deref().unwrap_or("-"),
            filing
        );
    }
    Ok(())
}

/// Resolve, read and normalize the filing for `company`.
///
/// # Errors
///
/// [`PipelineError::DocumentUnavailable`] if no filing is found, it cannot
/// be read or parsed, or it contains no text.
pub fn load_document(
    filings: &FilingsConfig,
    company: &CompanyConfig,
) -> Result<RawDocument, PipelineError> {
    let unavailable = |reason: String| PipelineError::DocumentUnavailable {
        company: company.code.clone(),
        reason,
    };

    let path = resolve_filing(filings, company)
        .map_err(|e| unavailable(format!("{:#}", e)))?
        .ok_or_else(|| {
            unavailable(format!(
                "no file matching '{}' under {}",
                filings.pattern.replace("{code}", &company.code),
                filings.dir.display()
            ))
        })?;

    let raw = extract_text(&path).map_err(|e| unavailable(format!("{:#}", e)))?;
    let text = normalize_whitespace(&raw);
    if text.is_empty() {
        return Err(unavailable(format!(
            "{} contains no extractable text",
            path.display()
        )));
    }

    Ok(RawDocument::new(
        &company.code,
        &path.display().to_string(),
        text,
    ))
}

/// Extract raw text from a filing by extension.
pub fn extract_text(path: &Path) -> Result<String> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| anyhow::anyhow!("PDF extraction failed for {}: {}", path.display(), e))
        }
        "txt" | "md" => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        other => bail!(
            "Unsupported filing format '.{}' for {}; expected .pdf, .txt or .md",
            other,
            path.display()
        ),
    }
}

/// Collapse every whitespace run to a single space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn company(code: &str) -> CompanyConfig {
        CompanyConfig {
            code: code.to_string(),
            name: None,
            region: None,
            industry: None,
            filing: None,
        }
    }

    fn filings(dir: &Path, pattern: &str) -> FilingsConfig {
        FilingsConfig {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
        }
    }

    #[test]
    fn test_discovers_first_sorted_match() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("2024")).unwrap();
        std::fs::write(tmp.path().join("2024/report_12044_b.txt"), "b").unwrap();
        std::fs::write(tmp.path().join("2024/report_12044_a.TXT"), "a").unwrap();
        std::fs::write(tmp.path().join("report_99999.txt"), "x").unwrap();

        let found = resolve_filing(&filings(tmp.path(), "*{code}*.txt"), &company("12044"))
            .unwrap()
            .unwrap();
        assert!(found.ends_with("2024/report_12044_a.TXT"));
    }

    #[test]
    fn test_explicit_path_wins() {
        let tmp = TempDir::new().unwrap();
        let mut c = company("A");
        c.filing = Some(PathBuf::from("/somewhere/else.pdf"));
        let found = resolve_filing(&filings(tmp.path(), "*{code}*.pdf"), &c).unwrap();
        assert_eq!(found, Some(PathBuf::from("/somewhere/else.pdf")));
    }

    #[test]
    fn test_load_normalizes_and_fingerprints() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("A.txt"), "  Net sales\n\n rose\t5%.  ").unwrap();
        let doc = load_document(&filings(tmp.path(), "{code}.txt"), &company("A")).unwrap();
        assert_eq!(doc.text, "Net sales rose 5%.");
        assert_eq!(doc.company_code, "A");
        assert_eq!(doc.fingerprint.len(), 64);
    }

    #[test]
    fn test_missing_and_empty_documents() {
        let tmp = TempDir::new().unwrap();
        let err = load_document(&filings(tmp.path(), "{code}.txt"), &company("A")).unwrap_err();
        assert!(matches!(err, PipelineError::DocumentUnavailable { .. }));

        std::fs::write(tmp.path().join("B.txt"), " \n ").unwrap();
        let err = load_document(&filings(tmp.path(), "{code}.txt"), &company("B")).unwrap_err();
        assert!(err.to_string().contains("no extractable text"));
    }

    #[test]
    fn test_invalid_pdf_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("C.pdf"), b"not a pdf").unwrap();
        let err = load_document(&filings(tmp.path(), "{code}.pdf"), &company("C")).unwrap_err();
        assert!(matches!(err, PipelineError::DocumentUnavailable { .. }));
    }

    #[test]
    fn test_unsupported_extension() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("x.docx");
        std::fs::write(&path, "x").unwrap();
        assert!(extract_text(&path).is_err());
    }
}
