//! Summary generation and persistence.
//!
//! One generation call per company: the instruction template is rendered
//! with the company metadata, the topic list and the assembled context, and
//! the response is validated (non-empty, bounded length) under the
//! generation retry policy.
//!
//! # Artifacts
//!
//! | File | Content |
//! |------|---------|
//! | `<dir>/<code>.summary.json` | [`SummaryOutput`] as pretty JSON |
//! | `<dir>/<code>.summary.txt` | header plus the summary text |
//! | `<dir>/prompt_log.jsonl` | one line per call: prompt and response (optional) |
//!
//! Both summary files are written to `*.tmp` and renamed into place, so a
//! failed run never leaves a partial artifact behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use filing_rag_core::context::AssembledContext;
use filing_rag_core::generation::TextGenerator;
use filing_rag_core::models::{Company, SummaryOutput};
use filing_rag_core::prompt::{validate_response, InstructionTemplate};
use filing_rag_core::PipelineError;

use crate::config::Config;
use crate::retry::{with_retry, RetryPolicy};

const PROMPT_LOG: &str = "prompt_log.jsonl";

#[derive(Debug, Clone)]
pub struct SummarySettings {
    pub max_response_chars: usize,
    pub retry: RetryPolicy,
    pub output_dir: PathBuf,
    pub prompt_log: bool,
    /// Write artifacts; off for `--no-save`.
    pub save: bool,
}

impl SummarySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_response_chars: config.generation.max_response_chars,
            retry: config.generation.retry_policy(),
            output_dir: config.output.dir.clone(),
            prompt_log: config.output.prompt_log,
            save: true,
        }
    }
}

pub struct Summarizer<'a> {
    generator: &'a dyn TextGenerator,
    template: &'a InstructionTemplate,
    settings: SummarySettings,
}

impl<'a> Summarizer<'a> {
    pub fn new(
        generator: &'a dyn TextGenerator,
        template: &'a InstructionTemplate,
        settings: SummarySettings,
    ) -> Self {
        Self {
            generator,
            template,
            settings,
        }
    }

    /// Path of the JSON artifact for `code`.
    pub fn artifact_path(&self, code: &str) -> PathBuf {
        self.settings.output_dir.join(format!("{}.summary.json", code))
    }

    /// Generate the summary for `company` from `context` and, unless saving
    /// is off, persist it over any previous summary.
    pub async fn generate_summary(
        &self,
        company: &Company,
        queries: &[String],
        context: &AssembledContext,
    ) -> Result<SummaryOutput, PipelineError> {
        if context.is_empty() {
            return Err(PipelineError::EmptyContext {
                company: company.code.clone(),
            });
        }

        let prompt = self.template.render(company, queries, &context.text);
        let label = format!("generate summary for {}", company.code);
        let max_chars = self.settings.max_response_chars;
        let generator = self.generator;
        let prompt_ref = prompt.as_str();
        let summary = with_retry(&self.settings.retry, &label, || async move {
            let raw = generator.generate(prompt_ref).await?;
            validate_response(&raw, max_chars)
        })
        .await
        .map_err(|e| PipelineError::GenerationFailed {
            company: company.code.clone(),
            reason: e.to_string(),
        })?;

        let output = SummaryOutput {
            company_code: company.code.clone(),
            summary,
            queries: queries.to_vec(),
            passage_ids: context.passage_ids.clone(),
            model: self.generator.model_name().to_string(),
            generated_at: Utc::now(),
        };

        if self.settings.save {
            let path = write_summary(&self.settings.output_dir, &output).map_err(|e| {
                PipelineError::OutputWriteFailed {
                    company: company.code.clone(),
                    reason: format!("{:#}", e),
                }
            })?;
            info!(company = %company.code, path = %path.display(), "summary written");

            if self.settings.prompt_log {
                if let Err(e) = append_prompt_log(&self.settings.output_dir, &output, &prompt) {
                    warn!(company = %company.code, error = %e, "failed to append prompt log");
                }
            }
        }

        Ok(output)
    }
}

/// Write `<code>.summary.json` and `<code>.summary.txt` as a pair.
/// Returns the JSON path.
///
/// Both files are staged as `.tmp` siblings and then renamed, JSON first.
/// On any failure the staged files are removed, and a JSON file already
/// renamed into place is removed again, so a failed write never leaves a
/// new artifact behind.
pub fn write_summary(dir: &Path, output: &SummaryOutput) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let json_path = dir.join(format!("{}.summary.json", output.company_code));
    let txt_path = dir.join(format!("{}.summary.txt", output.company_code));
    let json_tmp = tmp_path(&json_path);
    let txt_tmp = tmp_path(&txt_path);

    let result = stage_and_swap(output, &json_path, &json_tmp, &txt_path, &txt_tmp);
    if result.is_err() {
        let _ = std::fs::remove_file(&json_tmp);
        let _ = std::fs::remove_file(&txt_tmp);
    }
    result.map(|_| json_path)
}

fn stage_and_swap(
    output: &SummaryOutput,
    json_path: &Path,
    json_tmp: &Path,
    txt_path: &Path,
    txt_tmp: &Path,
) -> Result<()> {
    let json = serde_json::to_string_pretty(output)?;
    stage_file(json_tmp, json.as_bytes())?;
    stage_file(txt_tmp, render_text(output).as_bytes())?;

    std::fs::rename(json_tmp, json_path)
        .with_context(|| format!("Failed to replace {}", json_path.display()))?;
    if let Err(e) = std::fs::rename(txt_tmp, txt_path) {
        // The pair is incomplete: take back the JSON and any older text file.
        let _ = std::fs::remove_file(json_path);
        let _ = std::fs::remove_file(txt_path);
        return Err(e).with_context(|| format!("Failed to replace {}", txt_path.display()));
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn stage_file(tmp: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(tmp, bytes).with_context(|| format!("Failed to write {}", tmp.display()))
}

/// Human-readable rendering of a summary artifact.
pub fn render_text(output: &SummaryOutput) -> String {
    format!(
        "Company: {}\nGenerated: {}\nModel: {}\nTopics: {}\nPassages: {}\n\n{}\n",
        output.company_code,
        output.generated_at.to_rfc3339(),
        output.model,
        output.queries.join("; "),
        output.passage_ids.join(", "),
        output.summary
    )
}

fn append_prompt_log(dir: &Path, output: &SummaryOutput, prompt: &str) -> Result<()> {
    let line = serde_json::json!({
        "company": output.company_code,
        "model": output.model,
        "generated_at": output.generated_at.to_rfc3339(),
        "prompt": prompt,
        "response": output.summary,
    });
    let path = dir.join(PROMPT_LOG);
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    writeln!(file, "{}", serde_json::to_string(&line)?)?;
    Ok(())
}
