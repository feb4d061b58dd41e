//! Instruction templates for summary generation.
//!
//! A template is plain text with `{placeholder}` markers:
//!
//! | Placeholder | Value |
//! |-------------|-------|
//! | `{company}` | company code |
//! | `{company_name}` | configured name, or the code |
//! | `{region}` / `{industry}` | configured locale metadata, or `"unknown"` |
//! | `{topics}` | the topic queries as a bullet list |
//! | `{context}` | the assembled grounding context (required) |

use crate::error::{PipelineError, ServiceError};
use crate::models::Company;

/// Built-in template used unless `generation.template_path` overrides it.
pub const DEFAULT_TEMPLATE: &str = "\
The following passages were extracted from the annual securities report of \
{company_name} (code {company}, region: {region}, industry: {industry}).

[Extracted text]
{context}

[Summary topics]
{topics}

Summarize the extracted text for each topic above. Use only information \
contained in the extracted text and include concrete figures and proper \
nouns where they appear. Answer as bullet points grouped by topic. If the \
text says nothing about a topic, say so instead of guessing.";

/// Topic queries used when neither configuration nor the command line
/// supplies any.
pub const DEFAULT_QUERIES: &[&str] = &[
    "business overview and main segments",
    "management policy and medium-term growth strategy",
    "business and financial risks",
    "financial condition and results of operations",
    "capital investment and research and development",
];

/// A validated instruction template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionTemplate {
    text: String,
}

impl Default for InstructionTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl InstructionTemplate {
    /// Wrap template text, rejecting templates without a `{context}` slot.
    pub fn new(text: impl Into<String>) -> Result<Self, PipelineError> {
        let text = text.into();
        if !text.contains("{context}") {
            return Err(PipelineError::InvalidConfig(
                "instruction template must contain a {context} placeholder".to_string(),
            ));
        }
        Ok(Self { text })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Render the prompt for one company.
    ///
    /// `{context}` is substituted last so placeholder-like text inside the
    /// filing is never expanded.
    pub fn render(&self, company: &Company, topics: &[String], context: &str) -> String {
        let topic_list = topics
            .iter()
            .map(|t| format!("- {}", t))
            .collect::<Vec<_>>()
            .join("\n");
        self.text
            .replace("{company_name}", company.display_name())
            .replace("{company}", &company.code)
            .replace("{region}", company.region.as_deref().unwrap_or("unknown"))
            .replace("{industry}", company.industry.as_deref().unwrap_or("unknown"))
            .replace("{topics}", &topic_list)
            .replace("{context}", context)
    }
}

/// Check a raw generation response.
///
/// Returns the trimmed text, or a transient error when it is empty or
/// longer than `max_chars` characters so another attempt can be made.
pub fn validate_response(raw: &str, max_chars: usize) -> Result<String, ServiceError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ServiceError::Transient(
            "generation returned an empty response".to_string(),
        ));
    }
    let len = text.chars().count();
    if len > max_chars {
        return Err(ServiceError::Transient(format!(
            "generation response too long ({} > {} chars)",
            len, max_chars
        )));
    }
    Ok(text.to_string())
}
