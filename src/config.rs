//! TOML configuration.
//!
//! A single file is parsed into an explicit [`Config`] that is passed down
//! to every component; nothing reads ambient global state except provider
//! construction, which picks up `OPENAI_API_KEY` from the environment.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use filing_rag_core::chunk;
use filing_rag_core::models::Company;
use filing_rag_core::prompt::{InstructionTemplate, DEFAULT_QUERIES};

use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub filings: FilingsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub companies: Vec<CompanyConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_queries")]
    pub queries: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
            queries: default_queries(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_max_context_chars() -> usize {
    12_000
}
fn default_queries() -> Vec<String> {
    DEFAULT_QUERIES.iter().map(|q| q.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            timeout_secs: default_embedding_timeout(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_millis(self.max_retries, self.backoff_base_ms, self.backoff_max_ms)
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_backoff_max_ms() -> u64 {
    32_000
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_max_input_chars() -> usize {
    2048
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_response_chars")]
    pub max_response_chars: usize,
    #[serde(default)]
    pub template_path: Option<PathBuf>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_generation_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            timeout_secs: default_generation_timeout(),
            max_response_chars: default_max_response_chars(),
            template_path: None,
        }
    }
}

impl GenerationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_millis(self.max_retries, self.backoff_base_ms, self.backoff_max_ms)
    }

    /// The instruction template: `template_path` if set, else the built-in.
    pub fn template(&self) -> Result<InstructionTemplate> {
        match &self.template_path {
            Some(path) => {
                let text = std::fs::read_to_string(path).with_context(|| {
                    format!("Failed to read instruction template: {}", path.display())
                })?;
                Ok(InstructionTemplate::new(text)?)
            }
            None => Ok(InstructionTemplate::default()),
        }
    }
}

fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_generation_retries() -> u32 {
    3
}
fn default_generation_timeout() -> u64 {
    120
}
fn default_max_response_chars() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: i64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: default_lock_timeout(),
        }
    }
}

fn default_lock_timeout() -> i64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilingsConfig {
    #[serde(default = "default_filings_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_filing_pattern")]
    pub pattern: String,
}

impl Default for FilingsConfig {
    fn default() -> Self {
        Self {
            dir: default_filings_dir(),
            pattern: default_filing_pattern(),
        }
    }
}

fn default_filings_dir() -> PathBuf {
    PathBuf::from("./filings")
}
fn default_filing_pattern() -> String {
    "*{code}*.pdf".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_true")]
    pub prompt_log: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            prompt_log: true,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}
fn default_true() -> bool {
    true
}

/// One `[[companies]]` entry.
#[derive(Debug, Deserialize, Clone)]
pub struct CompanyConfig {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    /// Explicit filing path; otherwise discovered under `filings.dir`.
    #[serde(default)]
    pub filing: Option<PathBuf>,
}

impl CompanyConfig {
    pub fn to_company(&self) -> Company {
        Company {
            code: self.code.clone(),
            name: self.name.clone(),
            region: self.region.clone(),
            industry: self.industry.clone(),
        }
    }
}

impl Config {
    pub fn company(&self, code: &str) -> Option<&CompanyConfig> {
        self.companies.iter().find(|c| c.code == code)
    }

    /// Resolve a command-line target: `all` or a single configured code.
    pub fn select_companies(&self, target: &str) -> Result<Vec<CompanyConfig>> {
        if target == "all" {
            if self.companies.is_empty() {
                bail!("No companies configured. Add [[companies]] entries to the config file.");
            }
            return Ok(self.companies.clone());
        }
        match self.company(target) {
            Some(c) => Ok(vec![c.clone()]),
            None => bail!(
                "Unknown company code: '{}'. Run `filing-rag companies` to list configured codes.",
                target
            ),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    chunk::validate_params(config.chunking.chunk_size, config.chunking.overlap)?;

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    // A budget below one passage can never hold any context.
    if config.retrieval.max_context_chars < config.chunking.chunk_size {
        bail!(
            "retrieval.max_context_chars ({}) must be >= chunking.chunk_size ({})",
            config.retrieval.max_context_chars,
            config.chunking.chunk_size
        );
    }

    // Validate companies
    let mut seen = HashSet::new();
    for c in &config.companies {
        if c.code.trim().is_empty() {
            bail!("companies[].code must not be empty");
        }
        if c.code == "all" {
            bail!("'all' is reserved and cannot be used as a company code");
        }
        if !seen.insert(c.code.as_str()) {
            bail!("Duplicate company code: '{}'", c.code);
        }
    }

    // Validate embedding
    let emb = &config.embedding;
    match emb.provider.as_str() {
        "openai" | "ollama" => {
            if emb.dims.unwrap_or(0) == 0 {
                bail!("embedding.dims must be > 0 when provider is '{}'", emb.provider);
            }
            if emb.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    emb.provider
                );
            }
        }
        "disabled" | "hash" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, hash, or local.",
            other
        ),
    }
    if emb.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if emb.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Validate generation
    let gen = &config.generation;
    match gen.provider.as_str() {
        "openai" | "ollama" => {
            if gen.model.is_none() {
                bail!(
                    "generation.model must be specified when provider is '{}'",
                    gen.provider
                );
            }
        }
        "disabled" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if gen.max_response_chars == 0 {
        bail!("generation.max_response_chars must be > 0");
    }

    if !config.filings.pattern.contains("{code}") {
        bail!("filings.pattern must contain a {{code}} placeholder");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> (tempfile::NamedTempFile, Result<Config>) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        let cfg = load_config(f.path());
        (f, cfg)
    }

    #[test]
    fn test_defaults() {
        let (_f, cfg) = write_config("[db]\npath = \"x.sqlite\"\n");
        let cfg = cfg.unwrap();
        assert_eq!(cfg.chunking.chunk_size, 1000);
        assert_eq!(cfg.chunking.overlap, 100);
        assert_eq!(cfg.retrieval.top_k, 10);
        assert_eq!(cfg.retrieval.queries.len(), DEFAULT_QUERIES.len());
        assert_eq!(cfg.embedding.provider, "disabled");
        assert_eq!(cfg.index.lock_timeout_secs, 3600);
        assert!(cfg.output.prompt_log);
    }

    #[test]
    fn test_rejects_bad_overlap() {
        let (_f, cfg) = write_config(
            "[db]\npath = \"x.sqlite\"\n[chunking]\nchunk_size = 100\noverlap = 100\n",
        );
        let err = cfg.unwrap_err().to_string();
        assert!(err.contains("overlap"), "{}", err);
    }

    #[test]
    fn test_rejects_context_budget_below_chunk_size() {
        let (_f, cfg) = write_config(
            "[db]\npath = \"x.sqlite\"\n[chunking]\nchunk_size = 500\noverlap = 50\n\
             [retrieval]\nmax_context_chars = 499\n",
        );
        let err = cfg.unwrap_err().to_string();
        assert!(err.contains("max_context_chars"), "{}", err);

        let (_f, cfg) = write_config(
            "[db]\npath = \"x.sqlite\"\n[chunking]\nchunk_size = 500\noverlap = 50\n\
             [retrieval]\nmax_context_chars = 500\n",
        );
        assert!(cfg.is_ok());
    }

    #[test]
    fn test_rejects_duplicate_company() {
        let (_f, cfg) = write_config(
            "[db]\npath = \"x.sqlite\"\n[[companies]]\ncode = \"A\"\n[[companies]]\ncode = \"A\"\n",
        );
        assert!(cfg.unwrap_err().to_string().contains("Duplicate"));
    }

    #[test]
    fn test_network_provider_needs_model_and_dims() {
        let (_f, cfg) = write_config(
            "[db]\npath = \"x.sqlite\"\n[embedding]\nprovider = \"openai\"\nmodel = \"m\"\n",
        );
        assert!(cfg.unwrap_err().to_string().contains("dims"));
    }

    #[test]
    fn test_select_companies() {
        let (_f, cfg) = write_config(
            "[db]\npath = \"x.sqlite\"\n[[companies]]\ncode = \"A\"\n[[companies]]\ncode = \"B\"\nname = \"Bee\"\n",
        );
        let cfg = cfg.unwrap();
        assert_eq!(cfg.select_companies("all").unwrap().len(), 2);
        let b = cfg.select_companies("B").unwrap();
        assert_eq!(b[0].to_company().display_name(), "Bee");
        assert!(cfg.select_companies("Z").is_err());
    }
}
