//! Per-company pipeline orchestration.
//!
//! Drives each selected company through
//! `PENDING -> CHUNKED -> INDEXED [-> RETRIEVED -> SUMMARIZED]` and collects
//! a [`RunReport`]. A company that fails at any stage is recorded as
//! `FAILED` at that stage and the run moves on to the next company; the
//! error never escapes the loop.
//!
//! The cancellation flag is checked before each company starts. A company
//! already in flight runs to completion, so an index build is never cut
//! off halfway; every company not yet started is reported `CANCELLED`.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};
use tracing::{info, warn, Instrument};

use filing_rag_core::chunk::chunk_document;
use filing_rag_core::context::assemble_context;
use filing_rag_core::embedding::EmbeddingProvider;
use filing_rag_core::generation::TextGenerator;
use filing_rag_core::prompt::InstructionTemplate;
use filing_rag_core::report::{CompanyReport, RunReport, Stage};
use filing_rag_core::store::VectorStore;
use filing_rag_core::PipelineError;

use crate::config::{CompanyConfig, Config};
use crate::db;
use crate::embedding::create_provider;
use crate::filings::load_document;
use crate::indexer::{IndexSettings, Indexer};
use crate::llm::{create_generator, DisabledGenerator};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::retriever::Retriever;
use crate::sqlite_store::SqliteStore;
use crate::summarize::{SummarySettings, Summarizer};

/// What a run should do for every selected company.
#[derive(Debug, Clone)]
pub enum RunMode {
    /// Stop at `INDEXED`.
    Build { force: bool },
    /// Go all the way to `SUMMARIZED`.
    Summarize(SummarizeOptions),
}

#[derive(Debug, Clone)]
pub struct SummarizeOptions {
    pub force_reindex: bool,
    /// Topic queries; empty means the configured `retrieval.queries`.
    pub queries: Vec<String>,
    /// Overrides `retrieval.top_k`.
    pub top_k: Option<usize>,
    pub save: bool,
}

impl Default for SummarizeOptions {
    fn default() -> Self {
        Self {
            force_reindex: false,
            queries: Vec::new(),
            top_k: None,
            save: true,
        }
    }
}

impl RunMode {
    fn force(&self) -> bool {
        match self {
            RunMode::Build { force } => *force,
            RunMode::Summarize(opts) => opts.force_reindex,
        }
    }
}

pub struct Pipeline<'a> {
    config: &'a Config,
    store: &'a dyn VectorStore,
    embedder: &'a dyn EmbeddingProvider,
    generator: &'a dyn TextGenerator,
    template: InstructionTemplate,
    progress: &'a dyn ProgressReporter,
    cancel: &'a AtomicBool,
}

impl<'a> Pipeline<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &'a Config,
        store: &'a dyn VectorStore,
        embedder: &'a dyn EmbeddingProvider,
        generator: &'a dyn TextGenerator,
        template: InstructionTemplate,
        progress: &'a dyn ProgressReporter,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            config,
            store,
            embedder,
            generator,
            template,
            progress,
            cancel,
        }
    }

    /// Run `mode` for each company in order.
    pub async fn run(&self, companies: &[CompanyConfig], mode: &RunMode) -> RunReport {
        let mut report = RunReport::default();
        let total = companies.len() as u64;

        for (i, company) in companies.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                warn!(company = %company.code, "run cancelled before company started");
                report.push(CompanyReport::cancelled(&company.code));
                continue;
            }

            self.progress.report(ProgressEvent::Company {
                code: company.code.clone(),
                n: i as u64 + 1,
                total,
            });
            let span = tracing::info_span!("company", company = %company.code);
            let company_report = self.run_company(company, mode).instrument(span).await;
            report.push(company_report);
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            cancelled = report.cancelled(),
            "run finished"
        );
        report
    }

    async fn run_company(&self, company: &CompanyConfig, mode: &RunMode) -> CompanyReport {
        let mut report = CompanyReport::new(&company.code);
        match self.drive(company, mode, &mut report).await {
            Ok(()) => report.succeed(),
            Err(e) => {
                let stage = report.reached.next().unwrap_or(report.reached);
                warn!(stage = %stage, kind = e.kind(), error = %e, "company failed");
                report.fail(e);
            }
        }
        report
    }

    async fn drive(
        &self,
        company: &CompanyConfig,
        mode: &RunMode,
        report: &mut CompanyReport,
    ) -> Result<(), PipelineError> {
        let code = company.code.as_str();

        // CHUNKED
        let doc = load_document(&self.config.filings, company)?;
        let passages = chunk_document(
            &doc,
            self.config.chunking.chunk_size,
            self.config.chunking.overlap,
        )?;
        report.passages = Some(passages.len());
        self.enter(report, Stage::Chunked)?;
        info!(source = %doc.source, chars = doc.char_len(), passages = passages.len(), "chunked");

        // INDEXED
        let indexer = Indexer::new(
            self.store,
            self.embedder,
            IndexSettings::from_config(self.config),
            self.progress,
        );
        let indexed = indexer
            .build_index(code, &passages, &doc.fingerprint, mode.force())
            .await?;
        report.index_action = Some(indexed.action);
        report.passages = Some(indexed.collection.passage_count);
        self.enter(report, Stage::Indexed)?;

        let opts = match mode {
            RunMode::Build { .. } => return Ok(()),
            RunMode::Summarize(opts) => opts,
        };

        // RETRIEVED
        let queries = if opts.queries.is_empty() {
            self.config.retrieval.queries.clone()
        } else {
            opts.queries.clone()
        };
        let top_k = opts.top_k.unwrap_or(self.config.retrieval.top_k);
        let retriever = Retriever::new(
            self.store,
            self.embedder,
            self.config.embedding.retry_policy(),
            self.config.embedding.max_input_chars,
        );
        let results = retriever.retrieve_all(code, &queries, top_k).await?;
        let context = assemble_context(&results, self.config.retrieval.max_context_chars);
        if context.is_empty() {
            return Err(PipelineError::EmptyContext {
                company: code.to_string(),
            });
        }
        info!(
            hits = results.len(),
            used = context.passage_ids.len(),
            chars = context.char_len(),
            "context assembled"
        );
        self.enter(report, Stage::Retrieved)?;

        // SUMMARIZED
        let mut settings = SummarySettings::from_config(self.config);
        settings.save = opts.save;
        let summarizer = Summarizer::new(self.generator, &self.template, settings);
        summarizer
            .generate_summary(&company.to_company(), &queries, &context)
            .await?;
        if opts.save {
            report.artifact = Some(summarizer.artifact_path(code).display().to_string());
        }
        self.enter(report, Stage::Summarized)?;

        Ok(())
    }

    fn enter(&self, report: &mut CompanyReport, stage: Stage) -> Result<(), PipelineError> {
        report.advance(stage)?;
        self.progress.report(ProgressEvent::Stage {
            code: report.code.clone(),
            stage,
        });
        Ok(())
    }
}

/// Entry point for `index build` and `summarize`: open the store, construct
/// the configured providers and run `mode` for `target` (`all` or a code).
///
/// Per-company failures are inside the returned report; `Err` means the run
/// could not start at all.
pub async fn run_pipeline(
    config: &Config,
    target: &str,
    mode: &RunMode,
    progress: &dyn ProgressReporter,
    cancel: &AtomicBool,
) -> Result<RunReport> {
    let companies = config.select_companies(target)?;
    if !config.embedding.is_enabled() {
        bail!(
            "Embedding provider is disabled. Set [embedding] provider in the config \
             (hash, openai, ollama or local)."
        );
    }

    let embedder = create_provider(&config.embedding)?;
    let generator: Box<dyn TextGenerator> = match mode {
        RunMode::Build { .. } => Box::new(DisabledGenerator),
        RunMode::Summarize(_) => create_generator(&config.generation)?,
    };
    let template = config.generation.template()?;

    let pool = db::open(config).await?;
    let store = SqliteStore::new(pool.clone());
    let pipeline = Pipeline::new(
        config,
        &store,
        embedder.as_ref(),
        generator.as_ref(),
        template,
        progress,
        cancel,
    );
    let report = pipeline.run(&companies, mode).await;

    pool.close().await;
    Ok(report)
}
