//! Orchestrator scenarios against the in-memory store with scripted
//! embedding and generation doubles.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use filing_rag::config::Config;
use filing_rag::embedding::HashEmbedder;
use filing_rag::pipeline::{Pipeline, RunMode, SummarizeOptions};
use filing_rag::progress::NoProgress;
use filing_rag_core::embedding::EmbeddingProvider;
use filing_rag_core::generation::TextGenerator;
use filing_rag_core::models::{IndexAction, SummaryOutput};
use filing_rag_core::prompt::InstructionTemplate;
use filing_rag_core::report::{Outcome, Stage};
use filing_rag_core::store::memory::InMemoryStore;
use filing_rag_core::store::VectorStore;
use filing_rag_core::ServiceError;

const POISON: &str = "UNEMBEDDABLE";

/// Hash embeddings, except that any batch containing [`POISON`] fails
/// transiently on every attempt.
struct FlakyEmbedder {
    inner: HashEmbedder,
    poisoned_calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    fn model_name(&self) -> &str {
        "flaky-hash"
    }
    fn dims(&self) -> usize {
        self.inner.dims()
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if texts.iter().any(|t| t.contains(POISON)) {
            self.poisoned_calls.fetch_add(1, Ordering::SeqCst);
            return Err(ServiceError::Transient("429 too many requests".to_string()));
        }
        self.inner.embed(texts).await
    }
}

/// Echoes the first line of the context it was given.
struct EchoGenerator {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl TextGenerator for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(format!("- summary of {} chars of prompt", prompt.chars().count()))
    }
}

fn filing(topic: &str) -> String {
    (0..12)
        .map(|i| format!("Paragraph {} on {}: orders, growth strategy and risks. ", i, topic))
        .collect()
}

fn config(root: &Path) -> Config {
    let body = format!(
        r#"[db]
path = "{root}/index.sqlite"

[chunking]
chunk_size = 120
overlap = 20

[retrieval]
top_k = 4
max_context_chars = 600
queries = ["growth strategy", "risks"]

[embedding]
provider = "hash"
dims = 64
max_retries = 2
backoff_base_ms = 0
backoff_max_ms = 0

[filings]
dir = "{root}/filings"
pattern = "{{code}}.txt"

[output]
dir = "{root}/output"

[[companies]]
code = "A"

[[companies]]
code = "B"

[[companies]]
code = "C"
"#,
        root = root.display()
    );
    toml::from_str(&body).unwrap()
}

fn setup() -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("filings");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("A.txt"), filing("construction")).unwrap();
    std::fs::write(dir.join("B.txt"), format!("{} {}", filing("retail"), POISON)).unwrap();
    std::fs::write(dir.join("C.txt"), filing("logistics")).unwrap();
    let cfg = config(tmp.path());
    (tmp, cfg)
}

fn embedder() -> FlakyEmbedder {
    FlakyEmbedder {
        inner: HashEmbedder::new(64),
        poisoned_calls: AtomicUsize::new(0),
    }
}

fn generator() -> EchoGenerator {
    EchoGenerator {
        prompts: Mutex::new(Vec::new()),
    }
}

#[tokio::test]
async fn test_embedding_failure_is_isolated_to_one_company() {
    let (tmp, cfg) = setup();
    let store = InMemoryStore::new();
    let emb = embedder();
    let gen = generator();
    let cancel = AtomicBool::new(false);
    let pipeline = Pipeline::new(
        &cfg,
        &store,
        &emb,
        &gen,
        InstructionTemplate::default(),
        &NoProgress,
        &cancel,
    );

    let mode = RunMode::Summarize(SummarizeOptions::default());
    let report = pipeline.run(&cfg.companies, &mode).await;

    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert!(!report.is_success());

    let b = report.get("B").unwrap();
    match &b.outcome {
        Some(Outcome::Failed { stage, error }) => {
            assert_eq!(*stage, Stage::Indexed);
            assert_eq!(error.kind(), "IndexBuildFailed");
        }
        other => panic!("unexpected outcome for B: {:?}", other),
    }
    // Three attempts: one plus two retries.
    assert_eq!(emb.poisoned_calls.load(Ordering::SeqCst), 3);
    assert!(store.collection("B").await.unwrap().is_none());
    assert!(!store.is_locked("B"));

    for code in ["A", "C"] {
        let r = report.get(code).unwrap();
        assert_eq!(r.reached, Stage::Summarized);
        assert_eq!(r.outcome, Some(Outcome::Succeeded));
        let json = std::fs::read_to_string(tmp.path().join(format!("output/{}.summary.json", code)))
            .unwrap();
        let out: SummaryOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(out.company_code, code);
        assert_eq!(out.model, "echo");
        assert!(!out.passage_ids.is_empty());
        assert!(out.passage_ids.iter().all(|id| id.starts_with(&format!("{}-", code))));
    }
    assert!(!tmp.path().join("output/B.summary.json").exists());
    // One generation call per summarized company.
    assert_eq!(gen.prompts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_second_build_reuses_index() {
    let (_tmp, cfg) = setup();
    let store = InMemoryStore::new();
    let emb = HashEmbedder::new(64);
    let gen = generator();
    let cancel = AtomicBool::new(false);
    let pipeline = Pipeline::new(
        &cfg,
        &store,
        &emb,
        &gen,
        InstructionTemplate::default(),
        &NoProgress,
        &cancel,
    );
    let only_a = vec![cfg.companies[0].clone()];

    let first = pipeline.run(&only_a, &RunMode::Build { force: false }).await;
    assert_eq!(first.get("A").unwrap().index_action, Some(IndexAction::Built));
    let before = store.load_collection("A").await.unwrap().unwrap();

    let second = pipeline.run(&only_a, &RunMode::Build { force: false }).await;
    let a = second.get("A").unwrap();
    assert_eq!(a.index_action, Some(IndexAction::AlreadyExists));
    assert_eq!(a.reached, Stage::Indexed);
    assert_eq!(store.load_collection("A").await.unwrap().unwrap(), before);

    let forced = pipeline.run(&only_a, &RunMode::Build { force: true }).await;
    assert_eq!(forced.get("A").unwrap().index_action, Some(IndexAction::Built));
    let after = store.load_collection("A").await.unwrap().unwrap();
    assert_ne!(after.0.version, before.0.version);
    assert_eq!(store.stored_versions().len(), 1);
}

#[tokio::test]
async fn test_cancelled_run_skips_remaining_companies() {
    let (_tmp, cfg) = setup();
    let store = InMemoryStore::new();
    let emb = HashEmbedder::new(64);
    let gen = generator();
    let cancel = AtomicBool::new(true);
    let pipeline = Pipeline::new(
        &cfg,
        &store,
        &emb,
        &gen,
        InstructionTemplate::default(),
        &NoProgress,
        &cancel,
    );

    let report = pipeline.run(&cfg.companies, &RunMode::Build { force: false }).await;
    assert_eq!(report.cancelled(), 3);
    assert!(report.companies.iter().all(|c| c.state_label() == "CANCELLED"));
    assert!(store.list_collections().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_top_k_larger_than_collection_and_query_override() {
    let (tmp, cfg) = setup();
    let store = InMemoryStore::new();
    let emb = HashEmbedder::new(64);
    let gen = generator();
    let cancel = AtomicBool::new(false);
    let pipeline = Pipeline::new(
        &cfg,
        &store,
        &emb,
        &gen,
        InstructionTemplate::default(),
        &NoProgress,
        &cancel,
    );
    let only_c = vec![cfg.companies[2].clone()];

    let mode = RunMode::Summarize(SummarizeOptions {
        queries: vec!["logistics orders".to_string()],
        top_k: Some(1000),
        ..SummarizeOptions::default()
    });
    let report = pipeline.run(&only_c, &mode).await;
    assert_eq!(report.get("C").unwrap().reached, Stage::Summarized);

    let json = std::fs::read_to_string(tmp.path().join("output/C.summary.json")).unwrap();
    let out: SummaryOutput = serde_json::from_str(&json).unwrap();
    assert_eq!(out.queries, vec!["logistics orders"]);
    // Context is bounded by max_context_chars, so not every passage fits.
    let total = store.collection("C").await.unwrap().unwrap().passage_count;
    assert!(out.passage_ids.len() < total);
    let prompt = gen.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("- logistics orders"));
}
