//! Pipeline progress reporting.
//!
//! Reports observable progress during `filing-rag index build` and
//! `filing-rag summarize`, so users see which company is being processed and
//! how far embedding has got. Progress is emitted on **stderr** so stdout
//! remains parseable for scripts.

use std::io::Write;

use filing_rag_core::report::Stage;

/// A single progress event.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Company `n` of `total` is starting.
    Company { code: String, n: u64, total: u64 },
    /// A company reached a pipeline stage.
    Stage { code: String, stage: Stage },
    /// Embedding: `n` of `total` passages done.
    Embedding { code: String, n: u64, total: u64 },
}

/// Receives progress events from the indexer and orchestrator.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "index 12044  embedding  1,200 / 3,400 passages".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Company { code, n, total } => {
                format!("[{}/{}] {}\n", n, total, code)
            }
            ProgressEvent::Stage { code, stage } => {
                format!("  {}  {}\n", code, stage)
            }
            ProgressEvent::Embedding { code, n, total } => {
                format!(
                    "  {}  embedding  {} / {} passages\n",
                    code,
                    format_number(*n),
                    format_number(*total)
                )
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Company { code, n, total } => serde_json::json!({
                "event": "company",
                "company": code,
                "n": n,
                "total": total
            }),
            ProgressEvent::Stage { code, stage } => serde_json::json!({
                "event": "stage",
                "company": code,
                "stage": stage.as_str()
            }),
            ProgressEvent::Embedding { code, n, total } => serde_json::json!({
                "event": "progress",
                "company": code,
                "phase": "embedding",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
