//! Per-company pipeline states and the run report.
//!
//! Every company walks `PENDING -> CHUNKED -> INDEXED -> RETRIEVED ->
//! SUMMARIZED` in order. A failure is recorded against the stage that was
//! being attempted, so an embedding failure reports `FAILED` at `INDEXED`.

use std::fmt;

use crate::error::PipelineError;
use crate::models::IndexAction;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Pending,
    Chunked,
    Indexed,
    Retrieved,
    Summarized,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pending => "PENDING",
            Stage::Chunked => "CHUNKED",
            Stage::Indexed => "INDEXED",
            Stage::Retrieved => "RETRIEVED",
            Stage::Summarized => "SUMMARIZED",
        }
    }

    /// The stage that follows this one, if any.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Pending => Some(Stage::Chunked),
            Stage::Chunked => Some(Stage::Indexed),
            Stage::Indexed => Some(Stage::Retrieved),
            Stage::Retrieved => Some(Stage::Summarized),
            Stage::Summarized => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result for one company.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Reached the run's target stage.
    Succeeded,
    /// Stopped while attempting `stage`.
    Failed { stage: Stage, error: PipelineError },
    /// Never started because the run was interrupted.
    Cancelled,
}

/// Tracks one company through the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyReport {
    pub code: String,
    /// Last stage successfully reached.
    pub reached: Stage,
    pub outcome: Option<Outcome>,
    pub index_action: Option<IndexAction>,
    pub passages: Option<usize>,
    /// Where the summary artifact was written, if it was.
    pub artifact: Option<String>,
}

impl CompanyReport {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            reached: Stage::Pending,
            outcome: None,
            index_action: None,
            passages: None,
            artifact: None,
        }
    }

    pub fn cancelled(code: impl Into<String>) -> Self {
        let mut report = Self::new(code);
        report.outcome = Some(Outcome::Cancelled);
        report
    }

    /// Record arrival at the next stage. Stages cannot be skipped.
    ///
    /// # Errors
    ///
    /// [`PipelineError::StageOrder`] if `stage` is not the immediate
    /// successor of the current one; `reached` is left unchanged.
    pub fn advance(&mut self, stage: Stage) -> Result<(), PipelineError> {
        if self.reached.next() != Some(stage) {
            return Err(PipelineError::StageOrder {
                company: self.code.clone(),
                from: self.reached.to_string(),
                to: stage.to_string(),
            });
        }
        self.reached = stage;
        Ok(())
    }

    /// Mark the company failed while attempting the stage after `reached`.
    pub fn fail(&mut self, error: PipelineError) {
        let stage = self.reached.next().unwrap_or(self.reached);
        self.outcome = Some(Outcome::Failed { stage, error });
    }

    pub fn succeed(&mut self) {
        self.outcome = Some(Outcome::Succeeded);
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Some(Outcome::Failed { .. }))
    }

    /// Label for the final state column.
    pub fn state_label(&self) -> String {
        match &self.outcome {
            Some(Outcome::Failed { stage, .. }) => format!("FAILED@{}", stage),
            Some(Outcome::Cancelled) => "CANCELLED".to_string(),
            _ => self.reached.to_string(),
        }
    }

    /// Failure kind and message, if failed.
    pub fn failure(&self) -> Option<(&'static str, String)> {
        match &self.outcome {
            Some(Outcome::Failed { error, .. }) => Some((error.kind(), error.to_string())),
            _ => None,
        }
    }
}

/// Accumulated outcomes of one run, in processing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub companies: Vec<CompanyReport>,
}

impl RunReport {
    pub fn push(&mut self, report: CompanyReport) {
        self.companies.push(report);
    }

    pub fn get(&self, code: &str) -> Option<&CompanyReport> {
        self.companies.iter().find(|c| c.code == code)
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, Some(Outcome::Succeeded)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Some(Outcome::Failed { .. })))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, Some(Outcome::Cancelled)))
    }

    /// True when nothing failed and nothing was cancelled.
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.cancelled() == 0
    }

    fn count(&self, pred: impl Fn(&Option<Outcome>) -> bool) -> usize {
        self.companies.iter().filter(|c| pred(&c.outcome)).count()
    }

    /// Fixed-width table of per-company outcomes plus a totals line.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{:<12} {:<20} {:<15} {:>8}   {}\n",
            "COMPANY", "STATE", "INDEX", "PASSAGES", "DETAIL"
        ));
        out.push_str(&format!("{}\n", "-".repeat(76)));
        for c in &self.companies {
            let index = c
                .index_action
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-".to_string());
            let passages = c
                .passages
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string());
            let detail = match c.failure() {
                Some((kind, msg)) => format!("{}: {}", kind, msg),
                None => c.artifact.clone().unwrap_or_default(),
            };
            out.push_str(&format!(
                "{:<12} {:<20} {:<15} {:>8}   {}\n",
                c.code,
                c.state_label(),
                index,
                passages,
                detail
            ));
        }
        out.push_str(&format!(
            "\n{} succeeded, {} failed, {} cancelled\n",
            self.succeeded(),
            self.failed(),
            self.cancelled()
        ));
        out
    }
}
