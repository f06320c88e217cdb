//! Data models for the question answering pipeline.
//!
//! This module contains the core data structures passed between the
//! retrieval engine, the orchestrator and the batch runner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label placed in front of every numbered context snippet.
pub const REFERENCE_LABEL: &str = "参考信息";

/// A single question from an input list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// 1-based position across the whole batch (lists continue numbering).
    pub index: usize,
    /// The question text as it will be sent to the pipeline.
    pub text: String,
}

impl Question {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

/// Retrieved, sanitized snippets ready to be placed into a prompt.
///
/// Once built a context is never mutated; the orchestrator only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    snippets: Vec<String>,
}

impl Context {
    /// Build a context from already accepted snippets (order is kept).
    pub fn from_snippets(snippets: Vec<String>) -> Self {
        Self { snippets }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn snippets(&self) -> &[String] {
        &self.snippets
    }

    /// Render the numbered block: `参考信息1: ...`, separated by blank lines.
    pub fn render(&self) -> String {
        self.snippets
            .iter()
            .enumerate()
            .map(|(i, snippet)| format!("{}{}: {}", REFERENCE_LABEL, i + 1, snippet))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Result of the retrieval stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// At least one snippet survived filtering.
    Found(Context),
    /// Nothing usable was retrieved; the pipeline continues without context.
    Degraded(String),
}

/// How an answer was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerRoute {
    /// Every stage through verification ran.
    Full,
    /// A stage failed and the synthesis agent answered the question directly.
    Fallback { reason: String },
}

impl fmt::Display for AnswerRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerRoute::Full => write!(f, "full"),
            AnswerRoute::Fallback { reason } => write!(f, "fallback ({})", reason),
        }
    }
}

/// Final answer for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub route: AnswerRoute,
}

impl Answer {
    pub fn full(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            route: AnswerRoute::Full,
        }
    }

    pub fn fallback(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            route: AnswerRoute::Fallback {
                reason: reason.into(),
            },
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.route, AnswerRoute::Fallback { .. })
    }

    /// The answer as a single checkpoint line (embedded newlines become spaces).
    pub fn single_line(&self) -> String {
        collapse_newlines(&self.text)
    }
}

/// Replace line breaks with spaces so a value fits on one line.
pub fn collapse_newlines(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// Counters collected over one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Questions answered in this run.
    pub processed: usize,
    /// Questions skipped because a checkpoint already existed.
    pub skipped: usize,
    /// Answers that came from the direct fallback route.
    pub fallbacks: usize,
    /// Lines written to the merged output (0 when no merge ran).
    pub merged_lines: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchSummary {
    pub fn start() -> Self {
        Self {
            processed: 0,
            skipped: 0,
            fallbacks: 0,
            merged_lines: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Fold another list's counters into this summary.
    pub fn absorb(&mut self, other: &BatchSummary) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.fallbacks += other.fallbacks;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Elapsed seconds, or 0 if the run has not finished.
    pub fn duration_seconds(&self) -> f64 {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}
