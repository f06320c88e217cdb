//! Sequential, resumable batch answering and the final merge.

use crate::batch::checkpoint::{CheckpointError, CheckpointStore};
use crate::models::{BatchSummary, Question};
use crate::pipeline::{Answerer, PipelineError};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Faults that stop a batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Question {index}: {source}")]
    Pipeline {
        index: usize,
        #[source]
        source: PipelineError,
    },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Answers questions one at a time, skipping those already checkpointed.
pub struct BatchRunner<'a, A: ?Sized, S: ?Sized> {
    answerer: &'a A,
    store: &'a S,
    show_progress: bool,
}

impl<'a, A, S> BatchRunner<'a, A, S>
where
    A: Answerer + ?Sized,
    S: CheckpointStore + ?Sized,
{
    pub fn new(answerer: &'a A, store: &'a S) -> Self {
        Self {
            answerer,
            store,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Process one list in order. Questions run strictly sequentially.
    pub async fn run(&self, questions: &[Question]) -> Result<BatchSummary, BatchError> {
        let mut summary = BatchSummary::start();
        let progress = self.progress_bar(questions.len());

        for question in questions {
            progress.set_message(format!("#{}", question.index));

            if self.store.exists(question.index) {
                debug!("Skipping question {} (checkpoint exists)", question.index);
                summary.skipped += 1;
                progress.inc(1);
                continue;
            }

            info!("Processing question {}: {}", question.index, question.text);
            let answer = self
                .answerer
                .answer(&question.text)
                .await
                .map_err(|source| BatchError::Pipeline {
                    index: question.index,
                    source,
                })?;

            if answer.is_fallback() {
                summary.fallbacks += 1;
            }

            let line = answer.single_line();
            info!("Answer {} ({}): {}", question.index, answer.route, line);
            self.store.put(question.index, &line)?;

            summary.processed += 1;
            progress.inc(1);
        }

        progress.finish_and_clear();
        summary.finish();
        Ok(summary)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// One line per index in `1..=total`: the checkpointed answer or an empty line.
///
/// Reads checkpoints only; never changes them.
pub fn merge_checkpoints<S>(store: &S, total: usize) -> Result<Vec<String>, CheckpointError>
where
    S: CheckpointStore + ?Sized,
{
    (1..=total)
        .map(|index| store.get(index).map(Option::unwrap_or_default))
        .collect()
}

/// Write merged lines, each terminated by a newline.
pub fn write_merged(path: &Path, lines: &[String]) -> Result<()> {
    let mut content = String::new();
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write merged output to {}", path.display()))
}
