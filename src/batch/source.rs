//! Loading question lists.

use crate::models::Question;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

/// How each line of a list becomes a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    /// Trim the line and keep everything before its first comma.
    FirstField,
    /// Use the line as is (minus its terminator).
    Verbatim,
}

/// Number lines of `content` from `start_index`, one question per line.
pub fn parse_questions(content: &str, start_index: usize, format: LineFormat) -> Vec<Question> {
    content
        .lines()
        .enumerate()
        .map(|(offset, line)| {
            let text = match format {
                LineFormat::FirstField => line.trim().split(',').next().unwrap_or(""),
                LineFormat::Verbatim => line,
            };
            Question::new(start_index + offset, text)
        })
        .collect()
}

/// Read a question list from disk.
pub fn load_questions(path: &Path, start_index: usize, format: LineFormat) -> Result<Vec<Question>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read question list: {}", path.display()))?;
    Ok(parse_questions(&content, start_index, format))
}

/// Index of the first question of the list that follows `previous`.
///
/// Numbering continues after the last question of `previous`, so the two
/// lists never share a checkpoint. `configured` is used only when there is
/// no previous question.
pub fn continuation_index(previous: &[Question], configured: usize) -> usize {
    let Some(last) = previous.last() else {
        return configured;
    };

    let next = last.index + 1;
    if next != configured {
        warn!(
            "Second list starts at {} (after {} questions), not the configured {}",
            next,
            previous.len(),
            configured
        );
    }
    next
}
