//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Values left unset fall back to the
//! configuration file.

use crate::config::FallbackInput;
use clap::Parser;
use std::path::PathBuf;

/// RagQA - retrieval-augmented question answering with a local LLM
///
/// Answers every question in two line-oriented lists by refining the
/// question, searching the web for context and asking a local Ollama
/// model. Each answer is checkpointed so interrupted runs resume where
/// they stopped, then all answers are merged into one file.
///
/// Examples:
///   ragqa --public shared_data/public.txt --private shared_data/private.txt
///   ragqa --ask "光華國小的校歌是『虎山雄風飛揚』。"
///   ragqa --merge-only --total 90
///   ragqa --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// First question list (each line is cut at its first comma)
    #[arg(long, value_name = "FILE")]
    pub public: Option<PathBuf>,

    /// Second question list (lines used verbatim, numbering continues)
    #[arg(long, value_name = "FILE")]
    pub private: Option<PathBuf>,

    /// Directory for checkpoints and the merged output
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// File name prefix for checkpoints and the merged output
    #[arg(long, value_name = "PREFIX")]
    pub prefix: Option<String>,

    /// Number of lines in the merged output
    #[arg(long, value_name = "COUNT")]
    pub total: Option<usize>,

    /// Ollama model to use
    #[arg(short, long, env = "RAGQA_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Question passed to the direct-answer fallback
    #[arg(long, value_name = "INPUT")]
    pub fallback_input: Option<FallbackInput>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .ragqa.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Answer a single question, print it and exit (no checkpoints)
    #[arg(long, value_name = "QUESTION", conflicts_with = "merge_only")]
    pub ask: Option<String>,

    /// Only rebuild the merged output from existing checkpoints
    #[arg(long)]
    pub merge_only: bool,

    /// Write a JSON run summary to this file
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .ragqa.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref question) = self.ask {
            if question.trim().is_empty() {
                return Err("Question passed to --ask must not be empty".to_string());
            }
        }

        if self.total == Some(0) {
            return Err("Total must be at least 1".to_string());
        }

        if let Some(ref prefix) = self.prefix {
            if prefix.is_empty() || prefix.contains(['/', '\\']) {
                return Err("Prefix must be a non-empty file name fragment".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref dir) = self.output_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(format!(
                    "Output path is not a directory: {}",
                    dir.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
