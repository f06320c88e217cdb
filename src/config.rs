//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.ragqa.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".ragqa.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Web search and fetch settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Retrieval limits and filters.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Pipeline behavior.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Batch input/output settings.
    #[serde(default)]
    pub batch: BatchConfig,
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Ollama model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation (0 is greedy decoding).
    #[serde(default)]
    pub temperature: f32,

    /// Maximum tokens in a completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Repetition penalty factor.
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,

    /// End-of-turn stop markers.
    #[serde(default = "default_stop")]
    pub stop: Vec<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            repeat_penalty: default_repeat_penalty(),
            stop: default_stop(),
            timeout_seconds: default_model_timeout(),
        }
    }
}

fn default_model() -> String {
    "llama3.1:8b-instruct-q8_0".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_max_tokens() -> usize {
    512
}

fn default_repeat_penalty() -> f32 {
    2.0
}

fn default_stop() -> Vec<String> {
    vec!["<|eot_id|>".to_string(), "<|end_of_text|>".to_string()]
}

fn default_model_timeout() -> u64 {
    600
}

/// Web search and page fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search endpoint (DuckDuckGo HTML interface).
    #[serde(default = "default_search_url")]
    pub endpoint: String,

    /// Region/language hint passed to the search engine.
    #[serde(default = "default_region")]
    pub region: String,

    /// Timeout for each network operation (search, HEAD, GET) in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_seconds: u64,

    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_url(),
            region: default_region(),
            timeout_seconds: default_fetch_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_search_url() -> String {
    "https://html.duckduckgo.com/html/".to_string()
}

fn default_region() -> String {
    "tw-tzh".to_string()
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

/// Retrieval limits and filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Snippets kept in the final context.
    #[serde(default = "default_max_snippets")]
    pub max_snippets: usize,

    /// Snippets requested from each strategy (twice as many URLs are searched).
    #[serde(default = "default_results_per_strategy")]
    pub results_per_strategy: usize,

    /// Maximum characters of a search query.
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,

    /// Maximum characters kept from each snippet before sanitization.
    #[serde(default = "default_max_snippet_chars")]
    pub max_snippet_chars: usize,

    /// A snippet must be longer than this before sanitization.
    #[serde(default = "default_min_raw_chars")]
    pub min_raw_chars: usize,

    /// A snippet must be longer than this after sanitization.
    #[serde(default = "default_min_clean_chars")]
    pub min_clean_chars: usize,

    /// Suffix appended to the keywords in the third search strategy.
    #[serde(default = "default_keyword_suffix")]
    pub keyword_suffix: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_snippets: default_max_snippets(),
            results_per_strategy: default_results_per_strategy(),
            max_query_chars: default_max_query_chars(),
            max_snippet_chars: default_max_snippet_chars(),
            min_raw_chars: default_min_raw_chars(),
            min_clean_chars: default_min_clean_chars(),
            keyword_suffix: default_keyword_suffix(),
        }
    }
}

fn default_max_snippets() -> usize {
    3
}

fn default_results_per_strategy() -> usize {
    2
}

fn default_max_query_chars() -> usize {
    100
}

fn default_max_snippet_chars() -> usize {
    2000
}

fn default_min_raw_chars() -> usize {
    50
}

fn default_min_clean_chars() -> usize {
    30
}

fn default_keyword_suffix() -> String {
    "校歌".to_string()
}

/// Which question the direct-answer fallback receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FallbackInput {
    /// The raw question as read from the input list.
    #[default]
    Original,
    /// The refined question when refinement succeeded, else the raw one.
    Refined,
}

/// Pipeline behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Input used by the terminal fallback.
    #[serde(default)]
    pub fallback_input: FallbackInput,
}

/// Batch input/output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// First question list; each line is cut at its first comma.
    #[serde(default = "default_public_path")]
    pub public_questions: PathBuf,

    /// Second question list; lines are used verbatim.
    #[serde(default = "default_private_path")]
    pub private_questions: PathBuf,

    /// Index of the first question in the second list when the first list
    /// is missing or empty; otherwise numbering continues after the first list.
    #[serde(default = "default_private_start")]
    pub private_start_index: usize,

    /// Directory holding checkpoints and the merged output.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// File name prefix for checkpoints (`{prefix}_{i}.txt`) and the merge (`{prefix}.txt`).
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Number of lines in the merged output.
    #[serde(default = "default_total_questions")]
    pub total_questions: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            public_questions: default_public_path(),
            private_questions: default_private_path(),
            private_start_index: default_private_start(),
            output_dir: default_output_dir(),
            prefix: default_prefix(),
            total_questions: default_total_questions(),
        }
    }
}

fn default_public_path() -> PathBuf {
    PathBuf::from("shared_data/public.txt")
}

fn default_private_path() -> PathBuf {
    PathBuf::from("shared_data/private.txt")
}

fn default_private_start() -> usize {
    31
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_prefix() -> String {
    "answers".to_string()
}

fn default_total_questions() -> usize {
    90
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(ref path) = args.public {
            self.batch.public_questions = path.clone();
        }
        if let Some(ref path) = args.private {
            self.batch.private_questions = path.clone();
        }
        if let Some(ref dir) = args.output_dir {
            self.batch.output_dir = dir.clone();
        }
        if let Some(ref prefix) = args.prefix {
            self.batch.prefix = prefix.clone();
        }
        if let Some(total) = args.total {
            self.batch.total_questions = total;
        }
        if let Some(fallback) = args.fallback_input {
            self.pipeline.fallback_input = fallback;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
