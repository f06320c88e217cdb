//! Multi-strategy retrieval with fallback, deduplication and filtering.
//!
//! Strategies run strictly one after another in a fixed order. Inside a
//! strategy all candidate pages are fetched concurrently and joined in
//! submission order, so the resulting context is deterministic.

use crate::config::RetrievalConfig;
use crate::models::{Context, RetrievalOutcome};
use crate::retrieval::extract::extract_snippet;
use crate::retrieval::fetch::{fetch_all, PageFetcher};
use crate::retrieval::sanitizer::{char_len, sanitize, truncate_chars};
use crate::retrieval::search::{SearchError, WebSearch};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A failure that aborts one strategy only.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Query templates, tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    /// `"keywords"`
    QuotedKeywords,
    /// `"refined question"`
    QuotedQuestion,
    /// `"keywords" suffix`
    KeywordsWithSuffix,
    /// `keywords`
    BareKeywords,
}

impl SearchStrategy {
    pub const ALL: [SearchStrategy; 4] = [
        SearchStrategy::QuotedKeywords,
        SearchStrategy::QuotedQuestion,
        SearchStrategy::KeywordsWithSuffix,
        SearchStrategy::BareKeywords,
    ];

    /// Build the query string for this template.
    pub fn query(&self, refined: &str, keywords: &str, suffix: &str) -> String {
        match self {
            SearchStrategy::QuotedKeywords => format!("\"{}\"", keywords),
            SearchStrategy::QuotedQuestion => format!("\"{}\"", refined),
            SearchStrategy::KeywordsWithSuffix => format!("\"{}\" {}", keywords, suffix),
            SearchStrategy::BareKeywords => keywords.to_string(),
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchStrategy::QuotedKeywords => "quoted-keywords",
            SearchStrategy::QuotedQuestion => "quoted-question",
            SearchStrategy::KeywordsWithSuffix => "keywords-with-suffix",
            SearchStrategy::BareKeywords => "bare-keywords",
        };
        write!(f, "{}", name)
    }
}

/// Runs the search strategies and turns pages into a [`Context`].
pub struct RetrievalEngine {
    search: Arc<dyn WebSearch>,
    fetcher: Arc<dyn PageFetcher>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        search: Arc<dyn WebSearch>,
        fetcher: Arc<dyn PageFetcher>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            search,
            fetcher,
            config,
        }
    }

    /// Retrieve context for a refined question and its keywords.
    ///
    /// Never fails: strategy faults are logged and skipped, and an empty
    /// result is reported as [`RetrievalOutcome::Degraded`].
    pub async fn retrieve(&self, refined: &str, keywords: &str) -> RetrievalOutcome {
        let mut collected: Vec<String> = Vec::new();
        let mut failures = 0;

        for strategy in SearchStrategy::ALL {
            let query = strategy.query(refined, keywords, &self.config.keyword_suffix);

            match self.run_strategy(&query).await {
                Ok(snippets) => {
                    info!("Strategy {} yielded {} snippets", strategy, snippets.len());
                    collected.extend(snippets);
                }
                Err(e) => {
                    warn!("Strategy {} failed: {}", strategy, e);
                    failures += 1;
                    continue;
                }
            }

            if collected.len() >= self.config.max_snippets {
                debug!("Collected {} snippets, skipping remaining strategies", collected.len());
                break;
            }
        }

        let context = assemble_context(collected, &self.config);
        if !context.is_empty() {
            return RetrievalOutcome::Found(context);
        }

        let reason = if failures == SearchStrategy::ALL.len() {
            "every search strategy failed".to_string()
        } else {
            "no usable search results".to_string()
        };
        RetrievalOutcome::Degraded(reason)
    }

    /// One strategy: search, fetch concurrently, extract, keep the first few.
    async fn run_strategy(&self, query: &str) -> Result<Vec<String>, RetrievalError> {
        let query = truncate_chars(query, self.config.max_query_chars);
        let wanted = self.config.results_per_strategy;

        let urls = self.search.search(query, wanted * 2).await?;
        debug!("Query {:?}: {} candidate urls", query, urls.len());

        let pages = fetch_all(self.fetcher.as_ref(), &urls).await;

        Ok(pages
            .into_iter()
            .flatten()
            .filter_map(|html| extract_snippet(&html))
            .take(wanted)
            .collect())
    }
}

/// Deduplicate, cap, truncate, sanitize and length-filter raw snippets.
///
/// Dedup keeps first occurrences in their original order. Snippets are cut
/// to `max_snippet_chars` before sanitization, must be longer than
/// `min_raw_chars` before and longer than `min_clean_chars` after it.
pub fn assemble_context(snippets: Vec<String>, config: &RetrievalConfig) -> Context {
    let mut seen = HashSet::new();
    let unique: Vec<String> = snippets
        .into_iter()
        .filter(|snippet| seen.insert(snippet.clone()))
        .take(config.max_snippets)
        .collect();

    let accepted = unique
        .iter()
        .filter_map(|snippet| {
            let raw = truncate_chars(snippet, config.max_snippet_chars).trim();
            if char_len(raw) <= config.min_raw_chars {
                debug!("Dropping short snippet ({} chars)", char_len(raw));
                return None;
            }

            let clean = sanitize(raw).trim().to_string();
            if char_len(&clean) <= config.min_clean_chars {
                debug!("Dropping snippet left with {} chars after cleaning", char_len(&clean));
                return None;
            }

            Some(clean)
        })
        .collect();

    Context::from_snippets(accepted)
}
