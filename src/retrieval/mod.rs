//! Web retrieval: search, fetch, extraction and sanitization.

pub mod engine;
pub mod extract;
pub mod fetch;
pub mod sanitizer;
pub mod search;

pub use engine::RetrievalEngine;
pub use fetch::HttpFetcher;
pub use search::DuckDuckGoSearch;
