//! Answer pipeline orchestration.
//!
//! This module sequences the agents and the retrieval engine for a
//! single question.

pub mod orchestrator;

pub use orchestrator::{Answerer, Orchestrator, PipelineError};
