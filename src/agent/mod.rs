//! LLM agent modules.
//!
//! This module provides the shared inference client and the prompted
//! agents built on top of it.

pub mod client;
pub mod roles;

pub use client::{Inference, InferenceError, OllamaClient};
pub use roles::Agent;
