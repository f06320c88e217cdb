//! Batch processing over question lists.
//!
//! This module loads question lists, answers them with checkpointed resume
//! and merges the checkpoints into one output file.

pub mod checkpoint;
pub mod runner;
pub mod source;

pub use checkpoint::FileCheckpointStore;
pub use runner::{merge_checkpoints, write_merged, BatchRunner};
pub use source::{continuation_index, load_questions, LineFormat};
