//! Per-question answer checkpoints.
//!
//! A checkpoint exists for an index once its answer has been persisted; that
//! presence is the only resume signal. Checkpoints are written once and never
//! overwritten.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Errors from checkpoint persistence. Any of these halts a batch.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint {0} already exists")]
    AlreadyExists(usize),

    #[error("Checkpoint I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Store of answers keyed by 1-based question index.
pub trait CheckpointStore {
    fn exists(&self, index: usize) -> bool;

    /// The stored answer line, or `None` when no checkpoint exists.
    fn get(&self, index: usize) -> Result<Option<String>, CheckpointError>;

    /// Persist an answer. Fails if a checkpoint for `index` is already present.
    fn put(&self, index: usize, answer: &str) -> Result<(), CheckpointError>;
}

/// One `{prefix}_{index}.txt` file per question inside a directory.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    prefix: String,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}_{}.txt", self.prefix, index))
    }

    /// Path of the merged output next to the checkpoints.
    pub fn merged_path(&self) -> PathBuf {
        self.dir.join(format!("{}.txt", self.prefix))
    }

    fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CheckpointError + '_ {
        move |source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn exists(&self, index: usize) -> bool {
        self.path_for(index).is_file()
    }

    fn get(&self, index: usize) -> Result<Option<String>, CheckpointError> {
        let path = self.path_for(index);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(
                content.lines().next().unwrap_or("").trim().to_string(),
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(&path)(e)),
        }
    }

    fn put(&self, index: usize, answer: &str) -> Result<(), CheckpointError> {
        let path = self.path_for(index);
        fs::create_dir_all(&self.dir).map_err(Self::io_error(&self.dir))?;

        // Write to a temp file in the same directory, then link it into place
        // without clobbering, so a crash never leaves a half-written checkpoint.
        let mut file = NamedTempFile::new_in(&self.dir).map_err(Self::io_error(&self.dir))?;
        writeln!(file, "{}", answer).map_err(Self::io_error(file.path()))?;
        file.as_file().sync_all().map_err(Self::io_error(&path))?;

        file.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                CheckpointError::AlreadyExists(index)
            } else {
                Self::io_error(&path)(e.error)
            }
        })?;

        debug!("Wrote checkpoint {}", path.display());
        Ok(())
    }
}
