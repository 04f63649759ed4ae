//! Error types for the memoization core
//!
//! Library code returns [`MemoError`]; the CLI wraps it in `anyhow`.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MemoError>;

#[derive(Error, Debug)]
pub enum MemoError {
    /// The external command exited with a nonzero status. Never cached.
    #[error("Error while executing command \"{command}\" (exit code {exit_code}):\n{output}")]
    Execution {
        command: String,
        output: String,
        exit_code: i32,
    },

    /// Cluster submission finished but left no job log behind.
    #[error("Missing job output: no file matching '{pattern}' in {}", work_dir.display())]
    MissingJobOutput { work_dir: PathBuf, pattern: String },

    /// The snapshot backend itself failed.
    #[error("Snapshot {operation} failed: {message}")]
    Snapshot {
        operation: &'static str,
        message: String,
    },

    /// The persisted cache file exists but cannot be parsed.
    #[error("Cache file {} is corrupted: {source}", path.display())]
    CacheCorruption {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl MemoError {
    pub fn snapshot(operation: &'static str, message: impl Into<String>) -> Self {
        MemoError::Snapshot {
            operation,
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        MemoError::Io {
            context: context.into(),
            source,
        }
    }

    /// Short machine-readable code, used for error result items
    pub fn code(&self) -> &'static str {
        match self {
            MemoError::Execution { .. } => "EXECUTION_FAILURE",
            MemoError::MissingJobOutput { .. } => "MISSING_JOB_OUTPUT",
            MemoError::Snapshot { .. } => "SNAPSHOT_FAILURE",
            MemoError::CacheCorruption { .. } => "CACHE_CORRUPTION",
            MemoError::Io { .. } => "IO_ERROR",
        }
    }
}

/// Attach a context message to an `io::Result`
pub trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| MemoError::io(f(), e))
    }
}
