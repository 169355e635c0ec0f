use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by a `Backend`. The pipeline never retries; the flag is
/// carried for diagnostics only.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
    retryable: bool,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("configuration: {0}")]
    Config(#[from] chronofetch_core::error::Error),

    #[error("backend failed on \"{query}\": {source}")]
    Backend {
        query: String,
        #[source]
        source: BackendError,
    },

    #[error("cannot write cache segment {}: {source}", path.display())]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: chronofetch_io::error::Error,
    },

    #[error("storage: {0}")]
    Storage(#[from] chronofetch_io::error::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("aggregation: {0}")]
    Aggregate(String),

    #[error("fetch worker {0} panicked")]
    WorkerPanic(usize),
}

impl ExecError {
    /// The run was aborted by a failing sub-query rather than a local fault.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, ExecError::Backend { .. } | ExecError::CacheWrite { .. })
    }

    pub fn suggestions(&self) -> Vec<String> {
        match self {
            ExecError::Config(e) => e.suggestions(),
            ExecError::Storage(e) => e.suggestions(),
            ExecError::Backend { source, .. } if source.is_retryable() => vec![
                "The backend reported a transient failure; rerun to resume from the cache".into(),
            ],
            ExecError::Backend { .. } => vec![
                "Set ignore_exceptions to finish the run with partial data".into(),
                "Completed windows are cached; a rerun only fetches what is missing".into(),
            ],
            ExecError::CacheWrite { .. } => vec![
                "Check that the cache root is writable and has free space".into(),
            ],
            _ => vec![],
        }
    }
}
