use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("checksum mismatch in segment {}", path.display())]
    Checksum { path: PathBuf },

    #[error("segment error: {0}")]
    Segment(String),

    #[error(transparent)]
    Core(#[from] chronofetch_core::error::Error),
}

impl Error {
    /// Corrupt or foreign cache files; deleting them forces a refetch.
    pub fn is_corrupt_segment(&self) -> bool {
        matches!(self, Error::Checksum { .. } | Error::Segment(_))
    }

    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Error::Checksum { path } => vec![
                format!("Delete {} to refetch it on the next run", path.display()),
                "Check the disk holding the cache root for errors".into(),
            ],
            Error::Io(_) => vec![
                "Check cache root and output path permissions".into(),
                "Verify disk space is available".into(),
            ],
            Error::Core(e) => e.suggestions(),
            _ => vec![],
        }
    }
}
