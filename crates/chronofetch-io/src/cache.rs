//! Hashed cache directory for one query configuration.

use std::fs;
use std::path::{Path, PathBuf};

use chronofetch_core::config::QueryConfig;

use crate::runlog::RunLog;

#[derive(Debug, Clone)]
pub struct CacheDir {
    path: PathBuf,
    existed_before: bool,
}

impl CacheDir {
    /// `<root>/<cache key>`, created when missing. Creation failures are
    /// logged; the run continues and fails later on the first segment write.
    pub fn open(root: &Path, config: &QueryConfig, log: &RunLog) -> Self {
        let path = root.join(config.cache_key());
        let existed_before = path.is_dir();
        if existed_before {
            log.debug(format!("Using existing cache directory {}", path.display()));
        } else {
            match fs::create_dir_all(&path) {
                Ok(()) => log.debug(format!("Created cache directory {}", path.display())),
                Err(e) => log.error(format!(
                    "Error creating cache directory {}: {e}",
                    path.display()
                )),
            }
        }
        Self {
            path,
            existed_before,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory was there before this run opened it.
    pub fn existed_before(&self) -> bool {
        self.existed_before
    }

    /// Delete the directory and everything in it. Best-effort.
    pub fn remove(&self, log: &RunLog) -> bool {
        if !self.path.exists() {
            log.info(format!("Directory {} does not exist.", self.path.display()));
            return false;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {
                log.info(format!("Directory {} was deleted.", self.path.display()));
                true
            }
            Err(e) => {
                log.warn(format!(
                    "Unable to delete directory {}: {e}",
                    self.path.display()
                ));
                false
            }
        }
    }
}
