//! Per-run log sink.
//!
//! A `RunLog` is created once per run and handed to every stage. Messages are
//! always mirrored to `tracing` (when the feature is on); for `Detailed` and
//! `Extra` verbosity they are also appended to `query_<label>.log`.
//! Isolated runs get a disabled log that drops everything.

use std::fs::{self, File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use chronofetch_core::config::{QueryConfig, Verbosity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARNING",
            Level::Error => "ERROR",
        }
    }
}

#[cfg(feature = "tracing")]
fn mirror(level: Level, msg: &str) {
    match level {
        Level::Debug => tracing::debug!(target: "chronofetch", "{msg}"),
        Level::Info => tracing::info!(target: "chronofetch", "{msg}"),
        Level::Warn => tracing::warn!(target: "chronofetch", "{msg}"),
        Level::Error => tracing::error!(target: "chronofetch", "{msg}"),
    }
}

#[cfg(not(feature = "tracing"))]
fn mirror(_level: Level, _msg: &str) {}

struct Sink {
    path: PathBuf,
    writer: LineWriter<File>,
}

pub struct RunLog {
    enabled: bool,
    verbosity: Verbosity,
    sink: Mutex<Option<Sink>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RunLog {
    /// Log for `config`, writing its file under `log_dir` when the verbosity
    /// asks for one. A file that cannot be created is reported and skipped.
    pub fn open(log_dir: &Path, config: &QueryConfig) -> Self {
        if config.isolated() {
            return Self::disabled();
        }
        let verbosity = config.verbosity();
        let mut sink = None;
        if verbosity.writes_log_file() {
            let path = log_dir.join(format!("query_{}.log", config.run_label()));
            let opened = fs::create_dir_all(log_dir).and_then(|_| {
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&path)
            });
            match opened {
                Ok(file) => {
                    sink = Some(Sink {
                        path,
                        writer: LineWriter::new(file),
                    })
                }
                Err(e) => mirror(
                    Level::Warn,
                    &format!("cannot create run log file {}: {e}", path.display()),
                ),
            }
        }
        Self {
            enabled: true,
            verbosity,
            sink: Mutex::new(sink),
        }
    }

    /// Mirror to `tracing` only.
    pub fn console(verbosity: Verbosity) -> Self {
        Self {
            enabled: true,
            verbosity,
            sink: Mutex::new(None),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            verbosity: Verbosity::Basic,
            sink: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn path(&self) -> Option<PathBuf> {
        lock(&self.sink).as_ref().map(|s| s.path.clone())
    }

    pub fn debug(&self, msg: impl AsRef<str>) {
        self.log(Level::Debug, msg.as_ref());
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.log(Level::Info, msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.log(Level::Warn, msg.as_ref());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        self.log(Level::Error, msg.as_ref());
    }

    pub fn log(&self, level: Level, msg: &str) {
        if !self.enabled {
            return;
        }
        if level == Level::Debug && !self.verbosity.includes_debug() {
            return;
        }

        mirror(level, msg);

        let mut guard = lock(&self.sink);
        if let Some(sink) = guard.as_mut() {
            let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
            // A failing log write must not fail the run.
            let _ = writeln!(sink.writer, "{stamp} - {} - {msg}", level.as_str());
        }
    }

    /// Move the log file into `dir` and close it. Best-effort: failures are
    /// reported through `tracing` and the file stays where it was.
    pub fn relocate_into(&self, dir: &Path) -> Option<PathBuf> {
        let mut guard = lock(&self.sink);
        let mut sink = guard.take()?;
        let _ = sink.writer.flush();
        let from = sink.path.clone();
        drop(sink);

        let name = from.file_name()?;
        let to = dir.join(name);
        let moved = fs::rename(&from, &to)
            .or_else(|_| fs::copy(&from, &to).and_then(|_| fs::remove_file(&from)));
        match moved {
            Ok(()) => Some(to),
            Err(e) => {
                mirror(
                    Level::Warn,
                    &format!(
                        "cannot relocate run log {} to {}: {e}",
                        from.display(),
                        to.display()
                    ),
                );
                None
            }
        }
    }
}
