//! Bounded fetch pool.
//!
//! Workers claim sub-queries through a shared index and report a typed
//! `FetchOutcome` over a channel. The calling thread owns every counter and
//! all logging; workers never share mutable state beyond the index and the
//! cancel flag.
//!
//! In fail-fast mode the first failure raises the cancel flag: workers finish
//! the sub-query in hand and stop claiming new ones.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;

use chronofetch_core::partition::SubQuery;
use chronofetch_io::error::Error as IoError;
use chronofetch_io::segment::{segment_exists, write_segment};
use chronofetch_io::RunLog;

use crate::backend::Backend;
use crate::error::{BackendError, ExecError};
use crate::progress::Progress;

#[derive(Debug)]
pub enum FetchFailure {
    Backend(BackendError),
    CacheWrite(IoError),
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchFailure::Backend(e) => write!(f, "{e}"),
            FetchFailure::CacheWrite(e) => write!(f, "cache write failed: {e}"),
        }
    }
}

impl FetchFailure {
    fn into_exec_error(self, sq: &SubQuery) -> ExecError {
        match self {
            FetchFailure::Backend(source) => ExecError::Backend {
                query: sq.text().to_string(),
                source,
            },
            FetchFailure::CacheWrite(source) => ExecError::CacheWrite {
                path: sq.cache_file().to_path_buf(),
                source,
            },
        }
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    /// Segment already on disk; no backend call.
    CacheHit,
    /// Backend returned no rows; nothing cached.
    Empty,
    Fetched { rows: usize, bytes: u64 },
    Failed(FetchFailure),
}

/// Counters reduced from all outcomes of one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchCounts {
    pub successes: usize,
    pub errors: usize,
    pub cache_hits: usize,
    pub backend_calls: usize,
    pub empty: usize,
}

#[derive(Debug, Default)]
pub struct PoolReport {
    pub counts: FetchCounts,
    /// Cache files holding data for this run, pre-existing or fresh.
    pub files: Vec<PathBuf>,
    /// First fatal failure; set only in fail-fast mode or on a worker panic.
    pub fatal: Option<ExecError>,
}

/// Process one sub-query: cache check, fetch, cache write.
pub fn execute_one(backend: &dyn Backend, columns: &[String], sq: &SubQuery) -> FetchOutcome {
    if segment_exists(sq.cache_file()) {
        return FetchOutcome::CacheHit;
    }
    match backend.fetch(sq.text(), columns) {
        Err(e) => FetchOutcome::Failed(FetchFailure::Backend(e)),
        Ok(table) if table.is_empty() => FetchOutcome::Empty,
        Ok(table) => match write_segment(sq.cache_file(), &table) {
            Ok(bytes) => FetchOutcome::Fetched {
                rows: table.num_rows(),
                bytes,
            },
            Err(e) => FetchOutcome::Failed(FetchFailure::CacheWrite(e)),
        },
    }
}

pub struct FetchPool<'a> {
    backend: &'a dyn Backend,
    columns: &'a [String],
    workers: usize,
    fail_fast: bool,
    log: &'a RunLog,
}

impl<'a> FetchPool<'a> {
    pub fn new(
        backend: &'a dyn Backend,
        columns: &'a [String],
        workers: usize,
        log: &'a RunLog,
    ) -> Self {
        Self {
            backend,
            columns,
            workers: workers.max(1),
            fail_fast: true,
            log,
        }
    }

    pub fn fail_fast(mut self, on: bool) -> Self {
        self.fail_fast = on;
        self
    }

    pub fn run(&self, subqueries: &[SubQuery], label: &str) -> PoolReport {
        let mut report = PoolReport::default();
        if subqueries.is_empty() {
            self.log.info("No sub-queries to run");
            return report;
        }

        let workers = self.workers.min(subqueries.len());
        let next = AtomicUsize::new(0);
        let cancel = AtomicBool::new(false);
        let mut progress = Progress::new(label, subqueries.len());
        let (tx, rx) = mpsc::channel::<(usize, FetchOutcome)>();

        self.log.debug(format!(
            "Starting {workers} fetch workers for {} sub-queries",
            subqueries.len()
        ));

        let panicked = std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for worker_id in 0..workers {
                let tx = tx.clone();
                let next = &next;
                let cancel = &cancel;
                let spawned = std::thread::Builder::new()
                    .name(format!("fetch-{worker_id}"))
                    .spawn_scoped(scope, move || loop {
                        if cancel.load(Ordering::Acquire) {
                            break;
                        }
                        let i = next.fetch_add(1, Ordering::AcqRel);
                        let Some(sq) = subqueries.get(i) else {
                            break;
                        };
                        let outcome = execute_one(self.backend, self.columns, sq);
                        if tx.send((i, outcome)).is_err() {
                            break;
                        }
                    });
                match spawned {
                    Ok(handle) => handles.push((worker_id, handle)),
                    Err(e) => self
                        .log
                        .error(format!("Cannot start fetch worker {worker_id}: {e}")),
                }
            }
            drop(tx);

            if handles.is_empty() {
                report.fatal = Some(ExecError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "no fetch worker could be started",
                )));
                return Vec::new();
            }

            for (i, outcome) in rx {
                let Some(sq) = subqueries.get(i) else {
                    continue;
                };
                self.reduce(sq, outcome, &mut report, &cancel);
                progress.tick(self.log);
            }

            handles
                .into_iter()
                .filter_map(|(id, handle)| handle.join().is_err().then_some(id))
                .collect::<Vec<_>>()
        });

        if let Some(&id) = panicked.first() {
            self.log.error(format!("Fetch worker {id} panicked"));
            if report.fatal.is_none() {
                report.fatal = Some(ExecError::WorkerPanic(id));
            }
        }
        report
    }

    fn reduce(
        &self,
        sq: &SubQuery,
        outcome: FetchOutcome,
        report: &mut PoolReport,
        cancel: &AtomicBool,
    ) {
        let counts = &mut report.counts;
        match outcome {
            FetchOutcome::CacheHit => {
                counts.successes += 1;
                counts.cache_hits += 1;
                report.files.push(sq.cache_file().to_path_buf());
                self.log.debug(format!("\"{}\" --- CACHED", sq.text()));
            }
            FetchOutcome::Empty => {
                counts.successes += 1;
                counts.backend_calls += 1;
                counts.empty += 1;
                self.log.info(format!("\"{}\" --- EMPTY", sq.text()));
            }
            FetchOutcome::Fetched { rows, bytes } => {
                counts.successes += 1;
                counts.backend_calls += 1;
                report.files.push(sq.cache_file().to_path_buf());
                self.log.info(format!("\"{}\" --- OK", sq.text()));
                self.log
                    .debug(format!("{rows} rows, {bytes} bytes -> {}", sq.cache_file().display()));
            }
            FetchOutcome::Failed(failure) => {
                counts.errors += 1;
                if matches!(failure, FetchFailure::Backend(_)) {
                    counts.backend_calls += 1;
                }
                self.log
                    .error(format!("\"{}\" --- ERROR: {failure}", sq.text()));
                if self.fail_fast {
                    cancel.store(true, Ordering::Release);
                    if report.fatal.is_none() {
                        report.fatal = Some(failure.into_exec_error(sq));
                    }
                }
            }
        }
    }
}
