//! Runtime: execute one extraction and report on it.
//!
//! `Engine::run` walks the stages in order:
//! - open the run log and the hashed cache directory, record metadata;
//! - start the memory sampler (not in isolation);
//! - plan sub-queries and run them through the fetch pool;
//! - merge the cached segments into a CSV file or an in-memory table.
//!
//! Teardown (sampler stop, summary, log relocation, ephemeral cache removal)
//! runs on every path, including a fail-fast abort, before the result is
//! returned.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chronofetch_core::config::{ExecSettings, QueryConfig};
use chronofetch_core::partition::Partitioner;
use chronofetch_core::table::Table;
use chronofetch_io::{metadata, CacheDir, RunLog};
use serde::Serialize;

use crate::aggregate::{order_cache_files, Aggregator};
use crate::backend::Backend;
use crate::error::ExecError;
use crate::scheduler::{FetchCounts, FetchPool};
use crate::telemetry::{bytes_to_mb, MemorySampler};

#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    File { path: PathBuf, rows: u64 },
    Table(Table),
}

impl Output {
    pub fn table(&self) -> Option<&Table> {
        match self {
            Output::Table(t) => Some(t),
            Output::File { .. } => None,
        }
    }

    pub fn into_table(self) -> Option<Table> {
        match self {
            Output::Table(t) => Some(t),
            Output::File { .. } => None,
        }
    }
}

/// Summary of a run. Logged at teardown and returned to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub elapsed: Duration,
    pub successes: usize,
    pub errors: usize,
    pub cache_hits: usize,
    pub backend_calls: usize,
    pub peak_memory_mb: f64,
}

impl RunReport {
    fn new(counts: FetchCounts, elapsed: Duration, peak_bytes: u64) -> Self {
        Self {
            elapsed,
            successes: counts.successes,
            errors: counts.errors,
            cache_hits: counts.cache_hits,
            backend_calls: counts.backend_calls,
            peak_memory_mb: bytes_to_mb(peak_bytes),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub output: Output,
    pub report: RunReport,
}

/// Engine owns the process-level settings; each `run` is independent.
pub struct Engine {
    settings: ExecSettings,
}

impl Engine {
    pub fn new(settings: ExecSettings) -> Self {
        Self { settings }
    }

    pub fn from_env() -> Self {
        Self::new(ExecSettings::from_env())
    }

    pub fn settings(&self) -> &ExecSettings {
        &self.settings
    }

    /// Run `config` against `backend`.
    pub fn run(&self, config: &QueryConfig, backend: &dyn Backend) -> Result<RunOutcome, ExecError> {
        let started = Instant::now();
        let log = Arc::new(RunLog::open(&self.settings.log_dir, config));
        log.info(config.to_string());

        let cache = CacheDir::open(&self.settings.cache_root, config, &log);
        if config.persist_cache() {
            match metadata::record_run(cache.path(), config) {
                Ok(path) => log.info(format!(
                    "File {} with query parameters is created.",
                    path.display()
                )),
                Err(e) => log.warn(format!("Cannot write cache metadata: {e}")),
            }
        }

        let sampler = (!config.isolated()).then(|| MemorySampler::start(Arc::clone(&log)));

        let mut counts = FetchCounts::default();
        let result = self.run_stages(config, backend, &cache, &log, &mut counts);

        if let Err(e) = &result {
            log.error(format!("Run aborted: {e}"));
        }
        let peak = sampler.map(MemorySampler::stop).unwrap_or(0);
        let report = RunReport::new(counts, started.elapsed(), peak);
        self.teardown(config, &cache, &log, &report);

        result.map(|output| RunOutcome { output, report })
    }

    fn run_stages(
        &self,
        config: &QueryConfig,
        backend: &dyn Backend,
        cache: &CacheDir,
        log: &RunLog,
        counts: &mut FetchCounts,
    ) -> Result<Output, ExecError> {
        let default_field = backend.default_time_field();
        let partitioner = Partitioner::new(config, default_field, cache.path());
        let subqueries = partitioner.plan();
        log.info(format!(
            "Planned {} sub-queries over {} partitions",
            subqueries.len(),
            config.partitions().len()
        ));

        let columns = config.column_names();
        let pool = FetchPool::new(backend, &columns, self.settings.workers, log)
            .fail_fast(!config.ignore_exceptions());
        let pooled = pool.run(&subqueries, &config.run_label());
        *counts = pooled.counts;
        if let Some(fatal) = pooled.fatal {
            return Err(fatal);
        }

        let mut files = pooled.files;
        order_cache_files(&mut files, config.ascending());

        let sort_field = match config.sort_field() {
            Some(field) => field.to_string(),
            None => partitioner.template().time_field().replace('.', "_"),
        };
        let aggregator =
            Aggregator::new(log, sort_field, config.ascending()).compress(config.compress());

        if config.return_table() {
            let table = aggregator.aggregate(&files)?;
            return Ok(Output::Table(table));
        }
        let path = config.output_path().to_path_buf();
        let rows = aggregator.write_csv(&files, &columns, &path)?;
        Ok(Output::File { path, rows })
    }

    fn teardown(&self, config: &QueryConfig, cache: &CacheDir, log: &RunLog, report: &RunReport) {
        log.info("-----------------");
        log.info(format!(
            "Execution time: {:.2} seconds",
            report.elapsed.as_secs_f64()
        ));
        log.info(format!(
            "Successes: {}, Errors: {}",
            report.successes, report.errors
        ));
        if report.peak_memory_mb > 0.0 {
            log.info(format!("Peak memory usage: {:.2} MB", report.peak_memory_mb));
        }

        if config.persist_cache() {
            log.relocate_into(cache.path());
        } else if !cache.existed_before() {
            cache.remove(log);
        }
    }
}
