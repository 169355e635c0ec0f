//! Merge cache segments into the final result.
//!
//! Segments are read in batches of `READ_BATCH` files. Missing files, empty
//! files and zero-row tables are skipped with a log line; a corrupt segment
//! fails the aggregation.

use std::fs;
use std::path::{Path, PathBuf};

use chronofetch_core::table::Table;
use chronofetch_io::segment::read_segment;
use chronofetch_io::writers::CsvWriter;
use chronofetch_io::RunLog;

use crate::compress::compress_table;
use crate::error::ExecError;
use crate::telemetry::bytes_to_mb;

pub const READ_BATCH: usize = 10;

/// Column sorted on when the configured sort field is absent.
pub const FALLBACK_SORT_COLUMN: &str = "timestamp";

/// Sort cache files by name; window file names start with their window
/// start, so name order within a partition is time order.
pub fn order_cache_files(files: &mut [PathBuf], ascending: bool) {
    files.sort();
    if !ascending {
        files.reverse();
    }
}

pub struct Aggregator<'a> {
    log: &'a RunLog,
    sort_field: String,
    ascending: bool,
    compress: bool,
}

impl<'a> Aggregator<'a> {
    pub fn new(log: &'a RunLog, sort_field: impl Into<String>, ascending: bool) -> Self {
        Self {
            log,
            sort_field: sort_field.into(),
            ascending,
            compress: false,
        }
    }

    pub fn compress(mut self, on: bool) -> Self {
        self.compress = on;
        self
    }

    pub fn sort_field(&self) -> &str {
        &self.sort_field
    }

    /// Read one segment, or `None` when it is missing, empty, or has no rows.
    fn load(&self, path: &Path) -> Result<Option<Table>, ExecError> {
        match fs::metadata(path) {
            Err(_) => {
                self.log
                    .warn(format!("Cache file {} is missing, skipped", path.display()));
                return Ok(None);
            }
            Ok(meta) if meta.len() == 0 => {
                self.log
                    .warn(format!("Cache file {} is empty, skipped", path.display()));
                return Ok(None);
            }
            Ok(_) => {}
        }
        let table = read_segment(path)?;
        if table.is_empty() {
            self.log
                .debug(format!("Cache file {} holds no rows, skipped", path.display()));
            return Ok(None);
        }
        Ok(Some(table))
    }

    fn sort(&self, table: &mut Table) -> Result<(), ExecError> {
        let used = table
            .sort_by_time(&self.sort_field, FALLBACK_SORT_COLUMN, self.ascending)
            .map_err(|e| ExecError::Aggregate(e.to_string()))?;
        if used.is_none() && !table.is_empty() {
            self.log.warn(format!(
                "Neither '{}' nor '{}' present; rows left in file order",
                self.sort_field, FALLBACK_SORT_COLUMN
            ));
        }
        Ok(())
    }

    /// Concatenate all segments into one sorted (and optionally compressed)
    /// table.
    pub fn aggregate(&self, files: &[PathBuf]) -> Result<Table, ExecError> {
        let mut result = Table::empty();
        for (n, batch) in files.chunks(READ_BATCH).enumerate() {
            let mut tables = Vec::with_capacity(batch.len());
            for path in batch {
                if let Some(t) = self.load(path)? {
                    tables.push(t);
                }
            }
            let merged = Table::concat(tables).map_err(|e| ExecError::Aggregate(e.to_string()))?;
            result
                .append(merged)
                .map_err(|e| ExecError::Aggregate(e.to_string()))?;
            self.log.debug(format!(
                "Batch {} merged, {} rows so far",
                n + 1,
                result.num_rows()
            ));
        }

        self.sort(&mut result)?;
        if self.compress {
            compress_table(&mut result, self.log);
        }
        self.log.info(format!(
            "Final table memory usage: {:.2} MB",
            bytes_to_mb(result.estimated_size_bytes() as u64)
        ));
        Ok(result)
    }

    /// Stream every segment into a CSV file under `header`, sorting each
    /// segment on its own. Returns the number of data rows written.
    pub fn write_csv(
        &self,
        files: &[PathBuf],
        header: &[String],
        output: &Path,
    ) -> Result<u64, ExecError> {
        let mut writer = CsvWriter::to_path(output)?;
        writer.write_header(header)?;
        for path in files {
            let Some(mut table) = self.load(path)? else {
                continue;
            };
            self.sort(&mut table)?;
            writer.write_table(&table)?;
        }
        let rows = writer.rows_written();
        writer.finish()?;
        self.log.info(format!(
            "Wrote {rows} rows to {}",
            output.display()
        ));
        Ok(rows)
    }
}
