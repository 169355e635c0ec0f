//! Streaming CSV writer for `Table`s.
//!
//! The header is written once from an explicit column list; each table is
//! then written with its columns projected onto that header, so tables from
//! different cache segments line up even when a column is missing in one.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv as csv_crate;
use chronofetch_core::table::Table;

use crate::error::Result;

pub struct CsvWriter<W: Write> {
    wtr: csv_crate::Writer<W>,
    header: Option<Vec<String>>,
    rows_written: u64,
}

impl CsvWriter<File> {
    pub fn to_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self::to_writer(file))
    }
}

impl<W: Write> CsvWriter<W> {
    pub fn to_writer(writer: W) -> Self {
        Self {
            wtr: csv_crate::Writer::from_writer(writer),
            header: None,
            rows_written: 0,
        }
    }

    /// Create a writer that assumes headers have already been written.
    ///
    /// `columns` still drives the projection of every table.
    pub fn to_writer_skip_header(writer: W, columns: &[String]) -> Self {
        Self {
            wtr: csv_crate::Writer::from_writer(writer),
            header: Some(columns.to_vec()),
            rows_written: 0,
        }
    }

    pub fn write_header(&mut self, columns: &[String]) -> Result<()> {
        self.wtr.write_record(columns)?;
        self.wtr.flush()?;
        self.header = Some(columns.to_vec());
        Ok(())
    }

    /// Write every row of `table`. Without an explicit header the table's
    /// own column names become the header.
    pub fn write_table(&mut self, table: &Table) -> Result<()> {
        if self.header.is_none() {
            let names: Vec<String> = table.column_names().into_iter().map(String::from).collect();
            self.write_header(&names)?;
        }
        let header = self.header.as_deref().unwrap_or_default();
        let columns: Vec<_> = header.iter().map(|name| table.column(name)).collect();

        let mut row = Vec::with_capacity(columns.len());
        for row_idx in 0..table.num_rows() {
            row.clear();
            for col in &columns {
                let cell = col
                    .and_then(|c| c.data.value_string(row_idx))
                    .unwrap_or_default();
                row.push(cell);
            }
            self.wtr.write_record(&row)?;
            self.rows_written += 1;
        }
        self.wtr.flush()?;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(self) -> Result<W> {
        self.wtr
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()).into())
    }
}
