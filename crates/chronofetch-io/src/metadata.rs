//! `INFO.md`: what a cache directory holds.
//!
//! The file describes the query shape behind the directory's hash and lists
//! every partition that has ever been fetched into it. Each run merges its
//! partitions into the existing list.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use chronofetch_core::config::QueryConfig;
use chronofetch_core::partition::partition_sort_key;

use crate::error::Result;

pub const METADATA_FILE: &str = "INFO.md";
pub const SEPARATOR: &str = "------------------------------------";

/// Partitions already recorded in an existing metadata file.
pub fn recorded_partitions(text: &str) -> BTreeSet<String> {
    text.lines()
        .skip_while(|line| line.trim_end() != SEPARATOR)
        .skip(1)
        .flat_map(|line| line.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Partition names sorted by their date token, dateless names first.
pub fn sorted_partitions(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut names: Vec<String> = names.into_iter().collect();
    names.sort_by_key(|n| partition_sort_key(n));
    names.dedup();
    names
}

pub fn render(config: &QueryConfig, partitions: &[String], launched_at: &str) -> String {
    format!(
        "Query data: \n\
         Fields: {}\n\
         Name of Type: {}\n\
         Event Type: {}\n\
         Extra Condition: {}\n\
         Time step: {}\n\
         Last Launch Time: {}\n\
         {}\n\
         {}\n",
        config.fields(),
        config.type_field(),
        config.type_value(),
        config.extra_condition(),
        config.window_hours(),
        launched_at,
        SEPARATOR,
        partitions.join(", ")
    )
}

/// Merge this run's partitions into `<dir>/INFO.md` and rewrite it.
pub fn record_run(dir: &Path, config: &QueryConfig) -> Result<PathBuf> {
    let path = dir.join(METADATA_FILE);
    let mut known = match fs::read_to_string(&path) {
        Ok(text) => recorded_partitions(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
        Err(e) => return Err(e.into()),
    };
    known.extend(config.partitions().iter().cloned());
    let partitions = sorted_partitions(known);
    let launched_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    fs::write(&path, render(config, &partitions, &launched_at))?;
    Ok(path)
}
