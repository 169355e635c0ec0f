//! Query configuration, validation, and process-level execution settings.
//!
//! `QueryConfig` is an immutable value built once per run through
//! `QueryConfigBuilder` (or `QueryConfig::from_json`). Every invariant is
//! checked in `build()`; the rest of the pipeline never re-validates.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::cache_key;
use crate::query::QueryTemplate;

pub const DEFAULT_WINDOW_HOURS: u32 = 4;
pub const MIN_WINDOW_HOURS: u32 = 1;
pub const MAX_WINDOW_HOURS: u32 = 12;
pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_CACHE_ROOT: &str = "cache_storage";
pub const OUTPUT_EXTENSION: &str = "csv";

/// Backtick-quoted or bare identifiers separated by ", ".
const FIELDS_PATTERN: &str = r"^(`[\w.$@]+`|[\w.$@]+)(, (`[\w.$@]+`|[\w.$@]+))*$";

/// How much a run reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Console summary only, no log file.
    Basic,
    /// Log file with one line per sub-query outcome.
    #[default]
    Detailed,
    /// Log file plus debug lines and memory samples.
    Extra,
    /// Everything through `tracing`, no log file.
    Full,
}

impl Verbosity {
    pub fn writes_log_file(self) -> bool {
        matches!(self, Verbosity::Detailed | Verbosity::Extra)
    }

    pub fn includes_debug(self) -> bool {
        matches!(self, Verbosity::Extra | Verbosity::Full)
    }
}

/// Closed UTC interval `[start, end]`, truncated to millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new<Tz: TimeZone>(start: DateTime<Tz>, end: DateTime<Tz>) -> Result<Self> {
        let start = start.with_timezone(&Utc).trunc_subsecs(3);
        let end = end.with_timezone(&Utc).trunc_subsecs(3);
        if start > end {
            return Err(Error::InvalidConfiguration(format!(
                "time range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Literal form of time values inside rendered queries.
///
/// The two backends in use disagree on literal syntax, so the format is a
/// configuration-time decision keyed on the type-field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeLiteralFormat {
    /// `2024-01-01T04:00:00.000Z`
    IsoMillisZ,
    /// `2024-01-01 04:00:00.000000`
    SpaceMicros,
}

impl TimeLiteralFormat {
    pub fn for_type_field(type_field: &str) -> Self {
        if type_field == "Type" {
            TimeLiteralFormat::SpaceMicros
        } else {
            TimeLiteralFormat::IsoMillisZ
        }
    }

    pub fn format(self, t: &DateTime<Utc>) -> String {
        match self {
            TimeLiteralFormat::IsoMillisZ => t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            TimeLiteralFormat::SpaceMicros => t.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        }
    }
}

/// Ordering applied to the planned sub-queries before they reach the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShuffleMode {
    #[default]
    Random,
    Seeded(u64),
    Disabled,
}

/// Process-level knobs that are not part of a query's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSettings {
    /// Upper bound on fetch workers; the pool never exceeds the sub-query count.
    pub workers: usize,
    /// Parent of all hashed cache directories.
    pub cache_root: PathBuf,
    /// Where run log files are created before relocation.
    pub log_dir: PathBuf,
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            cache_root: PathBuf::from(DEFAULT_CACHE_ROOT),
            log_dir: PathBuf::from("."),
        }
    }
}

impl ExecSettings {
    /// Defaults overridden by `CHRONOFETCH_WORKERS`, `CHRONOFETCH_CACHE_ROOT`
    /// and `CHRONOFETCH_LOG_DIR`. Unparseable worker counts are ignored.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(workers) = std::env::var("CHRONOFETCH_WORKERS")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|w| *w > 0)
        {
            settings.workers = workers;
        }
        if let Ok(root) = std::env::var("CHRONOFETCH_CACHE_ROOT") {
            if !root.trim().is_empty() {
                settings.cache_root = PathBuf::from(root);
            }
        }
        if let Ok(dir) = std::env::var("CHRONOFETCH_LOG_DIR") {
            if !dir.trim().is_empty() {
                settings.log_dir = PathBuf::from(dir);
            }
        }
        settings
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = root.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct QueryConfig {
    partitions: Vec<String>,
    fields: String,
    type_field: String,
    type_value: String,
    extra_condition: String,
    output_path: PathBuf,
    verbosity: Verbosity,
    ascending: bool,
    persist_cache: bool,
    return_table: bool,
    compress: bool,
    window_hours: u32,
    time_range: Option<TimeRange>,
    time_field: Option<String>,
    sort_field: Option<String>,
    ignore_exceptions: bool,
    isolated: bool,
    time_format: TimeLiteralFormat,
    shuffle: ShuffleMode,
}

impl QueryConfig {
    pub fn builder(
        partitions: impl IntoIterator<Item = impl Into<String>>,
        fields: impl Into<String>,
        type_field: impl Into<String>,
        type_value: impl Into<String>,
    ) -> QueryConfigBuilder {
        QueryConfigBuilder::new(partitions, fields, type_field, type_value)
    }

    /// Parse and validate a JSON document. `window_hours` may be a number or
    /// a numeric string.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawQueryConfig = serde_json::from_str(text)?;
        raw.into_builder()?.build()
    }

    pub fn partitions(&self) -> &[String] {
        &self.partitions
    }

    pub fn fields(&self) -> &str {
        &self.fields
    }

    pub fn type_field(&self) -> &str {
        &self.type_field
    }

    pub fn type_value(&self) -> &str {
        &self.type_value
    }

    pub fn extra_condition(&self) -> &str {
        &self.extra_condition
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn ascending(&self) -> bool {
        self.ascending
    }

    /// Cache survives the run. Always false in isolation mode.
    pub fn persist_cache(&self) -> bool {
        self.persist_cache
    }

    pub fn return_table(&self) -> bool {
        self.return_table
    }

    pub fn compress(&self) -> bool {
        self.compress
    }

    pub fn window_hours(&self) -> u32 {
        self.window_hours
    }

    pub fn time_range(&self) -> Option<&TimeRange> {
        self.time_range.as_ref()
    }

    pub fn time_field(&self) -> Option<&str> {
        self.time_field.as_deref()
    }

    pub fn sort_field(&self) -> Option<&str> {
        self.sort_field.as_deref()
    }

    pub fn ignore_exceptions(&self) -> bool {
        self.ignore_exceptions
    }

    pub fn isolated(&self) -> bool {
        self.isolated
    }

    pub fn time_format(&self) -> TimeLiteralFormat {
        self.time_format
    }

    pub fn shuffle(&self) -> ShuffleMode {
        self.shuffle
    }

    /// Name of the hashed cache directory for this configuration.
    pub fn cache_key(&self) -> String {
        cache_key(
            &self.fields,
            &self.type_field,
            &self.type_value,
            &self.extra_condition,
            self.window_hours,
        )
    }

    /// Column names the backend is asked for and the CSV header carries.
    pub fn column_names(&self) -> Vec<String> {
        self.fields
            .split(',')
            .map(normalize_column_name)
            .filter(|n| !n.is_empty())
            .collect()
    }

    /// Query template bound to the time field the backend filters on.
    pub fn template(&self, time_field: &str) -> QueryTemplate {
        QueryTemplate::new(
            &self.fields,
            &self.type_field,
            &self.type_value,
            &self.extra_condition,
            self.time_field.as_deref().unwrap_or(time_field),
            self.time_format,
        )
    }

    /// Label used for log file names and progress lines.
    pub fn run_label(&self) -> String {
        self.output_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.type_value.clone())
    }
}

impl fmt::Display for QueryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview = self
            .partitions
            .first()
            .map(|p| self.template("").render(p, None))
            .unwrap_or_default();
        let bound = |t: Option<DateTime<Utc>>| {
            t.map(|t| t.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
                .unwrap_or_else(|| "None".to_string())
        };
        writeln!(f)?;
        writeln!(f, "QUERY EXAMPLE: ")?;
        writeln!(f, "{preview}")?;
        writeln!(
            f,
            "gte (UTC+0): {} ",
            bound(self.time_range.map(|r| r.start()))
        )?;
        writeln!(f, "lte (UTC+0): {} ", bound(self.time_range.map(|r| r.end())))
    }
}

/// Strip `@` and backticks and replace dots, e.g. `` `@event.ts` `` → `event_ts`.
pub fn normalize_column_name(field: &str) -> String {
    field
        .trim()
        .replace('@', "")
        .replace('.', "_")
        .replace('`', "")
}

pub fn validate_fields(fields: &str) -> Result<()> {
    if fields.contains('*') {
        return Err(Error::InvalidConfiguration(
            "fields must list columns explicitly; '*' is not allowed".into(),
        ));
    }
    static RE: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(FIELDS_PATTERN))
        .as_ref()
        .map_err(|e| Error::InvalidConfiguration(format!("fields pattern: {e}")))?;
    if !re.is_match(fields) {
        return Err(Error::InvalidConfiguration(format!(
            "invalid fields format: '{fields}'"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum WindowInput {
    Default,
    Hours(i64),
    Text(String),
}

impl WindowInput {
    fn resolve(&self) -> Result<u32> {
        let hours = match self {
            WindowInput::Default => return Ok(DEFAULT_WINDOW_HOURS),
            WindowInput::Hours(h) => *h,
            WindowInput::Text(s) => s.trim().parse::<i64>().map_err(|_| {
                Error::InvalidConfiguration(format!("window size '{s}' is not numeric"))
            })?,
        };
        if hours < MIN_WINDOW_HOURS as i64 || hours > MAX_WINDOW_HOURS as i64 {
            Ok(DEFAULT_WINDOW_HOURS)
        } else {
            Ok(hours as u32)
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryConfigBuilder {
    partitions: Vec<String>,
    fields: String,
    type_field: String,
    type_value: String,
    extra_condition: String,
    output_path: Option<PathBuf>,
    verbosity: Verbosity,
    ascending: bool,
    persist_cache: bool,
    return_table: bool,
    compress: bool,
    window: WindowInput,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    time_field: Option<String>,
    sort_field: Option<String>,
    ignore_exceptions: bool,
    isolated: bool,
    time_format: Option<TimeLiteralFormat>,
    shuffle: ShuffleMode,
}

impl QueryConfigBuilder {
    pub fn new(
        partitions: impl IntoIterator<Item = impl Into<String>>,
        fields: impl Into<String>,
        type_field: impl Into<String>,
        type_value: impl Into<String>,
    ) -> Self {
        Self {
            partitions: partitions.into_iter().map(Into::into).collect(),
            fields: fields.into(),
            type_field: type_field.into(),
            type_value: type_value.into(),
            extra_condition: String::new(),
            output_path: None,
            verbosity: Verbosity::default(),
            ascending: true,
            persist_cache: false,
            return_table: false,
            compress: false,
            window: WindowInput::Default,
            start: None,
            end: None,
            time_field: None,
            sort_field: None,
            ignore_exceptions: false,
            isolated: false,
            time_format: None,
            shuffle: ShuffleMode::default(),
        }
    }

    pub fn extra_condition(mut self, condition: impl Into<String>) -> Self {
        self.extra_condition = condition.into();
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn ascending(mut self, ascending: bool) -> Self {
        self.ascending = ascending;
        self
    }

    pub fn persist_cache(mut self, persist: bool) -> Self {
        self.persist_cache = persist;
        self
    }

    pub fn return_table(mut self, return_table: bool) -> Self {
        self.return_table = return_table;
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Values outside `[1, 12]` fall back to the default of 4.
    pub fn window_hours(mut self, hours: i64) -> Self {
        self.window = WindowInput::Hours(hours);
        self
    }

    /// Textual window size; non-numeric text fails `build()`.
    pub fn window_hours_text(mut self, text: impl Into<String>) -> Self {
        self.window = WindowInput::Text(text.into());
        self
    }

    pub fn start<Tz: TimeZone>(mut self, start: DateTime<Tz>) -> Self {
        self.start = Some(start.with_timezone(&Utc));
        self
    }

    pub fn end<Tz: TimeZone>(mut self, end: DateTime<Tz>) -> Self {
        self.end = Some(end.with_timezone(&Utc));
        self
    }

    pub fn time_range<Tz: TimeZone>(self, start: DateTime<Tz>, end: DateTime<Tz>) -> Self {
        self.start(start).end(end)
    }

    /// Override the backend's default time field in rendered clauses.
    pub fn time_field(mut self, field: impl Into<String>) -> Self {
        self.time_field = Some(field.into());
        self
    }

    pub fn sort_field(mut self, field: impl Into<String>) -> Self {
        self.sort_field = Some(field.into());
        self
    }

    pub fn ignore_exceptions(mut self, ignore: bool) -> Self {
        self.ignore_exceptions = ignore;
        self
    }

    pub fn isolated(mut self, isolated: bool) -> Self {
        self.isolated = isolated;
        self
    }

    pub fn time_format(mut self, format: TimeLiteralFormat) -> Self {
        self.time_format = Some(format);
        self
    }

    pub fn shuffle(mut self, shuffle: ShuffleMode) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn build(mut self) -> Result<QueryConfig> {
        if self.partitions.is_empty() {
            return Err(Error::InvalidConfiguration(
                "at least one partition is required".into(),
            ));
        }
        if self.partitions.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::InvalidConfiguration(
                "partition names must be non-empty".into(),
            ));
        }
        let mut seen = HashSet::new();
        self.partitions.retain(|p| seen.insert(p.clone()));
        validate_fields(&self.fields)?;
        if self.type_field.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "type field must be non-empty".into(),
            ));
        }
        for (what, value) in [("time field", &self.time_field), ("sort field", &self.sort_field)] {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(Error::InvalidConfiguration(format!(
                    "{what} override must be non-empty"
                )));
            }
        }

        let window_hours = self.window.resolve()?;

        let time_range = match (self.start, self.end) {
            (Some(start), Some(end)) => Some(TimeRange::new(start, end)?),
            (None, None) => None,
            _ => {
                return Err(Error::InvalidConfiguration(
                    "time range bounds must be both set or both absent".into(),
                ))
            }
        };

        let output_path = self
            .output_path
            .unwrap_or_else(|| PathBuf::from(format!("{}_out.csv", self.type_value)));
        if !self.return_table {
            let is_csv = output_path
                .extension()
                .map(|ext| ext == OUTPUT_EXTENSION)
                .unwrap_or(false);
            if !is_csv {
                return Err(Error::UnsupportedOutputFormat(format!(
                    "'{}' (only .{} files can be written)",
                    output_path.display(),
                    OUTPUT_EXTENSION
                )));
            }
        }

        let time_format = self
            .time_format
            .unwrap_or_else(|| TimeLiteralFormat::for_type_field(&self.type_field));

        Ok(QueryConfig {
            partitions: self.partitions,
            fields: self.fields,
            type_field: self.type_field,
            type_value: self.type_value,
            extra_condition: self.extra_condition,
            output_path,
            verbosity: self.verbosity,
            ascending: self.ascending,
            persist_cache: self.persist_cache && !self.isolated,
            return_table: self.return_table,
            compress: self.compress,
            window_hours,
            time_range,
            time_field: self.time_field,
            sort_field: self.sort_field,
            ignore_exceptions: self.ignore_exceptions,
            isolated: self.isolated,
            time_format,
            shuffle: self.shuffle,
        })
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawQueryConfig {
    partitions: Vec<String>,
    fields: String,
    type_field: String,
    #[serde(default)]
    type_value: String,
    #[serde(default)]
    extra_condition: String,
    #[serde(default)]
    output_path: Option<PathBuf>,
    #[serde(default)]
    verbosity: Verbosity,
    #[serde(default = "default_true")]
    ascending: bool,
    #[serde(default)]
    persist_cache: bool,
    #[serde(default)]
    return_table: bool,
    #[serde(default)]
    compress: bool,
    #[serde(default)]
    window_hours: Option<serde_json::Value>,
    #[serde(default)]
    start: Option<DateTime<Utc>>,
    #[serde(default)]
    end: Option<DateTime<Utc>>,
    #[serde(default)]
    time_field: Option<String>,
    #[serde(default)]
    sort_field: Option<String>,
    #[serde(default)]
    ignore_exceptions: bool,
    #[serde(default)]
    isolated: bool,
    #[serde(default)]
    time_format: Option<TimeLiteralFormat>,
    #[serde(default)]
    shuffle: ShuffleMode,
}

impl RawQueryConfig {
    fn into_builder(self) -> Result<QueryConfigBuilder> {
        let mut b = QueryConfigBuilder::new(
            self.partitions,
            self.fields,
            self.type_field,
            self.type_value,
        )
        .extra_condition(self.extra_condition)
        .verbosity(self.verbosity)
        .ascending(self.ascending)
        .persist_cache(self.persist_cache)
        .return_table(self.return_table)
        .compress(self.compress)
        .ignore_exceptions(self.ignore_exceptions)
        .isolated(self.isolated)
        .shuffle(self.shuffle);

        b.output_path = self.output_path;
        b.start = self.start;
        b.end = self.end;
        b.time_field = self.time_field;
        b.sort_field = self.sort_field;
        b.time_format = self.time_format;

        b.window = match self.window_hours {
            None | Some(serde_json::Value::Null) => WindowInput::Default,
            Some(serde_json::Value::Number(n)) => match n.as_i64() {
                Some(h) => WindowInput::Hours(h),
                None => {
                    return Err(Error::InvalidConfiguration(format!(
                        "window size {n} is not a whole number of hours"
                    )))
                }
            },
            Some(serde_json::Value::String(s)) => WindowInput::Text(s),
            Some(other) => {
                return Err(Error::InvalidConfiguration(format!(
                    "window size {other} is not numeric"
                )))
            }
        };
        Ok(b)
    }
}
