//! Partition planning: split every partition into time-windowed sub-queries.
//!
//! Partition names carry their nominal span as a date token:
//! `logs-2024.01.15` covers one day, `logs-2024.01` a whole month. Names
//! without a token are queried in one piece. For dated partitions each day
//! is cut into windows of `window_hours`, clipped to the global range, and an
//! extra sub-query collects records that fall outside the nominal span.
//!
//! Planning is pure: cache paths are computed here but never touched.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::Regex;

use crate::config::{QueryConfig, ShuffleMode, TimeRange};
use crate::hash::short_digest;
use crate::query::{QueryTemplate, TimeClause};

pub const SEGMENT_EXT: &str = "seg";

const DATE_TOKEN: &str = r"(\d{4})\.(\d{2})(?:\.(\d{2}))?";

/// Millisecond stamp without `:` so it is usable in file names.
const STEM_TIME: &str = "%Y-%m-%dT%H%M%S%3f";

fn date_token() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DATE_TOKEN).ok()).as_ref()
}

/// Nominal time span of a dated partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionSpan {
    Day(NaiveDate),
    /// Holds the first day of the month.
    Month(NaiveDate),
}

impl PartitionSpan {
    pub fn first_day(&self) -> NaiveDate {
        match self {
            PartitionSpan::Day(d) | PartitionSpan::Month(d) => *d,
        }
    }

    /// First day after the span.
    pub fn end_day(&self) -> Option<NaiveDate> {
        match self {
            PartitionSpan::Day(d) => d.succ_opt(),
            PartitionSpan::Month(d) => d.checked_add_months(Months::new(1)),
        }
    }

    /// `[start, end)` in UTC.
    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((midnight(self.first_day()), midnight(self.end_day()?)))
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        let Some(end) = self.end_day() else {
            return vec![self.first_day()];
        };
        self.first_day().iter_days().take_while(|d| *d < end).collect()
    }
}

fn midnight(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// Extract the span encoded in a partition name, if any.
///
/// Tokens that do not form a real calendar date are treated as absent.
pub fn parse_partition_span(name: &str) -> Option<PartitionSpan> {
    let caps = date_token()?.captures(name)?;
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    match caps.get(3) {
        Some(day) => {
            let day: u32 = day.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day).map(PartitionSpan::Day)
        }
        None => NaiveDate::from_ymd_opt(year, month, 1).map(PartitionSpan::Month),
    }
}

/// Sort key used when listing partitions: dateless names first, then by date.
pub fn partition_sort_key(name: &str) -> (NaiveDate, String) {
    let date = parse_partition_span(name)
        .map(|s| s.first_day())
        .unwrap_or(NaiveDate::MIN);
    (date, name.to_string())
}

/// Clip the window `[start, end)` to the closed global range.
///
/// When the range ends inside the window the clipped window keeps its end
/// inclusive, so the range's last instant is fetched exactly once. Returns
/// `None` when nothing of the window remains.
pub fn clip_window(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    range: Option<&TimeRange>,
) -> Option<TimeClause> {
    let Some(range) = range else {
        return Some(TimeClause::Window {
            start,
            end,
            inclusive_end: false,
        });
    };
    let start = start.max(range.start());
    if range.end() < end {
        (start <= range.end()).then_some(TimeClause::Window {
            start,
            end: range.end(),
            inclusive_end: true,
        })
    } else {
        (start < end).then_some(TimeClause::Window {
            start,
            end,
            inclusive_end: false,
        })
    }
}

/// File stem of a regular window, taken from its clipped bounds.
///
/// An inclusive end is marked with a trailing `i`. Stems of one partition
/// sort lexically in time order.
pub fn window_stem(start: DateTime<Utc>, end: DateTime<Utc>, inclusive_end: bool) -> String {
    format!(
        "{}_{}{}",
        start.format(STEM_TIME),
        end.format(STEM_TIME),
        if inclusive_end { "i" } else { "" }
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubQueryKind {
    /// One time window of a dated partition.
    Regular,
    /// Records of a dated partition outside its nominal span.
    Extra,
    /// A dateless partition, queried in one piece.
    Full,
}

/// One unit of work: a rendered query bound to its cache file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubQuery {
    partition: String,
    kind: SubQueryKind,
    time: Option<TimeClause>,
    text: String,
    cache_file: PathBuf,
}

impl SubQuery {
    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn kind(&self) -> SubQueryKind {
        self.kind
    }

    pub fn time(&self) -> Option<&TimeClause> {
        self.time.as_ref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    /// Whether a record at `t` belongs to this sub-query's time predicate.
    pub fn covers(&self, t: DateTime<Utc>) -> bool {
        self.time.map_or(true, |c| c.contains(t))
    }
}

pub struct Partitioner<'a> {
    config: &'a QueryConfig,
    template: QueryTemplate,
    cache_dir: PathBuf,
}

impl<'a> Partitioner<'a> {
    /// `time_field` is the backend's default; a configured override wins.
    pub fn new(config: &'a QueryConfig, time_field: &str, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            template: config.template(time_field),
            cache_dir: cache_dir.into(),
        }
    }

    pub fn template(&self) -> &QueryTemplate {
        &self.template
    }

    /// Plan all partitions and apply the configured shuffle.
    pub fn plan(&self) -> Vec<SubQuery> {
        let mut subqueries = self.plan_ordered();
        shuffle_subqueries(&mut subqueries, self.config.shuffle());
        subqueries
    }

    /// Plan all partitions in configuration order without shuffling.
    pub fn plan_ordered(&self) -> Vec<SubQuery> {
        self.config
            .partitions()
            .iter()
            .flat_map(|p| self.plan_partition(p))
            .collect()
    }

    pub fn plan_partition(&self, name: &str) -> Vec<SubQuery> {
        let range = self.config.time_range();
        let Some(span) = parse_partition_span(name) else {
            let time = range.copied().map(TimeClause::Range);
            let stem = self.ranged_stem("full", time.as_ref());
            return vec![self.make(name, SubQueryKind::Full, time, stem)];
        };

        let mut out = Vec::new();
        for day in span.days() {
            self.push_day_windows(name, day, &mut out);
        }
        if let Some(extra) = self.extra(name, &span) {
            out.push(extra);
        }
        out
    }

    fn push_day_windows(&self, name: &str, day: NaiveDate, out: &mut Vec<SubQuery>) {
        let Some(next_day) = day.succ_opt() else {
            return;
        };
        let day_start = midnight(day);
        let day_end = midnight(next_day);
        let step = self.config.window_hours().max(1);
        let range = self.config.time_range();

        let mut hour = 0;
        while hour < 24 {
            let ws = day_start + Duration::hours(i64::from(hour));
            let we = if hour + step > 24 {
                day_end
            } else {
                ws + Duration::hours(i64::from(step))
            };
            hour += step;

            let Some(clause) = clip_window(ws, we, range) else {
                continue;
            };
            let TimeClause::Window {
                start,
                end,
                inclusive_end,
            } = clause
            else {
                continue;
            };
            let stem = window_stem(start, end, inclusive_end);
            out.push(self.make(name, SubQueryKind::Regular, Some(clause), stem));
        }
    }

    fn extra(&self, name: &str, span: &PartitionSpan) -> Option<SubQuery> {
        let (start, end) = span.bounds()?;
        let range = self.config.time_range().copied();
        if let Some(r) = range {
            if r.start() >= start && r.end() < end {
                return None;
            }
        }
        let clause = TimeClause::Outside {
            start,
            end,
            within: range,
        };
        let stem = self.ranged_stem("extra", range.and(Some(&clause)));
        Some(self.make(name, SubQueryKind::Extra, Some(clause), stem))
    }

    /// `base` when no range applies, otherwise `base_<digest of the clause>`
    /// so runs over different ranges never share a cache file.
    fn ranged_stem(&self, base: &str, ranged: Option<&TimeClause>) -> String {
        match ranged {
            Some(clause) => {
                let rendered =
                    clause.render(self.template.time_field(), self.template.time_format());
                format!("{base}_{}", short_digest(&rendered))
            }
            None => base.to_string(),
        }
    }

    fn make(
        &self,
        name: &str,
        kind: SubQueryKind,
        time: Option<TimeClause>,
        suffix: String,
    ) -> SubQuery {
        let cache_file = self
            .cache_dir
            .join(name)
            .join(format!("{name}_{suffix}.{SEGMENT_EXT}"));
        SubQuery {
            partition: name.to_string(),
            kind,
            text: self.template.render(name, time.as_ref()),
            time,
            cache_file,
        }
    }
}

pub fn shuffle_subqueries(subqueries: &mut [SubQuery], mode: ShuffleMode) {
    match mode {
        ShuffleMode::Random => subqueries.shuffle(&mut rand::thread_rng()),
        ShuffleMode::Seeded(seed) => subqueries.shuffle(&mut StdRng::seed_from_u64(seed)),
        ShuffleMode::Disabled => {}
    }
}
