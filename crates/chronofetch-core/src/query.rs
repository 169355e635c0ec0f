//! Query text rendering.
//!
//! A `QueryTemplate` carries everything about a query except the partition
//! name and the time predicate; `render` fills those in per sub-query.

use chrono::{DateTime, Utc};

use crate::config::{TimeLiteralFormat, TimeRange};

/// Partitions whose name contains this marker hold records without a type
/// discriminator, so their queries omit the type filter.
pub const ACCOUNTS_MARKER: &str = "accounts";

pub fn is_accounts_partition(name: &str) -> bool {
    name.contains(ACCOUNTS_MARKER)
}

/// Time predicate of a single sub-query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeClause {
    /// `start <= t < end`, or `start <= t <= end` when `inclusive_end`.
    Window {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        inclusive_end: bool,
    },
    /// Records outside `[start, end)` of a partition's nominal span,
    /// optionally restricted to the global range.
    Outside {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        within: Option<TimeRange>,
    },
    /// The global range itself, for partitions without a date.
    Range(TimeRange),
}

impl TimeClause {
    /// Whether a record at instant `t` satisfies this clause.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        match self {
            TimeClause::Window {
                start,
                end,
                inclusive_end,
            } => t >= *start && if *inclusive_end { t <= *end } else { t < *end },
            TimeClause::Outside { start, end, within } => {
                (t < *start || t >= *end) && within.map_or(true, |r| r.contains(t))
            }
            TimeClause::Range(range) => range.contains(t),
        }
    }

    pub fn render(&self, field: &str, format: TimeLiteralFormat) -> String {
        let f = quote_ident(field);
        let lit = |t: &DateTime<Utc>| format!("'{}'", format.format(t));
        match self {
            TimeClause::Window {
                start,
                end,
                inclusive_end,
            } => {
                let op = if *inclusive_end { "<=" } else { "<" };
                format!("{f} >= {} AND {f} {op} {}", lit(start), lit(end))
            }
            TimeClause::Outside { start, end, within } => {
                let mut s = format!("({f} < {} OR {f} >= {})", lit(start), lit(end));
                if let Some(r) = within {
                    s.push_str(&format!(
                        " AND {f} >= {} AND {f} <= {}",
                        lit(&r.start()),
                        lit(&r.end())
                    ));
                }
                s
            }
            TimeClause::Range(r) => {
                format!("{f} >= {} AND {f} <= {}", lit(&r.start()), lit(&r.end()))
            }
        }
    }
}

fn quote_ident(field: &str) -> String {
    format!("`{}`", field.trim_matches('`'))
}

fn quote_value(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Drop a leading `AND` so the condition can be joined like any other term.
fn strip_leading_and(condition: &str) -> &str {
    let t = condition.trim();
    match t.get(..4) {
        Some(head) if head.eq_ignore_ascii_case("and ") => t[4..].trim_start(),
        _ => t,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    fields: String,
    type_field: String,
    type_value: String,
    extra_condition: String,
    time_field: String,
    time_format: TimeLiteralFormat,
}

impl QueryTemplate {
    pub fn new(
        fields: &str,
        type_field: &str,
        type_value: &str,
        extra_condition: &str,
        time_field: &str,
        time_format: TimeLiteralFormat,
    ) -> Self {
        Self {
            fields: fields.to_string(),
            type_field: type_field.to_string(),
            type_value: type_value.to_string(),
            extra_condition: extra_condition.to_string(),
            time_field: time_field.to_string(),
            time_format,
        }
    }

    pub fn time_field(&self) -> &str {
        &self.time_field
    }

    pub fn time_format(&self) -> TimeLiteralFormat {
        self.time_format
    }

    /// `SELECT <fields> FROM `<partition>` [WHERE ...]`.
    pub fn render(&self, partition: &str, time: Option<&TimeClause>) -> String {
        let mut conjuncts = Vec::with_capacity(3);
        if !is_accounts_partition(partition) {
            conjuncts.push(format!(
                "{}={}",
                quote_ident(&self.type_field),
                quote_value(&self.type_value)
            ));
        }
        let extra = strip_leading_and(&self.extra_condition);
        if !extra.is_empty() {
            conjuncts.push(extra.to_string());
        }
        if let Some(clause) = time {
            conjuncts.push(clause.render(&self.time_field, self.time_format));
        }

        let mut query = format!("SELECT {} FROM `{}`", self.fields, partition);
        if !conjuncts.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conjuncts.join(" AND "));
        }
        query
    }
}
