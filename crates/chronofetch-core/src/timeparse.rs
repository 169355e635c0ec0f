//! Lenient timestamp parsing for sort columns.
//!
//! Backends return time values in several literal forms; all of them are
//! normalized to `DateTime<Utc>` before sorting.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::error::{Error, Result};
use crate::table::ColumnData;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse one time literal. Empty strings are nulls, not errors.
pub fn parse_instant(text: &str) -> Result<Option<DateTime<Utc>>> {
    let s = text.trim();
    if s.is_empty() {
        return Ok(None);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Some(naive.and_utc()));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Some(naive.and_utc()));
        }
    }
    if let Ok(ms) = s.parse::<i64>() {
        return from_epoch_millis(ms).map(Some);
    }
    Err(Error::TimeParse(format!("cannot parse '{s}' as a timestamp")))
}

fn from_epoch_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::TimeParse(format!("epoch milliseconds {ms} out of range")))
}

fn ints_to_instants<T: Copy + Into<i64>>(values: &[Option<T>]) -> Result<Vec<Option<DateTime<Utc>>>> {
    values
        .iter()
        .map(|v| v.map(|x| from_epoch_millis(x.into())).transpose())
        .collect()
}

/// Convert a column to timestamps. Integers are epoch milliseconds.
pub fn to_timestamps(data: &ColumnData) -> Result<Vec<Option<DateTime<Utc>>>> {
    match data {
        ColumnData::Timestamp(v) => Ok(v.clone()),
        ColumnData::Utf8(v) => v
            .iter()
            .map(|s| match s {
                Some(s) => parse_instant(s),
                None => Ok(None),
            })
            .collect(),
        ColumnData::Dictionary { keys, values } => {
            let parsed: Vec<Option<DateTime<Utc>>> = values
                .iter()
                .map(|s| parse_instant(s))
                .collect::<Result<_>>()?;
            Ok(keys
                .iter()
                .map(|k| k.and_then(|k| parsed.get(k as usize).copied().flatten()))
                .collect())
        }
        ColumnData::Int8(v) => ints_to_instants(v),
        ColumnData::Int16(v) => ints_to_instants(v),
        ColumnData::Int32(v) => ints_to_instants(v),
        ColumnData::Int64(v) => ints_to_instants(v),
        other => Err(Error::TimeParse(format!(
            "{:?} column cannot hold timestamps",
            other.data_type()
        ))),
    }
}

/// Canonical text form used in CSV output: RFC 3339, milliseconds, `Z`.
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}
