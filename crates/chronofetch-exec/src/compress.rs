//! Column downcasting for in-memory results.
//!
//! - Integers go to the narrowest signed width that holds every value.
//! - `Float64` goes to `Float32` when every value survives within
//!   `ATOL + RTOL * |narrowed|` (NaN matches NaN).
//! - Text with fewer than half distinct values becomes a dictionary.
//!
//! A column that does not qualify is left as it is.

use std::collections::{HashMap, HashSet};

use chronofetch_core::schema::DataType;
use chronofetch_core::table::{ColumnData, Table};
use chronofetch_io::RunLog;

pub const RTOL: f64 = 1e-3;
pub const ATOL: f64 = 1e-3;
pub const DICTIONARY_RATIO: f64 = 0.5;

/// Compressed form of `data`, or `None` when nothing narrower fits.
pub fn compress_column(data: &ColumnData) -> Option<ColumnData> {
    if data.is_empty() {
        return None;
    }
    match data {
        ColumnData::Int16(v) => narrow_ints(v, DataType::Int16),
        ColumnData::Int32(v) => narrow_ints(v, DataType::Int32),
        ColumnData::Int64(v) => narrow_ints(v, DataType::Int64),
        ColumnData::Float64(v) => narrow_floats(v),
        ColumnData::Utf8(v) => dictionary_encode(v),
        _ => None,
    }
}

/// Compress every column of `table` in place. Returns how many changed.
pub fn compress_table(table: &mut Table, log: &RunLog) -> usize {
    let candidates: Vec<(String, ColumnData)> = table
        .columns()
        .iter()
        .filter_map(|c| compress_column(&c.data).map(|d| (c.name.clone(), d)))
        .collect();

    let mut changed = 0;
    for (name, data) in candidates {
        let to = data.data_type();
        match table.replace_column(&name, data) {
            Ok(()) => {
                changed += 1;
                log.debug(format!("Column '{name}' compressed to {to:?}"));
            }
            Err(e) => log.warn(format!("Column '{name}' left uncompressed: {e}")),
        }
    }
    changed
}

fn narrow_ints<T: Copy + Into<i64>>(values: &[Option<T>], current: DataType) -> Option<ColumnData> {
    let (min, max) = values
        .iter()
        .flatten()
        .map(|v| (*v).into())
        .fold((0i64, 0i64), |(lo, hi), v| (lo.min(v), hi.max(v)));

    let fits = |lo: i64, hi: i64| min >= lo && max <= hi;
    let target = if fits(i8::MIN.into(), i8::MAX.into()) {
        DataType::Int8
    } else if fits(i16::MIN.into(), i16::MAX.into()) {
        DataType::Int16
    } else if fits(i32::MIN.into(), i32::MAX.into()) {
        DataType::Int32
    } else {
        DataType::Int64
    };
    if target.width_bytes() >= current.width_bytes() {
        return None;
    }

    let wide = values.iter().map(|v| v.map(Into::<i64>::into));
    Some(match target {
        DataType::Int8 => ColumnData::Int8(wide.map(|v| v.and_then(|x| i8::try_from(x).ok())).collect()),
        DataType::Int16 => {
            ColumnData::Int16(wide.map(|v| v.and_then(|x| i16::try_from(x).ok())).collect())
        }
        _ => ColumnData::Int32(wide.map(|v| v.and_then(|x| i32::try_from(x).ok())).collect()),
    })
}

fn close(original: f64, narrowed: f64) -> bool {
    if original.is_nan() || narrowed.is_nan() {
        return original.is_nan() && narrowed.is_nan();
    }
    if original.is_infinite() || narrowed.is_infinite() {
        return original == narrowed;
    }
    (original - narrowed).abs() <= ATOL + RTOL * narrowed.abs()
}

fn narrow_floats(values: &[Option<f64>]) -> Option<ColumnData> {
    let narrowed: Vec<Option<f32>> = values.iter().map(|v| v.map(|x| x as f32)).collect();
    let lossless = values.iter().zip(&narrowed).all(|(a, b)| match (a, b) {
        (Some(a), Some(b)) => close(*a, f64::from(*b)),
        _ => true,
    });
    lossless.then_some(ColumnData::Float32(narrowed))
}

fn dictionary_encode(values: &[Option<String>]) -> Option<ColumnData> {
    let distinct: HashSet<Option<&str>> = values.iter().map(|v| v.as_deref()).collect();
    if distinct.len() as f64 / values.len() as f64 >= DICTIONARY_RATIO {
        return None;
    }

    let mut lookup: HashMap<&str, u32> = HashMap::new();
    let mut dict: Vec<String> = Vec::new();
    let mut keys = Vec::with_capacity(values.len());
    for v in values {
        let key = match v.as_deref() {
            None => None,
            Some(s) => match lookup.get(s) {
                Some(k) => Some(*k),
                None => {
                    let k = u32::try_from(dict.len()).ok()?;
                    lookup.insert(s, k);
                    dict.push(s.to_string());
                    Some(k)
                }
            },
        };
        keys.push(key);
    }
    Some(ColumnData::Dictionary { keys, values: dict })
}
