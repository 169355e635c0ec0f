//! Columnar table model shared by the backend, the cache, and the aggregator.
//!
//! Every column is a nullable vector. Columns of one `Table` always have the
//! same length; constructors and mutators enforce it.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{DataType, Field, Schema};
use crate::timeparse::{format_timestamp, to_timestamps};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values")]
pub enum ColumnData {
    Bool(Vec<Option<bool>>),
    Int8(Vec<Option<i8>>),
    Int16(Vec<Option<i16>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    Float32(Vec<Option<f32>>),
    Float64(Vec<Option<f64>>),
    Utf8(Vec<Option<String>>),
    Timestamp(Vec<Option<DateTime<Utc>>>),
    Dictionary {
        keys: Vec<Option<u32>>,
        values: Vec<String>,
    },
}

/// Apply `$plain` to the value vector of any non-dictionary variant and
/// `$dict` to the dictionary variant.
macro_rules! for_each_variant {
    ($data:expr, $v:ident => $plain:expr, { $keys:ident, $values:ident } => $dict:expr) => {
        match $data {
            ColumnData::Bool($v) => $plain,
            ColumnData::Int8($v) => $plain,
            ColumnData::Int16($v) => $plain,
            ColumnData::Int32($v) => $plain,
            ColumnData::Int64($v) => $plain,
            ColumnData::Float32($v) => $plain,
            ColumnData::Float64($v) => $plain,
            ColumnData::Utf8($v) => $plain,
            ColumnData::Timestamp($v) => $plain,
            ColumnData::Dictionary {
                keys: $keys,
                values: $values,
            } => $dict,
        }
    };
}

macro_rules! impl_from_values {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<Option<$t>>> for ColumnData {
                fn from(values: Vec<Option<$t>>) -> Self {
                    ColumnData::$variant(values)
                }
            }
        )*
    };
}

impl_from_values!(
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => Utf8,
    DateTime<Utc> => Timestamp,
);

/// Text rendering of a single non-null cell.
trait CellText {
    fn cell_text(&self) -> String;
}

macro_rules! impl_cell_text {
    ($($t:ty),*) => {
        $(
            impl CellText for $t {
                fn cell_text(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

impl_cell_text!(bool, i8, i16, i32, i64, f32, f64, String);

impl CellText for DateTime<Utc> {
    fn cell_text(&self) -> String {
        format_timestamp(self)
    }
}

fn take_values<T: Clone>(values: &[Option<T>], indices: &[usize]) -> Vec<Option<T>> {
    indices
        .iter()
        .map(|&i| values.get(i).cloned().flatten())
        .collect()
}

impl ColumnData {
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnData::Bool(_) => DataType::Boolean,
            ColumnData::Int8(_) => DataType::Int8,
            ColumnData::Int16(_) => DataType::Int16,
            ColumnData::Int32(_) => DataType::Int32,
            ColumnData::Int64(_) => DataType::Int64,
            ColumnData::Float32(_) => DataType::Float32,
            ColumnData::Float64(_) => DataType::Float64,
            ColumnData::Utf8(_) => DataType::Utf8,
            ColumnData::Timestamp(_) => DataType::Timestamp,
            ColumnData::Dictionary { .. } => DataType::Dictionary,
        }
    }

    /// An all-null column of the given type.
    pub fn nulls(data_type: DataType, len: usize) -> Self {
        match data_type {
            DataType::Boolean => ColumnData::Bool(vec![None; len]),
            DataType::Int8 => ColumnData::Int8(vec![None; len]),
            DataType::Int16 => ColumnData::Int16(vec![None; len]),
            DataType::Int32 => ColumnData::Int32(vec![None; len]),
            DataType::Int64 => ColumnData::Int64(vec![None; len]),
            DataType::Float32 => ColumnData::Float32(vec![None; len]),
            DataType::Float64 => ColumnData::Float64(vec![None; len]),
            DataType::Utf8 => ColumnData::Utf8(vec![None; len]),
            DataType::Timestamp => ColumnData::Timestamp(vec![None; len]),
            DataType::Dictionary => ColumnData::Dictionary {
                keys: vec![None; len],
                values: Vec::new(),
            },
        }
    }

    pub fn len(&self) -> usize {
        for_each_variant!(self, v => v.len(), { keys, _values } => keys.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        for_each_variant!(
            self,
            v => v.iter().filter(|x| x.is_none()).count(),
            { keys, _values } => keys.iter().filter(|k| k.is_none()).count()
        )
    }

    /// Text form of row `i`; `None` for nulls and out-of-range rows.
    pub fn value_string(&self, i: usize) -> Option<String> {
        for_each_variant!(
            self,
            v => v.get(i).and_then(|x| x.as_ref()).map(CellText::cell_text),
            { keys, values } => keys
                .get(i)
                .copied()
                .flatten()
                .and_then(|k| values.get(k as usize).cloned())
        )
    }

    pub fn take(&self, indices: &[usize]) -> ColumnData {
        for_each_variant!(
            self,
            v => take_values(v, indices).into(),
            { keys, values } => ColumnData::Dictionary {
                keys: take_values(keys, indices),
                values: values.clone(),
            }
        )
    }

    /// Render every value as text, keeping nulls.
    pub fn to_utf8(&self) -> ColumnData {
        ColumnData::Utf8((0..self.len()).map(|i| self.value_string(i)).collect())
    }

    /// Append `other` to the end of this column.
    ///
    /// Columns of different types degrade to text so no value is lost.
    pub fn append(&mut self, other: ColumnData) -> Result<()> {
        use ColumnData::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a.extend(b),
            (Int8(a), Int8(b)) => a.extend(b),
            (Int16(a), Int16(b)) => a.extend(b),
            (Int32(a), Int32(b)) => a.extend(b),
            (Int64(a), Int64(b)) => a.extend(b),
            (Float32(a), Float32(b)) => a.extend(b),
            (Float64(a), Float64(b)) => a.extend(b),
            (Utf8(a), Utf8(b)) => a.extend(b),
            (Timestamp(a), Timestamp(b)) => a.extend(b),
            (
                Dictionary { keys, values },
                Dictionary {
                    keys: other_keys,
                    values: other_values,
                },
            ) => {
                let mut lookup: HashMap<String, u32> = values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (v.clone(), i as u32))
                    .collect();
                let mut remap = Vec::with_capacity(other_values.len());
                for value in other_values {
                    let key = match lookup.get(&value) {
                        Some(k) => *k,
                        None => {
                            let k = u32::try_from(values.len()).map_err(|_| {
                                Error::Table("dictionary exceeds u32 key space".into())
                            })?;
                            lookup.insert(value.clone(), k);
                            values.push(value);
                            k
                        }
                    };
                    remap.push(key);
                }
                for key in other_keys {
                    let mapped = match key {
                        Some(k) => Some(*remap.get(k as usize).ok_or_else(|| {
                            Error::Table(format!("dictionary key {k} out of range"))
                        })?),
                        None => None,
                    };
                    keys.push(mapped);
                }
            }
            (this, other) => {
                let mut merged = this.to_utf8();
                if let (Utf8(left), Utf8(right)) = (&mut merged, other.to_utf8()) {
                    left.extend(right);
                }
                *this = merged;
            }
        }
        Ok(())
    }

    /// Rough heap + inline footprint in bytes.
    pub fn estimated_size_bytes(&self) -> usize {
        let inline = self.len() * self.data_type().width_bytes();
        let heap = match self {
            ColumnData::Utf8(v) => v.iter().flatten().map(String::len).sum(),
            ColumnData::Dictionary { values, .. } => values.iter().map(String::len).sum(),
            _ => 0,
        };
        inline + heap
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: impl Into<ColumnData>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Build a table, rejecting columns of unequal length or duplicate names.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let rows = first.data.len();
            for col in &columns {
                if col.data.len() != rows {
                    return Err(Error::Table(format!(
                        "column '{}' has {} values but expected {}",
                        col.name,
                        col.data.len(),
                        rows
                    )));
                }
            }
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(Error::Table(format!("duplicate column '{}'", col.name)));
            }
        }
        Ok(Self { columns })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// No rows (a table with columns but zero rows is empty).
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn schema(&self) -> Schema {
        Schema::new(
            self.columns
                .iter()
                .map(|c| Field::new(c.name.clone(), c.data.data_type()))
                .collect(),
        )
    }

    /// Swap the data of an existing column for a same-length replacement.
    pub fn replace_column(&mut self, name: &str, data: ColumnData) -> Result<()> {
        let rows = self.num_rows();
        if data.len() != rows {
            return Err(Error::Table(format!(
                "replacement for '{}' has {} values but table has {} rows",
                name,
                data.len(),
                rows
            )));
        }
        let col = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::Table(format!("unknown column '{name}'")))?;
        col.data = data;
        Ok(())
    }

    /// Text cells of row `i` in column order.
    pub fn row(&self, i: usize) -> Vec<Option<String>> {
        self.columns.iter().map(|c| c.data.value_string(i)).collect()
    }

    pub fn take(&self, indices: &[usize]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.take(indices),
                })
                .collect(),
        }
    }

    /// Append the rows of `other`, aligning columns by name.
    ///
    /// Columns missing on either side are null-filled.
    pub fn append(&mut self, other: Table) -> Result<()> {
        if self.columns.is_empty() {
            *self = other;
            return Ok(());
        }
        let before = self.num_rows();
        let added = other.num_rows();
        let mut incoming = other.columns;

        for col in &mut self.columns {
            match incoming.iter().position(|c| c.name == col.name) {
                Some(pos) => {
                    let c = incoming.remove(pos);
                    col.data.append(c.data)?;
                }
                None => {
                    let fill = ColumnData::nulls(col.data.data_type(), added);
                    col.data.append(fill)?;
                }
            }
        }
        for c in incoming {
            let mut data = ColumnData::nulls(c.data.data_type(), before);
            data.append(c.data)?;
            self.columns.push(Column { name: c.name, data });
        }
        Ok(())
    }

    pub fn concat(tables: impl IntoIterator<Item = Table>) -> Result<Table> {
        let mut out = Table::empty();
        for t in tables {
            out.append(t)?;
        }
        Ok(out)
    }

    pub fn estimated_size_bytes(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.name.len() + c.data.estimated_size_bytes())
            .sum()
    }

    /// Sort rows by a time column, parsing it to timestamps first.
    ///
    /// Uses `preferred` when present, else `fallback`; with neither the order
    /// is left untouched. Sorting is stable and nulls go last in both
    /// directions. Returns the column that was used.
    pub fn sort_by_time(
        &mut self,
        preferred: &str,
        fallback: &str,
        ascending: bool,
    ) -> Result<Option<String>> {
        if self.is_empty() {
            return Ok(None);
        }
        let name = if self.column(preferred).is_some() {
            preferred
        } else if self.column(fallback).is_some() {
            fallback
        } else {
            return Ok(None);
        };
        let name = name.to_string();

        let keys = match self.column(&name) {
            Some(col) => {
                to_timestamps(&col.data).map_err(|e| e.with_context(format!("column '{name}'")))?
            }
            None => return Ok(None),
        };

        let mut order: Vec<usize> = (0..keys.len()).collect();
        order.sort_by(|&a, &b| match (&keys[a], &keys[b]) {
            (Some(x), Some(y)) if ascending => x.cmp(y),
            (Some(x), Some(y)) => y.cmp(x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        self.replace_column(&name, ColumnData::Timestamp(keys))?;
        *self = self.take(&order);
        Ok(Some(name))
    }
}
