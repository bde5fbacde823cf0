use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SdcError;

/// A single cell of survey microdata.
///
/// `Missing` is a first-class category: it groups, sorts (first) and
/// serializes (`null`) like any other value.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Missing,
    Code(i64),
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(code: i64) -> Self {
        Value::Code(code)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Missing)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => write!(f, "NA"),
            Value::Code(c) => write!(f, "{c}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One survey response. `id` is the row position at load time and survives
/// later deletions so dropped records can be reported by identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: usize,
    pub values: Vec<Value>,
}

/// In-memory microdata table with named columns.
///
/// Deserializing checks every record against the column count and never
/// hands out an id that is already taken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    columns: Vec<String>,
    records: Vec<Record>,
    next_id: usize,
}

#[derive(Deserialize)]
struct RawTable {
    columns: Vec<String>,
    records: Vec<Record>,
    #[serde(default)]
    next_id: usize,
}

impl TryFrom<RawTable> for Table {
    type Error = SdcError;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        let expected = raw.columns.len();
        if let Some(bad) = raw.records.iter().find(|r| r.values.len() != expected) {
            return Err(SdcError::RowArity {
                row: bad.id,
                expected,
                found: bad.values.len(),
            });
        }
        let after_last = raw.records.iter().map(|r| r.id + 1).max().unwrap_or(0);
        Ok(Self {
            columns: raw.columns,
            records: raw.records,
            next_id: raw.next_id.max(after_last),
        })
    }
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            records: Vec::new(),
            next_id: 0,
        }
    }

    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, SdcError> {
        let mut table = Table::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Append a record and return its id.
    pub fn push_row(&mut self, values: Vec<Value>) -> Result<usize, SdcError> {
        if values.len() != self.columns.len() {
            return Err(SdcError::RowArity {
                row: self.next_id,
                expected: self.columns.len(),
                found: values.len(),
            });
        }
        let id = self.next_id;
        self.records.push(Record { id, values });
        self.next_id += 1;
        Ok(id)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, SdcError> {
        self.column_index(name)
            .ok_or_else(|| SdcError::MissingColumn(name.to_string()))
    }

    pub fn value(&self, row: usize, col: usize) -> &Value {
        &self.records[row].values[col]
    }

    /// Overwrite one cell; returns whether the stored value changed.
    pub fn set_value(&mut self, row: usize, col: usize, value: Value) -> bool {
        let slot = &mut self.records[row].values[col];
        if *slot == value {
            return false;
        }
        *slot = value;
        true
    }

    pub fn column(&self, col: usize) -> impl Iterator<Item = &Value> + '_ {
        self.records.iter().map(move |r| &r.values[col])
    }

    pub fn value_counts(&self, col: usize) -> BTreeMap<Value, usize> {
        let mut counts = BTreeMap::new();
        for v in self.column(col) {
            *counts.entry(v.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Values of `row` restricted to `cols`, in `cols` order.
    pub fn project(&self, row: usize, cols: &[usize]) -> Vec<Value> {
        let values = &self.records[row].values;
        cols.iter().map(|&c| values[c].clone()).collect()
    }

    /// Delete the records at the given row positions and return their ids.
    pub fn remove_rows(&mut self, rows: &BTreeSet<usize>) -> Vec<usize> {
        if rows.is_empty() {
            return Vec::new();
        }
        let mut removed = Vec::with_capacity(rows.len());
        let mut pos = 0usize;
        self.records.retain(|r| {
            let drop = rows.contains(&pos);
            pos += 1;
            if drop {
                removed.push(r.id);
            }
            !drop
        });
        removed
    }
}
