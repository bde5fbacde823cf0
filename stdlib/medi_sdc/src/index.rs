use std::collections::BTreeMap;

use crate::{SdcError, Table, Value};

pub type ClassKey = Vec<Value>;

/// Records sharing one value tuple over the quasi-identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquivalenceClass<'a> {
    pub key: &'a ClassKey,
    /// Row positions in the table the index was built from, ascending.
    pub members: &'a [usize],
}

impl EquivalenceClass<'_> {
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Derived grouping view of a table over a quasi-identifier set.
///
/// The index never mutates and is never mutated: rebuild it after any change
/// to a quasi-identifier or the table's rows. Classes iterate in key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquivalenceClassIndex {
    columns: Vec<usize>,
    classes: BTreeMap<ClassKey, Vec<usize>>,
    record_sizes: Vec<usize>,
}

impl EquivalenceClassIndex {
    /// Group `table` by the named quasi-identifiers.
    pub fn build<S: AsRef<str>>(table: &Table, quasi_identifiers: &[S]) -> Result<Self, SdcError> {
        let columns = quasi_identifiers
            .iter()
            .map(|q| table.require_column(q.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_columns(table, &columns))
    }

    /// Group `table` by already-resolved column positions.
    pub fn from_columns(table: &Table, columns: &[usize]) -> Self {
        let mut classes: BTreeMap<ClassKey, Vec<usize>> = BTreeMap::new();
        let mut record_keys = Vec::with_capacity(table.len());
        for row in 0..table.len() {
            let key = table.project(row, columns);
            classes.entry(key.clone()).or_default().push(row);
            record_keys.push(key);
        }
        let record_sizes = record_keys
            .iter()
            .map(|k| classes.get(k).map(Vec::len).unwrap_or(0))
            .collect();
        Self {
            columns: columns.to_vec(),
            classes,
            record_sizes,
        }
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn record_count(&self) -> usize {
        self.record_sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> impl Iterator<Item = EquivalenceClass<'_>> + '_ {
        self.classes.iter().map(|(key, members)| EquivalenceClass {
            key,
            members: members.as_slice(),
        })
    }

    pub fn get(&self, key: &[Value]) -> Option<EquivalenceClass<'_>> {
        self.classes
            .get_key_value(key)
            .map(|(key, members)| EquivalenceClass {
                key,
                members: members.as_slice(),
            })
    }

    pub fn size_of(&self, key: &[Value]) -> usize {
        self.classes.get(key).map(Vec::len).unwrap_or(0)
    }

    /// Size of the class that the record at row position `row` belongs to.
    pub fn record_size(&self, row: usize) -> usize {
        self.record_sizes[row]
    }

    pub fn record_sizes(&self) -> &[usize] {
        &self.record_sizes
    }

    /// Classes with fewer than `k` members, in key order.
    pub fn violating(&self, k: usize) -> impl Iterator<Item = EquivalenceClass<'_>> + '_ {
        self.classes().filter(move |c| c.size() < k)
    }

    pub fn min_size(&self) -> Option<usize> {
        self.classes.values().map(Vec::len).min()
    }
}
