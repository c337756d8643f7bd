//! Row-per-object measurement tables.
//!
//! A [`MeasurementTable`] is indexed by object label (ascending, unique) and
//! holds typed columns in insertion order. Missing entries (from outer
//! joins) are explicit nulls, and each column keeps its dtype end to end —
//! the archive codec stores columns, not rows, for the same reason.

use serde::{Deserialize, Serialize};

use crate::error::{ColonyError, Result};

/// Name of the label index column in rendered/merged output.
pub const OBJECT_LABEL: &str = "ObjectLabel";

/// One typed column with per-row nullability.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Float(Vec<Option<f64>>),
    Int(Vec<Option<i64>>),
    Bool(Vec<Option<bool>>),
    Str(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::Str(_) => "str",
        }
    }

    fn null_like(&self) -> CellSlot {
        match self {
            Self::Float(_) => CellSlot::Float(None),
            Self::Int(_) => CellSlot::Int(None),
            Self::Bool(_) => CellSlot::Bool(None),
            Self::Str(_) => CellSlot::Str(None),
        }
    }

    fn slot(&self, idx: usize) -> CellSlot {
        match self {
            Self::Float(v) => CellSlot::Float(v[idx]),
            Self::Int(v) => CellSlot::Int(v[idx]),
            Self::Bool(v) => CellSlot::Bool(v[idx]),
            Self::Str(v) => CellSlot::Str(v[idx].clone()),
        }
    }

    fn push_slot(&mut self, slot: CellSlot) {
        match (self, slot) {
            (Self::Float(v), CellSlot::Float(x)) => v.push(x),
            (Self::Int(v), CellSlot::Int(x)) => v.push(x),
            (Self::Bool(v), CellSlot::Bool(x)) => v.push(x),
            (Self::Str(v), CellSlot::Str(x)) => v.push(x),
            _ => unreachable!("slot dtype follows column dtype"),
        }
    }

    fn empty_like(&self) -> Column {
        match self {
            Self::Float(_) => Self::Float(Vec::new()),
            Self::Int(_) => Self::Int(Vec::new()),
            Self::Bool(_) => Self::Bool(Vec::new()),
            Self::Str(_) => Self::Str(Vec::new()),
        }
    }
}

/// One cell, carrying its column dtype.
#[derive(Clone, Debug, PartialEq)]
enum CellSlot {
    Float(Option<f64>),
    Int(Option<i64>),
    Bool(Option<bool>),
    Str(Option<String>),
}

/// How duplicate columns are reconciled during a merge. Identical duplicate
/// columns are always kept once; columns that share a name but disagree get
/// the later occurrence renamed with `suffix`. The suffix rule is a
/// documented policy, not a correctness guarantee.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergePolicy {
    pub suffix: String,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            suffix: "_merged".to_string(),
        }
    }
}

/// Label-indexed table of per-object measurements.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeasurementTable {
    labels: Vec<u32>,
    columns: Vec<(String, Column)>,
}

impl MeasurementTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table indexed by the given labels (sorted and deduplicated).
    pub fn with_labels(mut labels: Vec<u32>) -> Self {
        labels.sort_unstable();
        labels.dedup();
        Self {
            labels,
            columns: Vec::new(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn add_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        self.insert_column(self.columns.len(), name, column)
    }

    /// Insert at an arbitrary position (0 = leftmost; used to prepend
    /// metadata columns).
    pub fn insert_column(
        &mut self,
        position: usize,
        name: impl Into<String>,
        column: Column,
    ) -> Result<()> {
        let name = name.into();
        if column.len() != self.labels.len() {
            return Err(ColonyError::Table(format!(
                "column '{}' has {} rows, table has {}",
                name,
                column.len(),
                self.labels.len()
            )));
        }
        if self.has_column(&name) {
            return Err(ColonyError::Table(format!("duplicate column '{name}'")));
        }
        self.columns.insert(position, (name, column));
        Ok(())
    }

    pub fn add_float_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        self.add_column(name, Column::Float(values.into_iter().map(Some).collect()))
    }

    pub fn add_int_column(&mut self, name: impl Into<String>, values: Vec<i64>) -> Result<()> {
        self.add_column(name, Column::Int(values.into_iter().map(Some).collect()))
    }

    pub fn add_str_column(&mut self, name: impl Into<String>, values: Vec<String>) -> Result<()> {
        self.add_column(name, Column::Str(values.into_iter().map(Some).collect()))
    }

    pub fn add_bool_column(&mut self, name: impl Into<String>, values: Vec<bool>) -> Result<()> {
        self.add_column(name, Column::Bool(values.into_iter().map(Some).collect()))
    }

    pub fn row_of(&self, label: u32) -> Option<usize> {
        self.labels.iter().position(|&l| l == label)
    }

    pub fn float_value(&self, label: u32, column: &str) -> Option<f64> {
        let row = self.row_of(label)?;
        match self.column(column)? {
            Column::Float(v) => v[row],
            _ => None,
        }
    }

    pub fn int_value(&self, label: u32, column: &str) -> Option<i64> {
        let row = self.row_of(label)?;
        match self.column(column)? {
            Column::Int(v) => v[row],
            _ => None,
        }
    }

    pub fn str_value(&self, label: u32, column: &str) -> Option<&str> {
        let row = self.row_of(label)?;
        match self.column(column)? {
            Column::Str(v) => v[row].as_deref(),
            _ => None,
        }
    }

    /// Outer-join another table on the label index.
    ///
    /// Columns present in both tables are kept once when their realigned
    /// values are identical; conflicting duplicates keep the left column
    /// under its name and rename the right one with the policy suffix
    /// (repeated until unique) instead of overwriting silently.
    pub fn merge(&self, other: &MeasurementTable, policy: &MergePolicy) -> MeasurementTable {
        let union = union_labels(&self.labels, &other.labels);

        let mut merged = MeasurementTable {
            labels: union.clone(),
            columns: Vec::new(),
        };
        for (name, col) in &self.columns {
            let realigned = realign(col, &self.labels, &union);
            merged.columns.push((name.clone(), realigned));
        }

        for (name, col) in &other.columns {
            let realigned = realign(col, &other.labels, &union);
            match merged.column(name) {
                Some(existing) if *existing == realigned => {} // identical duplicate
                Some(_) => {
                    let mut renamed = format!("{name}{}", policy.suffix);
                    while merged.has_column(&renamed) {
                        renamed.push_str(&policy.suffix);
                    }
                    merged.columns.push((renamed, realigned));
                }
                None => merged.columns.push((name.clone(), realigned)),
            }
        }

        merged
    }

    /// Rebuild from storage in row order. Labels are taken as-is (archive
    /// tables may be positional after appends), so no re-sorting happens.
    pub(crate) fn from_raw_parts(
        labels: Vec<u32>,
        columns: Vec<(String, Column)>,
    ) -> Result<Self> {
        for (name, col) in &columns {
            if col.len() != labels.len() {
                return Err(ColonyError::Table(format!(
                    "column '{}' has {} rows, table has {}",
                    name,
                    col.len(),
                    labels.len()
                )));
            }
        }
        Ok(Self { labels, columns })
    }

    /// Stack another table's rows under this one (shared schema; used for
    /// batch aggregation). Label collisions are allowed — rows are appended,
    /// not joined — so the result index is positional.
    pub fn concat_rows(&self, other: &MeasurementTable) -> Result<MeasurementTable> {
        if self.columns.is_empty() {
            return Ok(other.clone());
        }
        if other.columns.is_empty() {
            return Ok(self.clone());
        }
        let my_names = self.column_names();
        if my_names != other.column_names() {
            return Err(ColonyError::Table(
                "cannot concatenate tables with different columns".to_string(),
            ));
        }
        let mut out = self.clone();
        out.labels.extend_from_slice(&other.labels);
        for ((_, dst), (_, src)) in out.columns.iter_mut().zip(other.columns.iter()) {
            for idx in 0..src.len() {
                dst.push_slot(src.slot(idx));
            }
        }
        Ok(out)
    }
}

fn union_labels(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut union = Vec::with_capacity(a.len() + b.len());
    union.extend_from_slice(a);
    union.extend_from_slice(b);
    union.sort_unstable();
    union.dedup();
    union
}

fn realign(col: &Column, old_labels: &[u32], union: &[u32]) -> Column {
    let index_of: std::collections::HashMap<u32, usize> = old_labels
        .iter()
        .enumerate()
        .map(|(i, &l)| (l, i))
        .collect();
    let mut out = col.empty_like();
    for &label in union {
        match index_of.get(&label) {
            Some(&idx) => out.push_slot(col.slot(idx)),
            None => out.push_slot(col.null_like()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(labels: Vec<u32>, cols: Vec<(&str, Vec<f64>)>) -> MeasurementTable {
        let mut t = MeasurementTable::with_labels(labels);
        for (name, values) in cols {
            t.add_float_column(name, values).unwrap();
        }
        t
    }

    #[test]
    fn outer_merge_fills_nulls() {
        let a = table(vec![1, 2], vec![("x", vec![1.0, 2.0])]);
        let b = table(vec![2, 3], vec![("y", vec![20.0, 30.0])]);
        let merged = a.merge(&b, &MergePolicy::default());
        assert_eq!(merged.labels(), &[1, 2, 3]);
        assert_eq!(merged.float_value(1, "x"), Some(1.0));
        assert_eq!(merged.float_value(3, "x"), None);
        assert_eq!(merged.float_value(3, "y"), Some(30.0));
    }

    #[test]
    fn identical_duplicate_kept_once_conflict_suffixed() {
        let a = table(vec![1, 2], vec![("x", vec![1.0, 2.0]), ("y", vec![5.0, 6.0])]);
        let same_x = table(vec![1, 2], vec![("x", vec![1.0, 2.0])]);
        let diff_y = table(vec![1, 2], vec![("y", vec![7.0, 8.0])]);

        let merged = a.merge(&same_x, &MergePolicy::default());
        assert_eq!(merged.column_names(), vec!["x", "y"]);

        let merged = a.merge(&diff_y, &MergePolicy::default());
        assert_eq!(merged.column_names(), vec!["x", "y", "y_merged"]);
        assert_eq!(merged.float_value(1, "y"), Some(5.0));
        assert_eq!(merged.float_value(1, "y_merged"), Some(7.0));
    }

    #[test]
    fn zero_row_table_keeps_full_column_set() {
        let empty = table(vec![], vec![("x", vec![]), ("y", vec![])]);
        let other = table(vec![], vec![("z", vec![])]);
        let merged = empty.merge(&other, &MergePolicy::default());
        assert_eq!(merged.n_rows(), 0);
        assert_eq!(merged.column_names(), vec!["x", "y", "z"]);
    }
}
