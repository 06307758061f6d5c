//! Row-oriented observation records.
//!
//! A [`DataTable`] is the boundary type consumed by conditional-table
//! estimation: one named column per variable, one row per observation, with
//! discrete cell values drawn from each variable's domain. Parsing records
//! out of files is a collaborator's responsibility; this type only offers
//! row iteration and named-column lookup.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::engine::errors::InferenceError;
use crate::engine::table::Value;

#[derive(Debug, Clone, Default)]
pub struct DataTable {
    columns: Vec<Arc<str>>,
    index: FxHashMap<Arc<str>, usize>,
    rows: Vec<Vec<Value>>,
}

impl DataTable {
    /// Creates an empty table with the given column names.
    pub fn new(columns: &[&str]) -> Result<Self, InferenceError> {
        let mut index = FxHashMap::default();
        let mut names = Vec::with_capacity(columns.len());
        for (pos, column) in columns.iter().enumerate() {
            let name: Arc<str> = Arc::from(*column);
            if index.insert(name.clone(), pos).is_some() {
                return Err(InferenceError::DuplicateName(column.to_string()));
            }
            names.push(name);
        }
        Ok(Self {
            columns: names,
            index,
            rows: Vec::new(),
        })
    }

    /// Appends one observation; the row must carry one value per column.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), InferenceError> {
        if row.len() != self.columns.len() {
            return Err(InferenceError::ShapeMismatch(format!(
                "row has {} values, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Index of a named column.
    pub fn column(&self, name: &str) -> Result<usize, InferenceError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| InferenceError::VariableNotFound(name.to_string()))
    }

    pub fn columns(&self) -> &[Arc<str>] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
