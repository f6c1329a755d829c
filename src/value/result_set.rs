//! Result sets returned by query execution.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{Error, Result};

use super::types::{Type, Value};
use super::YdbValue;

/// Column description.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub ty: Type,
}

/// Shared column descriptions, so every row can resolve names without cloning them.
pub type SharedColumns = Arc<Vec<Column>>;

/// A single row. Uses SmallVec to keep typical rows inline.
#[derive(Debug, Clone)]
pub struct Row {
    columns: SharedColumns,
    values: SmallVec<[Value; 8]>,
}

impl Row {
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`, typed by its column.
    pub fn get(&self, index: usize) -> Result<YdbValue> {
        let column = self
            .columns
            .get(index)
            .ok_or_else(|| Error::Argument(format!("Column index {} out of range", index)))?;
        Ok(YdbValue::new_unchecked(column.ty.clone(), self.values[index].clone()))
    }

    pub fn get_by_name(&self, name: &str) -> Result<YdbValue> {
        let index = self
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::Argument(format!("No column named {}", name)))?;
        self.get(index)
    }
}

/// Rows of one result set, with their column descriptions.
#[derive(Debug, Clone)]
pub struct ResultSet {
    columns: SharedColumns,
    rows: Vec<Row>,
    truncated: bool,
}

impl ResultSet {
    /// Build a result set, checking every row against the columns.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>, truncated: bool) -> Result<Self> {
        let columns = Arc::new(columns);
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, values)| {
                if values.len() != columns.len() {
                    return Err(Error::Protocol(format!(
                        "Row {} has {} values, expected {}",
                        i,
                        values.len(),
                        columns.len()
                    )));
                }
                for (column, value) in columns.iter().zip(&values) {
                    column.ty.validate(value).map_err(|e| {
                        Error::Protocol(format!("Row {} column {}: {}", i, column.name, e))
                    })?;
                }
                Ok(Row {
                    columns: Arc::clone(&columns),
                    values: SmallVec::from_vec(values),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            columns,
            rows,
            truncated,
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Whether the server cut the result at its row limit.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Append the rows of a continuation part of the same result set.
    pub(crate) fn append(&mut self, other: ResultSet) {
        self.rows.extend(other.rows);
        self.truncated |= other.truncated;
    }
}
