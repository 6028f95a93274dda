//! In-memory tabular datasets shared by every stage of a run.

use std::fmt;

use chrono::NaiveDate;

/// A single cell of a [`Table`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    /// Empty cell, failed lookup, or unparseable derived value.
    #[default]
    Null,
    /// Plain text.
    String(String),
    /// Integer number.
    Int(i64),
    /// Floating point number. Spreadsheet numbers arrive as floats.
    Float(f64),
    /// Boolean literal.
    Boolean(bool),
    /// Calendar date without a time component.
    Date(NaiveDate),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Returns the numeric value of the cell. Text is parsed after trimming;
    /// anything else that is not a number yields `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(value) => Some(*value as f64),
            CellValue::Float(value) if value.is_finite() => Some(*value),
            CellValue::String(value) => value.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Null)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::String(value) => f.write_str(value),
            CellValue::Int(value) => write!(f, "{value}"),
            CellValue::Float(value) => write!(f, "{value}"),
            CellValue::Boolean(value) => write!(f, "{value}"),
            CellValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
        }
    }
}

/// Ordered columns plus ordered rows. Every row holds exactly one value per
/// column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Table {
    /// Creates an empty table with the given column labels.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Creates a table from raw rows, padding or truncating each row to the
    /// column count.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == label)
    }

    pub fn has_column(&self, label: &str) -> bool {
        self.column_index(label).is_some()
    }

    /// Replaces every column label with the output of `rename`.
    pub fn rename_columns(&mut self, mut rename: impl FnMut(usize, &str) -> String) {
        for (index, column) in self.columns.iter_mut().enumerate() {
            *column = rename(index, column);
        }
    }

    /// Appends a row, padding missing trailing cells with nulls.
    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        row.resize(self.columns.len(), CellValue::Null);
        self.rows.push(row);
    }

    /// Appends a column. Missing values are padded with nulls.
    pub fn push_column(&mut self, label: impl Into<String>, values: Vec<CellValue>) {
        self.columns.push(label.into());
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.push(values.next().unwrap_or_default());
        }
    }

    /// Returns the cell of `row` under `label`, if both exist.
    pub fn cell(&self, row: usize, label: &str) -> Option<&CellValue> {
        let index = self.column_index(label)?;
        self.rows.get(row).and_then(|cells| cells.get(index))
    }

    /// Iterates the values of one column. Yields nothing when the column is
    /// absent.
    pub fn column_values<'a>(&'a self, label: &str) -> impl Iterator<Item = &'a CellValue> + use<'a> {
        let index = self.column_index(label);
        self.rows
            .iter()
            .filter_map(move |row| index.and_then(|index| row.get(index)))
    }

    /// Keeps only the rows at `indices`, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        let rows = indices
            .iter()
            .filter_map(|index| self.rows.get(*index).cloned())
            .collect();
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Keeps the listed columns in the listed order, skipping labels the table
    /// does not have.
    pub fn project(&self, labels: &[&str]) -> Table {
        let indices: Vec<usize> = labels
            .iter()
            .filter_map(|label| self.column_index(label))
            .collect();
        let columns = indices
            .iter()
            .map(|index| self.columns[*index].clone())
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|index| row[*index].clone()).collect())
            .collect();
        Table { columns, rows }
    }
}
