//! In-memory tabular data exchanged between pipeline steps.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single spreadsheet cell value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Numeric view of the cell. Text is parsed leniently; anything else is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// True for empty cells and NaN.
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    /// Trimmed, lowercased text used for case-insensitive matching.
    pub fn normalized(&self) -> String {
        self.to_string().trim().to_lowercase()
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Ordering used when grouping and sorting keys: numbers, then booleans,
/// then text, with missing values last.
pub fn cmp_cells(a: &Cell, b: &Cell) -> Ordering {
    fn rank(c: &Cell) -> u8 {
        match c {
            Cell::Number(n) if !n.is_nan() => 0,
            Cell::Bool(_) => 1,
            Cell::Text(_) => 2,
            _ => 3,
        }
    }
    match (a, b) {
        (Cell::Number(x), Cell::Number(y)) if !x.is_nan() && !y.is_nan() => x.total_cmp(y),
        (Cell::Bool(x), Cell::Bool(y)) => x.cmp(y),
        (Cell::Text(x), Cell::Text(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Round half to even, then return as a whole-number cell.
pub fn round_cell(value: f64) -> Cell {
    if value.is_finite() {
        Cell::Number(value.round_ties_even())
    } else {
        Cell::Number(0.0)
    }
}

pub type Row = Vec<Cell>;

/// A rectangular table with named columns.
///
/// Rows are always exactly as wide as the column list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table, padding or truncating rows to the column count.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn with_columns(columns: &[&str]) -> Self {
        Self::new(columns.iter().map(|c| c.to_string()).collect())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn push_row(&mut self, mut row: Row) {
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Case-insensitive, whitespace-trimmed column lookup.
    pub fn column_index_ci(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_lowercase();
        self.columns
            .iter()
            .position(|c| c.trim().to_lowercase() == wanted)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        static EMPTY: Cell = Cell::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    /// Iterate a single column by index.
    pub fn column_values(&self, col: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().map(move |r| &r[col])
    }

    /// Project onto the given column indices, in that order.
    pub fn select(&self, indices: &[usize]) -> Table {
        let columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|r| indices.iter().map(|&i| r[i].clone()).collect())
            .collect();
        Table { columns, rows }
    }

    /// Insert a column at `at`; `values` shorter than the table are padded.
    pub fn insert_column(&mut self, at: usize, name: impl Into<String>, values: Vec<Cell>) {
        let at = at.min(self.columns.len());
        self.columns.insert(at, name.into());
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.insert(at, values.next().unwrap_or_default());
        }
    }

    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Cell>) {
        let at = self.columns.len();
        self.insert_column(at, name, values);
    }

    /// Keep rows matching `keep`, preserving order.
    pub fn filter_rows(&self, mut keep: impl FnMut(&[Cell]) -> bool) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Same columns, no rows.
    pub fn empty_like(&self) -> Table {
        Table::new(self.columns.clone())
    }

    /// Sort rows in place with a comparator.
    pub fn sort_rows_by(&mut self, compare: impl FnMut(&Row, &Row) -> Ordering) {
        self.rows.sort_by(compare);
    }

    /// Stack tables vertically over the union of their columns.
    ///
    /// Columns keep first-seen order; cells missing from a part are empty.
    pub fn concat<'a>(parts: impl IntoIterator<Item = &'a Table>) -> Table {
        let parts: Vec<&Table> = parts.into_iter().collect();
        let mut columns: Vec<String> = Vec::new();
        for part in &parts {
            for c in &part.columns {
                if !columns.contains(c) {
                    columns.push(c.clone());
                }
            }
        }
        let mut out = Table::new(columns);
        for part in parts {
            let mapping: Vec<Option<usize>> =
                out.columns.iter().map(|c| part.column_index(c)).collect();
            for row in &part.rows {
                let cells = mapping
                    .iter()
                    .map(|m| m.map(|i| row[i].clone()).unwrap_or_default())
                    .collect();
                out.rows.push(cells);
            }
        }
        out
    }
}
