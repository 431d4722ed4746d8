//! Bounded, in-memory previews of each step's output.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::domain::step::StepId;
use crate::domain::table::{Cell, Table};
use crate::state::store::Bucket;

/// Maximum number of tables kept per step preview.
pub const MAX_PREVIEW_TABLES: usize = 5;
/// Maximum number of rows kept per table.
pub const MAX_PREVIEW_ROWS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePreview {
    pub source: String,
    pub table: String,
    pub columns: Vec<String>,
    /// Rows as column -> value records; non-finite numbers render as null.
    pub rows: Vec<Map<String, Value>>,
    pub total_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPreview {
    pub step: StepId,
    pub tables: Vec<TablePreview>,
    pub total_tables: usize,
    pub generated_at: DateTime<Utc>,
}

fn cell_to_json(cell: &Cell) -> Value {
    match cell {
        Cell::Empty => Value::Null,
        Cell::Bool(b) => Value::Bool(*b),
        Cell::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 => {
            Value::Number(Number::from(*n as i64))
        }
        Cell::Number(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
        Cell::Text(s) => Value::String(s.clone()),
    }
}

fn preview_table(source: &str, name: &str, table: &Table) -> TablePreview {
    let rows = table
        .rows()
        .iter()
        .take(MAX_PREVIEW_ROWS)
        .map(|row| {
            table
                .columns()
                .iter()
                .zip(row)
                .map(|(col, cell)| (col.clone(), cell_to_json(cell)))
                .collect()
        })
        .collect();
    TablePreview {
        source: source.to_string(),
        table: name.to_string(),
        columns: table.columns().to_vec(),
        rows,
        total_rows: table.len(),
    }
}

/// Render the first few tables of a bucket.
pub fn build_preview(step: StepId, bucket: &Bucket) -> StepPreview {
    let tables = bucket
        .iter_tables()
        .take(MAX_PREVIEW_TABLES)
        .map(|(source, name, table)| preview_table(source, name, table))
        .collect();
    StepPreview {
        step,
        tables,
        total_tables: bucket.table_count(),
        generated_at: Utc::now(),
    }
}

/// Latest preview per step. Cleared together with the state store.
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    entries: RwLock<HashMap<StepId, StepPreview>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, step: StepId, bucket: &Bucket) {
        let preview = build_preview(step, bucket);
        self.entries.write().insert(step, preview);
    }

    pub fn get(&self, step: StepId) -> Option<StepPreview> {
        self.entries.read().get(&step).cloned()
    }

    pub fn remove(&self, step: StepId) {
        self.entries.write().remove(&step);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_is_bounded() {
        let mut bucket = Bucket::new();
        for i in 0..7 {
            let mut t = Table::with_columns(&["n"]);
            for r in 0..150 {
                t.push_row(vec![(r as i64).into()]);
            }
            bucket.insert("src", &format!("t{}", i), t);
        }

        let preview = build_preview(StepId::Performance(1), &bucket);
        assert_eq!(preview.tables.len(), MAX_PREVIEW_TABLES);
        assert_eq!(preview.total_tables, 7);
        assert_eq!(preview.tables[0].rows.len(), MAX_PREVIEW_ROWS);
        assert_eq!(preview.tables[0].total_rows, 150);
    }

    #[test]
    fn test_non_finite_numbers_render_null() {
        let t = Table::from_rows(
            vec!["a".into(), "b".into(), "c".into()],
            vec![vec![f64::NAN.into(), 3.0.into(), 2.5.into()]],
        );
        let p = preview_table("s", "t", &t);
        let row = &p.rows[0];
        assert_eq!(row["a"], Value::Null);
        assert_eq!(row["b"], serde_json::json!(3));
        assert_eq!(row["c"], serde_json::json!(2.5));
    }

    #[test]
    fn test_registry_overwrites_and_clears() {
        let registry = PreviewRegistry::new();
        let step = StepId::Performance(2);
        let mut bucket = Bucket::new();
        bucket.insert("s", "a", Table::with_columns(&["x"]));
        registry.register(step, &bucket);
        bucket.insert("s", "b", Table::with_columns(&["x"]));
        registry.register(step, &bucket);

        assert_eq!(registry.get(step).unwrap().tables.len(), 2);
        registry.clear();
        assert!(registry.get(step).is_none());
    }
}
