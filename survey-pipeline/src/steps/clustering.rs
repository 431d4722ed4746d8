//! performance-4: cluster subject tables across grade files.

use std::sync::Arc;

use crate::Result;
use crate::domain::step::{BucketKey, StepId};
use crate::domain::table::{Cell, Table, round_cell};
use crate::logging::correlator;
use crate::pipeline::step::{StepContext, StepFunction};
use crate::state::store::TableRef;
use crate::steps::{FORMATTED_SUFFIX, PERFORMANCE_COL, primary_input};

pub(crate) const MASTER_SOURCE: &str = "master";
pub(crate) const PERF_SUMMARY_TABLE: &str = "Perf_summary";
const ALL_GRADES_TABLE: &str = "ALL_GRADES";
const SOURCE_FILE_COL: &str = "Source Grade File";

pub struct Clustering;

impl StepFunction for Clustering {
    fn id(&self) -> StepId {
        StepId::Performance(4)
    }

    fn dependencies(&self) -> &'static [BucketKey] {
        &[BucketKey::Step(StepId::Performance(3))]
    }

    fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let Some(input) = primary_input(ctx, StepId::Performance(3).into())? else {
            return Ok(());
        };
        let out = ctx.output();
        out.extend_from(&input);

        // subject -> [(grade file, table)], in first-seen order
        let mut subjects: Vec<(String, Vec<(String, TableRef)>)> = Vec::new();
        for (source, name, table) in input.iter_tables() {
            let clean = name.trim().to_lowercase();
            let Some(subject) = clean.strip_suffix(FORMATTED_SUFFIX) else {
                continue;
            };
            if table.is_empty() {
                continue;
            }
            let entry = match subjects.iter().position(|(s, _)| s == subject) {
                Some(i) => &mut subjects[i].1,
                None => {
                    subjects.push((subject.to_string(), Vec::new()));
                    let last = subjects.len() - 1;
                    &mut subjects[last].1
                }
            };
            entry.push((source.to_string(), Arc::clone(table)));
        }

        if subjects.is_empty() {
            correlator::warn("No formatted subject tables to cluster");
            return Ok(());
        }

        let mut summary = Table::with_columns(&["Subject", "Avg Performance"]);
        for (subject, items) in &subjects {
            let mut tagged = Vec::with_capacity(items.len());
            for (grade_file, table) in items {
                out.insert(subject, grade_file, Arc::clone(table));
                let mut part = table.as_ref().clone();
                part.push_column(SOURCE_FILE_COL, vec![Cell::text(grade_file.as_str()); part.len()]);
                tagged.push(part);
            }

            let combined = Arc::new(Table::concat(&tagged));
            out.insert(subject, ALL_GRADES_TABLE, Arc::clone(&combined));
            out.insert(MASTER_SOURCE, &format!("all_grades_{}", subject), Arc::clone(&combined));

            if let Some(avg) = average_performance(&combined) {
                summary.push_row(vec![Cell::text(subject.as_str()), avg]);
            }
            correlator::info(format!(
                "Clustered {} across {} grade file(s) ({} rows)",
                subject,
                items.len(),
                combined.len()
            ));
        }

        if !summary.is_empty() {
            out.insert(MASTER_SOURCE, PERF_SUMMARY_TABLE, summary);
        }
        Ok(())
    }
}

/// Rounded mean of the numeric `Performance (%)` values, or `None` without that column.
fn average_performance(table: &Table) -> Option<Cell> {
    let col = table.column_index(PERFORMANCE_COL)?;
    let values: Vec<f64> = table.column_values(col).filter_map(Cell::as_f64).collect();
    if values.is_empty() {
        return Some(Cell::Number(0.0));
    }
    Some(round_cell(values.iter().sum::<f64>() / values.len() as f64))
}
