//! performance-1: per-student totals and per-subject averages.

use crate::Result;
use crate::domain::step::{BucketKey, StepId};
use crate::domain::table::{Cell, Table, round_cell};
use crate::logging::correlator;
use crate::pipeline::step::{StepContext, StepFunction};
use crate::steps::{FORMATTED_SUFFIX, PERFORMANCE_COL, primary_input};

const TOTAL_CREDIT_COL: &str = "Total Credit";
const SUMMARY_TABLE: &str = "Sub_wise_avg_perf";

pub struct Percentage;

impl StepFunction for Percentage {
    fn id(&self) -> StepId {
        StepId::Performance(1)
    }

    fn dependencies(&self) -> &'static [BucketKey] {
        &[BucketKey::Step(StepId::Performance(0))]
    }

    fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let Some(input) = primary_input(ctx, StepId::Performance(0).into())? else {
            return Ok(());
        };
        let out = ctx.output();
        out.extend_from(&input);

        for source in input.sources() {
            let mut summary = Table::with_columns(&["Sheet", "Average Performance (%)"]);
            for (name, table) in source.tables() {
                let Some(base) = name.strip_suffix(FORMATTED_SUFFIX) else {
                    continue;
                };
                let Some(scored) = add_performance(table) else {
                    continue;
                };
                let average = average_performance(&scored);
                summary.push_row(vec![Cell::text(base), average]);
                out.insert(source.name(), name, scored);
            }

            if !summary.is_empty() {
                correlator::info(format!(
                    "{}: scored {} subject sheet(s)",
                    source.name(),
                    summary.len()
                ));
                out.insert(source.name(), SUMMARY_TABLE, summary);
            }
        }
        Ok(())
    }
}

/// Append `Total Credit` and `Performance (%)`. `None` when there are no credit columns.
fn add_performance(table: &Table) -> Option<Table> {
    let credit_cols: Vec<usize> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| c.ends_with("_credit"))
        .map(|(i, _)| i)
        .collect();
    if credit_cols.is_empty() {
        return None;
    }

    let denom = credit_cols.len() as f64;
    let totals: Vec<f64> = table
        .rows()
        .iter()
        .map(|row| {
            credit_cols
                .iter()
                .map(|&c| row[c].as_f64().unwrap_or(0.0))
                .sum()
        })
        .collect();

    let mut scored = table.clone();
    scored.push_column(
        TOTAL_CREDIT_COL,
        totals.iter().map(|t| Cell::Number(*t)).collect(),
    );
    scored.push_column(
        PERFORMANCE_COL,
        totals.iter().map(|t| round_cell(t / denom * 100.0)).collect(),
    );
    Some(scored)
}

fn average_performance(scored: &Table) -> Cell {
    let Some(col) = scored.column_index(PERFORMANCE_COL) else {
        return Cell::Number(0.0);
    };
    let values: Vec<f64> = scored.column_values(col).filter_map(Cell::as_f64).collect();
    if values.is_empty() {
        return Cell::Number(0.0);
    }
    round_cell(values.iter().sum::<f64>() / values.len() as f64)
}
