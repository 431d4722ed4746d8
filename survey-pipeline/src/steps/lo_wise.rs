//! performance-2: learning-outcome performance per subject.

use std::cmp::Ordering;

use crate::Result;
use crate::domain::step::{BucketKey, StepId};
use crate::domain::table::cmp_cells;
use crate::logging::correlator;
use crate::pipeline::step::{StepContext, StepFunction};
use crate::steps::{AVG_PERFORMANCE_COL, LONG_SUFFIX, aggregate_questions, primary_input};

pub struct LoWise;

impl StepFunction for LoWise {
    fn id(&self) -> StepId {
        StepId::Performance(2)
    }

    fn dependencies(&self) -> &'static [BucketKey] {
        &[BucketKey::Step(StepId::Performance(1))]
    }

    fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let Some(input) = primary_input(ctx, StepId::Performance(1).into())? else {
            return Ok(());
        };
        let out = ctx.output();
        out.extend_from(&input);

        for (source, name, table) in input.iter_tables() {
            let Some(base) = name.strip_suffix(LONG_SUFFIX) else {
                continue;
            };
            if table.is_empty() {
                continue;
            }

            let mut lo = aggregate_questions(table, "LO", name)?;
            let perf = lo.column_index(AVG_PERFORMANCE_COL).unwrap_or(2);
            // Highest performance first, ties by LO.
            lo.sort_rows_by(|a, b| match cmp_cells(&b[perf], &a[perf]) {
                Ordering::Equal => cmp_cells(&a[0], &b[0]),
                other => other,
            });

            let out_name = format!("{}_lo", base);
            correlator::info(format!("{}: wrote {} ({} LOs)", source, out_name, lo.len()));
            out.insert(source, &out_name, lo);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::table::Cell;
    use crate::state::store::Bucket;
    use crate::steps::test_support::{run, table};

    #[test]
    fn test_sorted_by_performance_then_lo() {
        let mut bucket = Bucket::new();
        bucket.insert(
            "Grade 5",
            "English_formatted_long",
            table(
                &["LO", "Difficulty", "Credit", "Question"],
                vec![
                    vec!["B".into(), 1i64.into(), 1i64.into(), "Q1".into()],
                    vec!["A".into(), 1i64.into(), 1i64.into(), "Q2".into()],
                    vec!["C".into(), 2i64.into(), 0i64.into(), "Q3".into()],
                    vec!["C".into(), 2i64.into(), Cell::Empty, "Q3".into()],
                ],
            ),
        );
        bucket.insert("Grade 5", "Math_formatted_long", table(&["LO"], vec![]));

        let out = run(
            &LoWise,
            vec![(BucketKey::Step(StepId::Performance(1)), bucket)],
        )
        .unwrap();

        let lo = out.get("Grade 5", "English_lo").unwrap();
        let order: Vec<String> = lo.column_values(0).map(|c| c.to_string()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        assert_eq!(lo.cell(2, 1), &Cell::text("Q3"));
        assert_eq!(lo.cell(2, 2), &Cell::Number(0.0));
        // Empty long tables are skipped, everything else carried forward.
        assert!(out.get("Grade 5", "Math_lo").is_none());
        assert!(out.get("Grade 5", "Math_formatted_long").is_some());
    }
}
