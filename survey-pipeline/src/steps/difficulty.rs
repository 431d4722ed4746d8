//! performance-3: performance per difficulty level.

use crate::Result;
use crate::domain::step::{BucketKey, StepId};
use crate::logging::correlator;
use crate::pipeline::step::{StepContext, StepFunction};
use crate::steps::{LONG_SUFFIX, aggregate_questions, primary_input};

pub struct DifficultyWise;

impl StepFunction for DifficultyWise {
    fn id(&self) -> StepId {
        StepId::Performance(3)
    }

    fn dependencies(&self) -> &'static [BucketKey] {
        &[BucketKey::Step(StepId::Performance(2))]
    }

    fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let Some(input) = primary_input(ctx, StepId::Performance(2).into())? else {
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

            let levels = aggregate_questions(table, "Difficulty", name)?;
            let out_name = format!("{}_qlvl", base);
            correlator::info(format!(
                "{}: wrote {} ({} levels)",
                source,
                out_name,
                levels.len()
            ));
            out.insert(source, &out_name, levels);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::domain::table::Cell;
    use crate::state::store::Bucket;
    use crate::steps::test_support::{run, table};

    fn input(long: crate::domain::table::Table) -> Vec<(BucketKey, Bucket)> {
        let mut bucket = Bucket::new();
        bucket.insert("Grade 7", "Science_formatted_long", long);
        bucket.insert("Grade 7", "Science_lo", table(&["LO"], vec![]));
        vec![(BucketKey::Step(StepId::Performance(2)), bucket)]
    }

    #[test]
    fn test_levels_ascending_numbers_before_text() {
        let long = table(
            &["LO", "Difficulty", "Credit", "Question"],
            vec![
                vec!["L1".into(), "hard".into(), 0i64.into(), "Q3".into()],
                vec!["L1".into(), 2i64.into(), 1i64.into(), "Q2".into()],
                vec!["L2".into(), 1i64.into(), 1i64.into(), "Q1".into()],
                vec!["L2".into(), 1i64.into(), 0i64.into(), "Q4".into()],
            ],
        );
        let out = run(&DifficultyWise, input(long)).unwrap();

        let levels = out.get("Grade 7", "Science_qlvl").unwrap();
        assert_eq!(levels.columns(), &["Difficulty", "Questions", "Avg Performance (%)"]);
        assert_eq!(levels.cell(0, 0), &Cell::Number(1.0));
        assert_eq!(levels.cell(0, 1), &Cell::text("Q1,Q4"));
        assert_eq!(levels.cell(0, 2), &Cell::Number(50.0));
        assert_eq!(levels.cell(2, 0), &Cell::text("hard"));
        assert!(out.get("Grade 7", "Science_lo").is_some());
    }

    #[test]
    fn test_missing_difficulty_column_fails() {
        let long = table(
            &["LO", "Credit", "Question"],
            vec![vec!["L1".into(), 1i64.into(), "Q1".into()]],
        );
        let err = run(&DifficultyWise, input(long)).unwrap_err();
        assert!(matches!(err, Error::Step(_)));
    }
}
