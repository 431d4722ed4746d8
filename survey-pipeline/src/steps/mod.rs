//! Built-in step functions.
//!
//! | step            | reads                          | writes                                   |
//! |-----------------|--------------------------------|------------------------------------------|
//! | participation-0 | raw                            | `schl_wise`, `grade_wise`                |
//! | performance-0   | raw                            | `<sheet>_formatted`, `<sheet>_formatted_long` |
//! | performance-1   | performance-0                  | `Total Credit`, `Performance (%)`, `Sub_wise_avg_perf` |
//! | performance-2   | performance-1                  | `<subject>_lo`                           |
//! | performance-3   | performance-2                  | `<subject>_qlvl`                         |
//! | performance-4   | performance-3                  | subject clusters, `master`               |
//! | performance-5   | performance-4, participation-0 | consolidated upload workbook             |

mod clustering;
mod consolidation;
mod difficulty;
mod formatting;
mod lo_wise;
mod participation;
mod percentage;

use std::sync::{Arc, LazyLock};

use regex::Regex;

pub use clustering::Clustering;
pub use consolidation::Consolidation;
pub use difficulty::DifficultyWise;
pub use formatting::Formatting;
pub use lo_wise::LoWise;
pub use participation::ParticipationSummary;
pub use percentage::Percentage;

use crate::domain::step::BucketKey;
use crate::domain::table::{Cell, Table, cmp_cells, round_cell};
use crate::logging::correlator;
use crate::pipeline::step::{StepContext, StepFunction};
use crate::state::store::Bucket;
use crate::{Error, Result};

pub(crate) const FORMATTED_SUFFIX: &str = "_formatted";
pub(crate) const LONG_SUFFIX: &str = "_formatted_long";
pub(crate) const PERFORMANCE_COL: &str = "Performance (%)";
pub(crate) const AVG_PERFORMANCE_COL: &str = "Avg Performance (%)";

static GRADE_SOURCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^grade[_\s-]?\d+$").expect("grade source regex is valid"));

/// Every built-in step, in full-run order.
pub fn builtin_steps() -> Vec<Arc<dyn StepFunction>> {
    vec![
        Arc::new(ParticipationSummary),
        Arc::new(Formatting),
        Arc::new(Percentage),
        Arc::new(LoWise),
        Arc::new(DifficultyWise),
        Arc::new(Clustering),
        Arc::new(Consolidation),
    ]
}

/// Whether a source was loaded from a grade workbook.
pub(crate) fn is_grade_source(name: &str) -> bool {
    GRADE_SOURCE_RE.is_match(name.trim())
}

/// The primary input bucket, or `None` after logging that it is empty.
///
/// Returns an owned copy so the step can write its output while reading.
pub(crate) fn primary_input(ctx: &StepContext, key: BucketKey) -> Result<Option<Bucket>> {
    let bucket = ctx.input(key)?;
    if bucket.is_empty() {
        correlator::warn(format!(
            "No data found in the {} bucket; {} has nothing to process",
            key,
            ctx.step()
        ));
        return Ok(None);
    }
    Ok(Some(bucket.clone()))
}

pub(crate) fn require_column(table: &Table, column: &str, table_name: &str) -> Result<usize> {
    table.column_index(column).ok_or_else(|| {
        Error::step(format!(
            "table '{}' has no '{}' column",
            table_name, column
        ))
    })
}

/// `round(mean * 100)` over the numeric values; no numeric values reads as 0.
pub(crate) fn mean_percentage<'a>(values: impl Iterator<Item = &'a Cell>) -> Cell {
    let (sum, count) = values
        .filter_map(Cell::as_f64)
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        Cell::Number(0.0)
    } else {
        round_cell(sum / count as f64 * 100.0)
    }
}

/// Group a long-format table by `key`, producing
/// `[key, Questions, Avg Performance (%)]` with keys in ascending order.
///
/// Rows with a missing key are dropped. `Questions` lists the distinct
/// question labels of the group, sorted and comma-joined.
pub(crate) fn aggregate_questions(table: &Table, key: &str, table_name: &str) -> Result<Table> {
    let key_col = require_column(table, key, table_name)?;
    let question_col = require_column(table, "Question", table_name)?;
    let credit_col = require_column(table, "Credit", table_name)?;

    let mut groups: Vec<(Cell, Vec<String>, Vec<Cell>)> = Vec::new();
    for row in table.rows() {
        let group_key = &row[key_col];
        if group_key.is_missing() {
            continue;
        }
        let idx = match groups.iter().position(|(k, _, _)| k == group_key) {
            Some(i) => i,
            None => {
                groups.push((group_key.clone(), Vec::new(), Vec::new()));
                groups.len() - 1
            }
        };
        let (_, questions, credits) = &mut groups[idx];
        let question = row[question_col].to_string();
        if !questions.contains(&question) {
            questions.push(question);
        }
        credits.push(row[credit_col].clone());
    }
    groups.sort_by(|a, b| cmp_cells(&a.0, &b.0));

    let mut out = Table::with_columns(&[key, "Questions", AVG_PERFORMANCE_COL]);
    for (group_key, mut questions, credits) in groups {
        questions.sort();
        out.push_row(vec![
            group_key,
            Cell::text(questions.join(",")),
            mean_percentage(credits.iter()),
        ]);
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::PipelineSettings;

    pub fn run(step: &dyn StepFunction, inputs: Vec<(BucketKey, Bucket)>) -> Result<Bucket> {
        run_with(step, inputs, PipelineSettings::default())
    }

    pub fn run_with(
        step: &dyn StepFunction,
        inputs: Vec<(BucketKey, Bucket)>,
        settings: PipelineSettings,
    ) -> Result<Bucket> {
        let mut ctx = StepContext::new(step.id(), inputs, Arc::new(settings));
        step.run(&mut ctx)?;
        Ok(ctx.into_output())
    }

    pub fn table(columns: &[&str], rows: Vec<Vec<Cell>>) -> Table {
        Table::from_rows(columns.iter().map(|c| c.to_string()).collect(), rows)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::table;
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Grade 5", true)]
    #[case("grade_12", true)]
    #[case("GRADE-7", true)]
    #[case("Grade5", true)]
    #[case("REG VS PART", false)]
    #[case("grade five", false)]
    fn test_grade_source(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_grade_source(name), expected);
    }

    #[test]
    fn test_mean_percentage_ignores_non_numeric() {
        let cells = [Cell::Number(1.0), Cell::text("n/a"), Cell::Number(0.0)];
        assert_eq!(mean_percentage(cells.iter()), Cell::Number(50.0));
        assert_eq!(mean_percentage([Cell::Empty].iter()), Cell::Number(0.0));
    }

    #[test]
    fn test_aggregate_questions_groups_and_sorts() {
        let long = table(
            &["LO", "Difficulty", "Credit", "Question"],
            vec![
                vec!["L2".into(), 1i64.into(), 1i64.into(), "Q2".into()],
                vec!["L1".into(), 2i64.into(), 0i64.into(), "Q10".into()],
                vec!["L1".into(), 2i64.into(), 1i64.into(), "Q1".into()],
                vec!["L1".into(), 2i64.into(), 1i64.into(), "Q1".into()],
                vec![Cell::Empty, 1i64.into(), 1i64.into(), "Q3".into()],
            ],
        );
        let out = aggregate_questions(&long, "LO", "english_formatted_long").unwrap();
        assert_eq!(out.columns(), &["LO", "Questions", "Avg Performance (%)"]);
        assert_eq!(out.len(), 2);
        assert_eq!(out.cell(0, 0), &Cell::text("L1"));
        assert_eq!(out.cell(0, 1), &Cell::text("Q1,Q10"));
        assert_eq!(out.cell(0, 2), &Cell::Number(67.0));
        assert_eq!(out.cell(1, 2), &Cell::Number(100.0));
    }

    #[test]
    fn test_aggregate_requires_columns() {
        let t = table(&["LO", "Credit"], vec![]);
        assert!(matches!(
            aggregate_questions(&t, "LO", "x"),
            Err(Error::Step(_))
        ));
    }
}
