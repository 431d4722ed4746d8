//! performance-0: reshape grade workbooks into wide and long question tables.

use crate::domain::filter::apply_filter;
use crate::domain::step::{BucketKey, StepId};
use crate::domain::table::{Cell, Table};
use crate::logging::correlator;
use crate::pipeline::step::{StepContext, StepFunction};
use crate::steps::{FORMATTED_SUFFIX, LONG_SUFFIX, is_grade_source, primary_input, require_column};
use crate::Result;

const LOGIN_COL: &str = "Student LoginId";
const SCHOOL_ID_COL: &str = "school id";
const SCHOOL_ID_LEN: usize = 6;

const BASE_COLS: [&str; 4] = ["District", "SchoolName", LOGIN_COL, "Subject"];
const LONG_BASE_COLS: [&str; 5] = ["District", "SchoolName", LOGIN_COL, SCHOOL_ID_COL, "Subject"];

const DIFFICULTY_SUFFIX: &str = "_difficulty_level";
const LO_SUFFIX: &str = "_LO";
const CREDIT_SUFFIX: &str = "_credit";

pub struct Formatting;

impl StepFunction for Formatting {
    fn id(&self) -> StepId {
        StepId::Performance(0)
    }

    fn dependencies(&self) -> &'static [BucketKey] {
        &[BucketKey::Raw]
    }

    fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let Some(raw) = primary_input(ctx, BucketKey::Raw)? else {
            return Ok(());
        };
        let filter = ctx.settings().filter.clone();

        let mut grade_files = 0;
        for source in raw.sources().filter(|s| is_grade_source(s.name())) {
            grade_files += 1;
            correlator::info(format!("Formatting {}", source.name()));
            for (sheet, table) in source.tables() {
                if sheet.ends_with(FORMATTED_SUFFIX) || sheet.ends_with(LONG_SUFFIX) {
                    continue;
                }
                let filtered = apply_filter(table, &filter);
                let wide = format_wide(&filtered, sheet)?;
                let long = format_long(&wide);

                let out = ctx.output();
                out.insert(source.name(), &format!("{}{}", sheet, FORMATTED_SUFFIX), wide);
                match long {
                    Some(long) => {
                        out.insert(source.name(), &format!("{}{}", sheet, LONG_SUFFIX), long);
                    }
                    None => correlator::debug(format!(
                        "{}/{} has no complete question columns; long table skipped",
                        source.name(),
                        sheet
                    )),
                }
            }
        }

        if grade_files == 0 {
            correlator::warn("No grade workbooks loaded; nothing to format");
        }
        Ok(())
    }
}

/// Select the identity columns and every question column, and add `school id`.
fn format_wide(table: &Table, sheet: &str) -> Result<Table> {
    let columns = table.columns();
    let mut selected: Vec<usize> = BASE_COLS
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();
    for suffix in [DIFFICULTY_SUFFIX, LO_SUFFIX, CREDIT_SUFFIX] {
        selected.extend(
            columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.ends_with(suffix))
                .map(|(i, _)| i),
        );
    }

    let mut wide = table.select(&selected);
    let login = require_column(&wide, LOGIN_COL, sheet)?;
    let school_ids = wide
        .column_values(login)
        .map(|id| Cell::text(id.to_string().chars().take(SCHOOL_ID_LEN).collect::<String>()))
        .collect();
    wide.insert_column(login + 1, SCHOOL_ID_COL, school_ids);
    Ok(wide)
}

/// Question numbers that have all three of `QN_LO`, `QN_difficulty_level` and `QN_credit`.
fn complete_questions(table: &Table) -> Vec<u32> {
    let mut numbers: Vec<u32> = table
        .columns()
        .iter()
        .filter_map(|c| c.strip_suffix(LO_SUFFIX))
        .filter(|q| {
            table.has_column(&format!("{}{}", q, DIFFICULTY_SUFFIX))
                && table.has_column(&format!("{}{}", q, CREDIT_SUFFIX))
        })
        .filter_map(|q| q.strip_prefix('Q').and_then(|n| n.parse::<u32>().ok()))
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    numbers
}

/// Stack one block per complete question: base columns, `LO`, `Difficulty`,
/// `Credit` and the `Question` label.
fn format_long(wide: &Table) -> Option<Table> {
    let questions = complete_questions(wide);
    if questions.is_empty() {
        return None;
    }

    let base: Vec<(&str, usize)> = LONG_BASE_COLS
        .iter()
        .filter_map(|c| wide.column_index(c).map(|i| (*c, i)))
        .collect();
    let mut columns: Vec<&str> = base.iter().map(|(c, _)| *c).collect();
    columns.extend(["LO", "Difficulty", "Credit", "Question"]);

    let mut long = Table::with_columns(&columns);
    for n in questions {
        let label = format!("Q{}", n);
        let lo = wide.column_index(&format!("{}{}", label, LO_SUFFIX));
        let difficulty = wide.column_index(&format!("{}{}", label, DIFFICULTY_SUFFIX));
        let credit = wide.column_index(&format!("{}{}", label, CREDIT_SUFFIX));
        let (Some(lo), Some(difficulty), Some(credit)) = (lo, difficulty, credit) else {
            continue;
        };
        for row in wide.rows() {
            let mut cells: Vec<Cell> = base.iter().map(|(_, i)| row[*i].clone()).collect();
            cells.push(row[lo].clone());
            cells.push(row[difficulty].clone());
            cells.push(row[credit].clone());
            cells.push(Cell::text(label.as_str()));
            long.push_row(cells);
        }
    }
    Some(long)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::config::PipelineSettings;
    use crate::domain::filter::{FilterConfig, SchoolRange};
    use crate::state::store::Bucket;
    use crate::steps::test_support::{run, run_with, table};

    fn grade_sheet() -> Table {
        table(
            &[
                "District",
                "SchoolName",
                "Student LoginId",
                "Subject",
                "Grade",
                "Q1_LO",
                "Q1_difficulty_level",
                "Q1_credit",
                "Q2_LO",
                "Q2_credit",
                "Q10_LO",
                "Q10_difficulty_level",
                "Q10_credit",
                "Noise",
            ],
            vec![
                vec![
                    "North".into(),
                    "Oak".into(),
                    Cell::Number(123456789.0),
                    "English".into(),
                    5i64.into(),
                    "L1".into(),
                    1i64.into(),
                    1i64.into(),
                    "L2".into(),
                    0i64.into(),
                    "L3".into(),
                    2i64.into(),
                    0i64.into(),
                    "x".into(),
                ],
                vec![
                    "North".into(),
                    "Pine".into(),
                    "654321XY".into(),
                    "English".into(),
                    5i64.into(),
                    "L1".into(),
                    1i64.into(),
                    0i64.into(),
                    "L2".into(),
                    1i64.into(),
                    "L3".into(),
                    2i64.into(),
                    1i64.into(),
                    "y".into(),
                ],
            ],
        )
    }

    fn raw() -> Vec<(BucketKey, Bucket)> {
        let mut bucket = Bucket::new();
        bucket.insert("Grade 5", "English", grade_sheet());
        bucket.insert("Grade 5", "English_formatted", grade_sheet());
        bucket.insert("REG VS PART", "Assessment Participation", Table::default());
        vec![(BucketKey::Raw, bucket)]
    }

    #[test]
    fn test_wide_table_columns_and_school_id() {
        let out = run(&Formatting, raw()).unwrap();
        let wide = out.get("Grade 5", "English_formatted").unwrap();
        assert_eq!(
            wide.columns(),
            &[
                "District",
                "SchoolName",
                "Student LoginId",
                "school id",
                "Subject",
                "Q1_difficulty_level",
                "Q10_difficulty_level",
                "Q1_LO",
                "Q2_LO",
                "Q10_LO",
                "Q1_credit",
                "Q2_credit",
                "Q10_credit",
            ]
        );
        assert_eq!(wide.cell(0, 3), &Cell::text("123456"));
        assert_eq!(wide.cell(1, 3), &Cell::text("654321"));
        // The already formatted input sheet is not reformatted.
        assert!(out.get("Grade 5", "English_formatted_formatted").is_none());
        assert!(out.source("REG VS PART").is_none());
    }

    #[test]
    fn test_long_table_stacks_complete_questions() {
        let out = run(&Formatting, raw()).unwrap();
        let long = out.get("Grade 5", "English_formatted_long").unwrap();
        assert_eq!(
            long.columns(),
            &[
                "District",
                "SchoolName",
                "Student LoginId",
                "school id",
                "Subject",
                "LO",
                "Difficulty",
                "Credit",
                "Question",
            ]
        );
        // Q2 lacks a difficulty column: two questions x two students.
        assert_eq!(long.len(), 4);
        assert_eq!(long.cell(0, 8), &Cell::text("Q1"));
        assert_eq!(long.cell(2, 8), &Cell::text("Q10"));
        assert_eq!(long.cell(2, 5), &Cell::text("L3"));
    }

    #[test]
    fn test_filter_applies_before_formatting() {
        let settings = PipelineSettings {
            filter: FilterConfig::only(vec![SchoolRange::new("oak", 5, 5)]),
            ..Default::default()
        };
        let out = run_with(&Formatting, raw(), settings).unwrap();
        let wide = out.get("Grade 5", "English_formatted").unwrap();
        assert_eq!(wide.len(), 1);
        assert_eq!(wide.cell(0, 1), &Cell::text("Oak"));
    }

    #[test]
    fn test_missing_login_column_fails() {
        let mut bucket = Bucket::new();
        bucket.insert(
            "Grade 6",
            "Math",
            table(&["SchoolName", "Q1_credit"], vec![vec!["Oak".into(), 1i64.into()]]),
        );
        let err = run(&Formatting, vec![(BucketKey::Raw, bucket)]).unwrap_err();
        assert!(matches!(err, Error::Step(_)));
    }
}
