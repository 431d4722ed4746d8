//! participation-0: registration versus participation summary.

use crate::config::PipelineSettings;
use crate::domain::step::{BucketKey, StepId};
use crate::domain::table::{Cell, Table, round_cell};
use crate::logging::correlator;
use crate::pipeline::step::{StepContext, StepFunction};
use crate::steps::primary_input;
use crate::{Error, Result};

pub(crate) const REGISTRATION_SOURCE: &str = "REG VS PART";
const PARTICIPATION_SHEET: &str = "Assessment Participation";

const SCHOOL_COL: usize = 1;
const REGISTERED: std::ops::Range<usize> = 3..15;
const PARTICIPATED: std::ops::Range<usize> = 16..28;
/// Every column up to and including `Total Participated`.
const MIN_WIDTH: usize = 29;

pub struct ParticipationSummary;

impl StepFunction for ParticipationSummary {
    fn id(&self) -> StepId {
        StepId::Participation
    }

    fn dependencies(&self) -> &'static [BucketKey] {
        &[BucketKey::Raw]
    }

    fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let Some(raw) = primary_input(ctx, BucketKey::Raw)? else {
            return Ok(());
        };

        let Some(source) = raw
            .sources()
            .find(|s| s.name().trim().eq_ignore_ascii_case(REGISTRATION_SOURCE))
        else {
            correlator::warn(format!(
                "Registration workbook '{}' is not loaded; nothing to summarize",
                REGISTRATION_SOURCE
            ));
            return Ok(());
        };

        let sheet = source
            .tables()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(PARTICIPATION_SHEET))
            .map(|(_, t)| t)
            .ok_or_else(|| {
                Error::step(format!(
                    "sheet '{}' not found in '{}'",
                    PARTICIPATION_SHEET, REGISTRATION_SOURCE
                ))
            })?;

        let (schools, grades) = summarize(sheet, ctx.settings())?;
        correlator::info(format!(
            "Summarized {} school(s) across {} grade(s)",
            schools.len(),
            grades.len()
        ));

        let out = ctx.output();
        out.insert(REGISTRATION_SOURCE, "schl_wise", schools);
        out.insert(REGISTRATION_SOURCE, "grade_wise", grades);
        Ok(())
    }
}

fn grade_of(header: &Cell, col: usize) -> Result<u32> {
    header
        .as_f64()
        .filter(|g| *g >= 0.0)
        .map(|g| g.trunc() as u32)
        .ok_or_else(|| {
            Error::step(format!(
                "column {} of the grade header row is not a grade number: '{}'",
                col, header
            ))
        })
}

fn count(cell: &Cell) -> f64 {
    cell.as_f64().unwrap_or(0.0)
}

/// Build `schl_wise` and `grade_wise` from the two-header-row sheet.
///
/// The first data row carries the grade numbers for the registered and
/// participated blocks.
fn summarize(sheet: &Table, settings: &PipelineSettings) -> Result<(Table, Table)> {
    if sheet.width() < MIN_WIDTH {
        return Err(Error::step(format!(
            "'{}' has {} columns, expected at least {}",
            PARTICIPATION_SHEET,
            sheet.width(),
            MIN_WIDTH
        )));
    }
    let Some((grade_row, body)) = sheet.rows().split_first() else {
        return Err(Error::step(format!(
            "'{}' is missing its grade header row",
            PARTICIPATION_SHEET
        )));
    };

    let mut registered = Vec::new();
    for col in REGISTERED {
        let grade = grade_of(&grade_row[col], col)?;
        if settings.includes_grade(grade) {
            registered.push((grade, col));
        }
    }
    let mut participated = Vec::new();
    for col in PARTICIPATED {
        let grade = grade_of(&grade_row[col], col)?;
        if settings.includes_grade(grade) {
            participated.push((grade, col));
        }
    }
    correlator::debug(format!(
        "Registered columns {:?}, participated columns {:?}",
        registered, participated
    ));

    let rows: Vec<_> = body
        .iter()
        .filter(|row| {
            let school = row[SCHOOL_COL].to_string();
            let school = school.trim();
            !school.eq_ignore_ascii_case("total") && settings.includes_school(school)
        })
        .collect();

    let mut schools = Table::with_columns(&[
        "School Name",
        "Participated",
        "Not Participated",
        "Registered",
    ]);
    for row in &rows {
        let reg: f64 = registered.iter().map(|(_, c)| count(&row[*c])).sum();
        let part: f64 = participated.iter().map(|(_, c)| count(&row[*c])).sum();
        schools.push_row(vec![
            Cell::text(row[SCHOOL_COL].to_string().trim()),
            part.into(),
            (reg - part).into(),
            reg.into(),
        ]);
    }

    let mut grades = Table::with_columns(&["Grade", "Registered", "Participated", "Participation %"]);
    for (i, (grade, reg_col)) in registered.iter().enumerate() {
        let reg: f64 = rows.iter().map(|r| count(&r[*reg_col])).sum();
        let part: f64 = participated
            .get(i)
            .map(|(_, c)| rows.iter().map(|r| count(&r[*c])).sum())
            .unwrap_or(0.0);
        let pct = if reg > 0.0 {
            round_cell(part / reg * 100.0)
        } else {
            Cell::Number(0.0)
        };
        grades.push_row(vec![(*grade as i64).into(), reg.into(), part.into(), pct]);
    }

    Ok((schools, grades))
}
