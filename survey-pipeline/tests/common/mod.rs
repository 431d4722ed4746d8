#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use survey_pipeline::config::PipelineSettings;
use survey_pipeline::database::{self, DbPool};
use survey_pipeline::domain::{Cell, Table};
use survey_pipeline::pipeline::{Orchestrator, PipelineContext, StepRegistry};
use survey_pipeline::workbook::write_workbook;
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
    pub pool: DbPool,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("outputs")
    }

    /// A second orchestrator over the same directories and database,
    /// standing in for a restarted process.
    pub fn restarted(&self) -> Orchestrator {
        let ctx = PipelineContext::new(
            self.data_dir(),
            self.output_dir(),
            PipelineSettings::default(),
        );
        Orchestrator::new(ctx, self.pool.clone())
    }
}

pub async fn harness() -> Harness {
    harness_with(StepRegistry::default(), true).await
}

pub async fn harness_with(registry: StepRegistry, with_dataset: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("pipeline.db");
    let db_url = format!(
        "sqlite:{}?mode=rwc",
        db_path.to_string_lossy().replace('\\', "/")
    );
    let pool = database::init_pool(&db_url).await.unwrap();
    database::run_migrations(&pool).await.unwrap();

    let data_dir = dir.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    if with_dataset {
        write_dataset(&data_dir);
    }

    let ctx = PipelineContext::with_registry(
        data_dir,
        dir.path().join("outputs"),
        PipelineSettings::default(),
        registry,
    );
    let orchestrator = Arc::new(Orchestrator::new(ctx, pool.clone()));
    Harness {
        dir,
        pool,
        orchestrator,
    }
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|c| c.to_string()).collect()
}

/// `Assessment Participation` sheet: header row, grade-number row, then schools.
pub fn participation_sheet() -> Table {
    let mut names = vec!["S.No".to_string(), "School Name".into(), "District".into()];
    names.extend((1..=12).map(|g| format!("Reg G{}", g)));
    names.push("Total Registered".into());
    names.extend((1..=12).map(|g| format!("Part G{}", g)));
    names.extend(["Total Participated".into(), "Contact Name".into(), "Contact Phone".into()]);
    let mut table = Table::new(names);

    let mut grades = vec![Cell::Empty; 3];
    grades.extend((1..=12).map(|g| Cell::from(g as i64)));
    grades.push(Cell::Empty);
    grades.extend((1..=12).map(|g| Cell::from(g as i64)));
    table.push_row(grades);

    for (i, (school, reg5, part5)) in [("Oak", 20, 15), ("Pine", 10, 10), ("Total", 30, 25)]
        .into_iter()
        .enumerate()
    {
        let mut row = vec![Cell::from(i as i64 + 1), Cell::text(school), Cell::text("North")];
        let mut reg = vec![Cell::from(0i64); 12];
        reg[4] = Cell::from(reg5 as i64);
        let mut part = vec![Cell::from(0i64); 12];
        part[4] = Cell::from(part5 as i64);
        row.extend(reg);
        row.push(Cell::from(reg5 as i64));
        row.extend(part);
        row.push(Cell::from(part5 as i64));
        row.push(Cell::text("Contact"));
        row.push(Cell::text("555"));
        table.push_row(row);
    }
    table
}

/// One subject sheet with three students and two complete questions.
pub fn subject_sheet(subject: &str, grade: i64) -> Table {
    let mut table = Table::new(columns(&[
        "District",
        "SchoolName",
        "Student LoginId",
        "Subject",
        "Grade",
        "Q1_LO",
        "Q1_difficulty_level",
        "Q1_credit",
        "Q2_LO",
        "Q2_difficulty_level",
        "Q2_credit",
    ]));
    for (school, login, q1, q2) in [
        ("Oak", "OAK001A", 1i64, 1i64),
        ("Oak", "OAK001B", 1, 0),
        ("Pine", "PIN002A", 0, 0),
    ] {
        table.push_row(vec![
            Cell::text("North"),
            Cell::text(school),
            Cell::text(login),
            Cell::text(subject),
            Cell::from(grade),
            Cell::text("Reading"),
            Cell::from(1i64),
            Cell::from(q1),
            Cell::text("Writing"),
            Cell::from(2i64),
            Cell::from(q2),
        ]);
    }
    table
}

pub fn write_dataset(data_dir: &Path) {
    let participation = participation_sheet();
    write_workbook(
        &data_dir.join("REG VS PART.xlsx"),
        &[("Assessment Participation".to_string(), &participation)],
    )
    .unwrap();

    for grade in [5i64, 6] {
        let english = subject_sheet("English", grade);
        let math = subject_sheet("Math", grade);
        write_workbook(
            &data_dir.join(format!("Grade {}.xlsx", grade)),
            &[("English".to_string(), &english), ("Math".to_string(), &math)],
        )
        .unwrap();
    }
}
