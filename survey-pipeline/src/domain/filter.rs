//! Config-driven school/grade row filter.

use serde::{Deserialize, Serialize};

use crate::domain::table::Table;
use crate::logging::correlator;

/// Column names recognised as the school field, in priority order.
const SCHOOL_COLUMNS: &[&str] = &["SchoolName", "School Name"];

fn default_true() -> bool {
    true
}

fn default_to_grade() -> i64 {
    100
}

/// One allowed school and its inclusive grade range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolRange {
    #[serde(alias = "schoolName", alias = "name")]
    pub school_name: String,
    #[serde(default, alias = "fromGrade")]
    pub from_grade: i64,
    #[serde(default = "default_to_grade", alias = "toGrade")]
    pub to_grade: i64,
}

impl SchoolRange {
    pub fn new(school_name: impl Into<String>, from_grade: i64, to_grade: i64) -> Self {
        Self {
            school_name: school_name.into(),
            from_grade,
            to_grade,
        }
    }

    fn contains(&self, grade: f64) -> bool {
        grade >= self.from_grade as f64 && grade <= self.to_grade as f64
    }
}

/// Filter configuration: either everything, or an explicit school list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_true", alias = "useAll")]
    pub use_all: bool,
    #[serde(default)]
    pub schools: Vec<SchoolRange>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            use_all: true,
            schools: Vec::new(),
        }
    }
}

impl FilterConfig {
    pub fn only(schools: Vec<SchoolRange>) -> Self {
        Self {
            use_all: false,
            schools,
        }
    }
}

/// Apply `config` to `table`, returning the kept rows in input order.
///
/// A row is kept when its school matches an entry (trimmed, case-insensitive)
/// and, if the table has a `Grade` column, its numeric grade lies in that
/// entry's range. Non-numeric grades never match.
pub fn apply_filter(table: &Table, config: &FilterConfig) -> Table {
    if config.use_all {
        return table.clone();
    }
    if config.schools.is_empty() {
        return table.empty_like();
    }

    let Some(school_col) = SCHOOL_COLUMNS
        .iter()
        .find_map(|name| table.column_index(name))
    else {
        correlator::warn("School column not found for filtering; rows left unfiltered");
        return table.clone();
    };
    let grade_col = table.column_index_ci("Grade");

    let wanted: Vec<(String, &SchoolRange)> = config
        .schools
        .iter()
        .map(|s| (s.school_name.trim().to_lowercase(), s))
        .collect();

    let filtered = table.filter_rows(|row| {
        let school = row[school_col].normalized();
        let grade = grade_col.map(|i| row[i].as_f64());
        wanted.iter().any(|(name, range)| {
            *name == school
                && match grade {
                    None => true,
                    Some(Some(g)) => range.contains(g),
                    Some(None) => false,
                }
        })
    });

    correlator::info(format!(
        "Filter kept {} of {} rows for {} configured school(s)",
        filtered.len(),
        table.len(),
        config.schools.len()
    ));
    filtered
}
