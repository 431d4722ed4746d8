//! Process configuration and runtime pipeline settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::filter::FilterConfig;
use crate::{Error, Result};

/// Default SQLite database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:survey-pipeline.db?mode=rwc";

/// Process-level configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Staged dataset workbooks.
    pub data_dir: PathBuf,
    /// Snapshot exports.
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Optional JSON file holding [`PipelineSettings`].
    pub settings_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("outputs"),
            log_dir: PathBuf::from("logs"),
            settings_path: None,
        }
    }
}

impl AppConfig {
    /// Read `DATABASE_URL`, `DATA_DIR`, `OUTPUT_DIR`, `LOG_DIR` and `PIPELINE_SETTINGS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            database_url: non_empty("DATABASE_URL").unwrap_or(defaults.database_url),
            data_dir: non_empty("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            output_dir: non_empty("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            log_dir: non_empty("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
            settings_path: non_empty("PIPELINE_SETTINGS").map(PathBuf::from),
        }
    }

    /// Load pipeline settings from `settings_path`, or defaults when unset.
    pub fn load_settings(&self) -> Result<PipelineSettings> {
        match &self.settings_path {
            Some(path) => PipelineSettings::load(path),
            None => Ok(PipelineSettings::default()),
        }
    }
}

fn default_exam_grades() -> Vec<u32> {
    (5..=12).collect()
}

/// Settings the steps read at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Grades included in the participation summary.
    #[serde(default = "default_exam_grades", alias = "examGrades")]
    pub exam_grades: Vec<u32>,
    /// Schools included in the participation summary. Empty means all.
    #[serde(default, alias = "participatingSchools")]
    pub participating_schools: Vec<String>,
    /// Row filter applied to grade workbooks before formatting.
    #[serde(default)]
    pub filter: FilterConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            exam_grades: default_exam_grades(),
            participating_schools: Vec::new(),
            filter: FilterConfig::default(),
        }
    }
}

impl PipelineSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::io_path("reading pipeline settings", path, e))?;
        let settings: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.exam_grades.is_empty() {
            return Err(Error::config("exam_grades must not be empty"));
        }
        for school in &self.filter.schools {
            if school.school_name.trim().is_empty() {
                return Err(Error::config("filter school name must not be empty"));
            }
            if school.from_grade > school.to_grade {
                return Err(Error::config(format!(
                    "filter range for '{}' is inverted ({} > {})",
                    school.school_name, school.from_grade, school.to_grade
                )));
            }
        }
        Ok(())
    }

    pub fn includes_grade(&self, grade: u32) -> bool {
        self.exam_grades.contains(&grade)
    }

    /// Whether `school` is in scope for the participation summary.
    pub fn includes_school(&self, school: &str) -> bool {
        if self.participating_schools.is_empty() {
            return true;
        }
        let wanted = school.trim().to_lowercase();
        self.participating_schools
            .iter()
            .any(|s| s.trim().to_lowercase() == wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filter::SchoolRange;
    use std::collections::HashMap;

    #[test]
    fn test_env_defaults() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert!(config.settings_path.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DATA_DIR", "/srv/data"),
            ("OUTPUT_DIR", "/srv/out"),
            ("LOG_DIR", " "),
        ]);
        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.data_dir, PathBuf::from("/srv/data"));
        assert_eq!(config.output_dir, PathBuf::from("/srv/out"));
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_settings_from_json() {
        let settings: PipelineSettings = serde_json::from_str(
            r#"{"examGrades": [5, 6], "participating_schools": ["Oak"], "filter": {"useAll": false, "schools": [{"name": "Oak"}]}}"#,
        )
        .unwrap();
        assert_eq!(settings.exam_grades, vec![5, 6]);
        assert!(settings.includes_school(" oak "));
        assert!(!settings.includes_school("Pine"));
        assert!(!settings.filter.use_all);
        settings.validate().unwrap();
    }

    #[test]
    fn test_empty_school_list_includes_everyone() {
        let settings = PipelineSettings::default();
        assert!(settings.includes_school("anything"));
        assert!(settings.includes_grade(12));
        assert!(!settings.includes_grade(4));
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let mut settings = PipelineSettings::default();
        settings.filter = FilterConfig::only(vec![SchoolRange::new("Oak", 9, 5)]);
        assert!(matches!(settings.validate(), Err(Error::Configuration(_))));
    }
}
