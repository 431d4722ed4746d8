//! Upload gate: dataset staging, input discovery and raw loading.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::state::store::Bucket;
use crate::utils::fs;
use crate::{Error, Result, workbook};

/// Mandatory registration workbook.
pub const REGISTRATION_FILE: &str = "REG VS PART.xlsx";

static REGISTRATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^REG VS PART\.xlsx$").expect("registration file regex is valid")
});

static GRADE_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^Grade[_\s-]?\d+\.xlsx$").expect("grade file regex is valid")
});

const CLEAR_ATTEMPTS: usize = 3;
const CLEAR_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Result of scanning the data directory (top level only).
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataFiles {
    pub registration: Option<PathBuf>,
    pub grades: Vec<PathBuf>,
    /// Every regular file found.
    pub all: Vec<PathBuf>,
}

impl DataFiles {
    pub fn is_complete(&self) -> bool {
        self.registration.is_some() && !self.grades.is_empty()
    }

    /// Fail with `MissingInput` unless both required inputs are present.
    pub fn require_complete(&self) -> Result<()> {
        if self.registration.is_none() {
            return Err(Error::MissingInput(format!(
                "required file {} not found",
                REGISTRATION_FILE
            )));
        }
        if self.grades.is_empty() {
            return Err(Error::MissingInput(
                "no grade workbooks found (e.g. 'Grade 5.xlsx')".to_string(),
            ));
        }
        Ok(())
    }

    pub fn file_names(&self) -> Vec<String> {
        self.all
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect()
    }
}

pub fn is_registration_file(name: &str) -> bool {
    REGISTRATION_RE.is_match(name)
}

pub fn is_grade_file(name: &str) -> bool {
    GRADE_FILE_RE.is_match(name)
}

/// Scan the top level of `data_dir` for pipeline inputs.
pub fn scan_data_dir(data_dir: &Path) -> Result<DataFiles> {
    let mut files = DataFiles::default();
    for path in fs::list_files_sync(data_dir)? {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        if is_registration_file(&name) {
            files.registration = Some(path.clone());
        } else if is_grade_file(&name) {
            files.grades.push(path.clone());
        }
        files.all.push(path);
    }
    Ok(files)
}

/// Scan and require the mandatory inputs.
pub fn require_inputs(data_dir: &Path) -> Result<DataFiles> {
    let files = scan_data_dir(data_dir)?;
    files.require_complete()?;
    Ok(files)
}

fn clear_with_retries(dir: &Path) -> Result<()> {
    let mut attempt = 1;
    loop {
        match fs::clear_dir_sync(dir) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < CLEAR_ATTEMPTS => {
                warn!(
                    dir = %dir.display(),
                    attempt,
                    error = %e,
                    "Failed to clear data directory, retrying"
                );
                std::thread::sleep(CLEAR_RETRY_DELAY);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// If extraction produced a single wrapper directory, move its contents up.
fn flatten_single_dir(data_dir: &Path) -> Result<()> {
    let entries: Vec<PathBuf> = std::fs::read_dir(data_dir)
        .map_err(|e| fs::io_error("listing data directory", data_dir, e))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.file_name().is_some_and(|n| n != "__MACOSX"))
        .collect();

    let [nested] = entries.as_slice() else {
        return Ok(());
    };
    if !nested.is_dir() {
        return Ok(());
    }

    info!(dir = %nested.display(), "Flattening nested dataset directory");
    for entry in std::fs::read_dir(nested).map_err(|e| fs::io_error("listing directory", nested, e))? {
        let from = entry
            .map_err(|e| fs::io_error("listing directory", nested, e))?
            .path();
        let Some(name) = from.file_name() else {
            continue;
        };
        let to = data_dir.join(name);
        if !to.exists() {
            std::fs::rename(&from, &to).map_err(|e| fs::io_error("moving extracted file", &from, e))?;
        }
    }
    std::fs::remove_dir_all(nested).map_err(|e| fs::io_error("removing nested directory", nested, e))?;
    Ok(())
}

fn extract_and_validate(bytes: Vec<u8>, data_dir: &Path) -> Result<DataFiles> {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes))?;
    zip.extract(data_dir)?;
    flatten_single_dir(data_dir)?;
    require_inputs(data_dir)
}

/// Replace the contents of `data_dir` with the dataset in `archive`.
///
/// The directory is cleared, the archive extracted (a single wrapper folder
/// is flattened) and the result validated. On any failure the directory is
/// cleared again so a half-staged dataset never looks valid.
pub fn stage_archive(archive: &Path, data_dir: &Path) -> Result<DataFiles> {
    let bytes =
        std::fs::read(archive).map_err(|e| fs::io_error("reading dataset archive", archive, e))?;

    fs::ensure_dir_all_sync_with_op("creating data directory", data_dir)?;
    clear_with_retries(data_dir)?;

    match extract_and_validate(bytes, data_dir) {
        Ok(files) => {
            info!(
                files = files.all.len(),
                grades = files.grades.len(),
                "Dataset staged"
            );
            Ok(files)
        }
        Err(e) => {
            warn!(error = %e, "Dataset staging failed; clearing data directory");
            if let Err(clear_err) = clear_with_retries(data_dir) {
                warn!(error = %clear_err, "Failed to clear data directory after staging error");
            }
            Err(e)
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Load the registration and grade workbooks into a raw bucket.
///
/// Sources are file stems; tables are sheet names.
pub fn load_raw_inputs(data_dir: &Path) -> Result<Bucket> {
    let files = require_inputs(data_dir)?;
    let mut bucket = Bucket::new();
    for path in files.registration.iter().chain(files.grades.iter()) {
        let source = file_stem(path);
        for (sheet, table) in workbook::read_workbook(path)? {
            bucket.insert(&source, &sheet, Arc::new(table));
        }
    }
    info!(tables = bucket.table_count(), "Loaded raw inputs");
    Ok(bucket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    #[rstest]
    #[case("Grade 5.xlsx", true)]
    #[case("grade_12.xlsx", true)]
    #[case("GRADE-7.xlsx", true)]
    #[case("Grade5.xlsx", true)]
    #[case("Grade 5 copy.xlsx", false)]
    #[case("Grade 5.xls", false)]
    fn test_grade_file_pattern(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_grade_file(name), expected);
    }

    #[test]
    fn test_registration_pattern_is_case_insensitive() {
        assert!(is_registration_file("REG VS PART.xlsx"));
        assert!(is_registration_file("reg vs part.XLSX"));
        assert!(!is_registration_file("REG_VS_PART.xlsx"));
    }

    #[test]
    fn test_scan_is_not_recursive() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("Grade 5.xlsx"), b"x").unwrap();
        std::fs::write(dir.path().join("REG VS PART.xlsx"), b"x").unwrap();

        let files = scan_data_dir(dir.path()).unwrap();
        assert!(files.registration.is_some());
        assert!(files.grades.is_empty());
        assert!(matches!(
            files.require_complete(),
            Err(Error::MissingInput(_))
        ));
    }

    fn zip_with(entries: &[&str]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            for name in entries {
                writer
                    .start_file(*name, SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(b"placeholder").unwrap();
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_stage_flattens_wrapper_directory() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("dataset.zip");
        std::fs::write(
            &archive,
            zip_with(&["data/REG VS PART.xlsx", "data/Grade 5.xlsx"]),
        )
        .unwrap();
        let data_dir = tmp.path().join("data");
        std::fs::create_dir(&data_dir).unwrap();
        std::fs::write(data_dir.join("stale.xlsx"), b"old").unwrap();

        let files = stage_archive(&archive, &data_dir).unwrap();
        assert!(files.is_complete());
        assert!(!data_dir.join("stale.xlsx").exists());
        assert!(!data_dir.join("data").exists());
    }

    #[test]
    fn test_stage_rejects_incomplete_dataset_and_clears() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("dataset.zip");
        std::fs::write(&archive, zip_with(&["Grade 5.xlsx"])).unwrap();
        let data_dir = tmp.path().join("data");

        let result = stage_archive(&archive, &data_dir);
        assert!(matches!(result, Err(Error::MissingInput(_))));
        assert_eq!(std::fs::read_dir(&data_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_stage_rejects_non_zip() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("dataset.zip");
        std::fs::write(&archive, b"not a zip").unwrap();
        let result = stage_archive(&archive, &tmp.path().join("data"));
        assert!(matches!(result, Err(Error::Zip(_))));
    }
}
