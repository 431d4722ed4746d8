//! Filesystem helpers shared across modules.
//!
//! Every helper attaches the operation and path to IO failures so that
//! job logs say what was being touched when something went wrong.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists (synchronous variant).
pub fn ensure_dir_all_sync(path: &Path) -> Result<()> {
    ensure_dir_all_sync_with_op("creating directory", path)
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error(op, path, e))
}

/// Remove a file if it exists. Missing files are not an error.
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error("removing file", path, e)),
    }
}

/// Remove every entry inside `dir`, keeping the directory itself.
pub fn clear_dir_sync(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return ensure_dir_all_sync(dir);
    }
    for entry in std::fs::read_dir(dir).map_err(|e| io_error("listing directory", dir, e))? {
        let entry = entry.map_err(|e| io_error("listing directory", dir, e))?;
        let path = entry.path();
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        result.map_err(|e| io_error("clearing directory", &path, e))?;
    }
    Ok(())
}

/// List the regular files directly inside `dir`, sorted by name.
pub fn list_files_sync(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in std::fs::read_dir(dir).map_err(|e| io_error("listing directory", dir, e))? {
        let entry = entry.map_err(|e| io_error("listing directory", dir, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clear_dir_keeps_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.xlsx"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("b.xlsx"), b"y").unwrap();

        clear_dir_sync(dir.path()).unwrap();

        assert!(dir.path().exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_remove_missing_file_is_ok() {
        let dir = TempDir::new().unwrap();
        assert!(!remove_file_if_exists(&dir.path().join("missing.xlsx")).unwrap());
    }

    #[test]
    fn test_list_files_skips_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.xlsx"), b"x").unwrap();
        std::fs::write(dir.path().join("a.xlsx"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let files = list_files_sync(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.xlsx", "b.xlsx"]);
    }
}
