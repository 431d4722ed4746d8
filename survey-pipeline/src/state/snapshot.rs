//! Durable per-step snapshot exports.
//!
//! Each step's bucket is flattened into one workbook (`<source>_<table>`
//! sheets) with a JSON manifest beside it so the bucket can be restored.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::step::StepId;
use crate::domain::table::Table;
use crate::state::store::Bucket;
use crate::utils::filename::{dedupe_sheet_name, safe_sheet_name};
use crate::utils::fs;
use crate::{Error, Result, workbook};

/// Where one sheet of a snapshot came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSheet {
    pub sheet: String,
    pub source: String,
    pub table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub step: StepId,
    pub created_at: DateTime<Utc>,
    pub sheets: Vec<ManifestSheet>,
}

/// Assign each table of the bucket a unique, Excel-safe sheet name.
pub fn plan_sheets(bucket: &Bucket) -> Vec<ManifestSheet> {
    let mut taken: Vec<String> = Vec::new();
    let mut plan = Vec::with_capacity(bucket.table_count());
    for (source, table, _) in bucket.iter_tables() {
        let candidate = safe_sheet_name(&format!("{}_{}", source, table));
        let sheet = dedupe_sheet_name(&candidate, &taken);
        taken.push(sheet.clone());
        plan.push(ManifestSheet {
            sheet,
            source: source.to_string(),
            table: table.to_string(),
        });
    }
    plan
}

/// Writes and reads snapshot workbooks under one output directory.
#[derive(Debug, Clone)]
pub struct SnapshotExporter {
    output_dir: PathBuf,
}

impl SnapshotExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn snapshot_path(&self, step: StepId) -> PathBuf {
        self.output_dir.join(format!("{}.xlsx", step.snapshot_name()))
    }

    pub fn manifest_path(&self, step: StepId) -> PathBuf {
        self.output_dir
            .join(format!("{}.manifest.json", step.snapshot_name()))
    }

    /// Export `bucket` as the snapshot for `step`, returning the artifact paths.
    ///
    /// An empty bucket writes nothing and removes any stale snapshot.
    pub fn export(&self, step: StepId, bucket: &Bucket) -> Result<Vec<PathBuf>> {
        if bucket.is_empty() {
            self.remove(step)?;
            return Ok(Vec::new());
        }

        fs::ensure_dir_all_sync_with_op("creating output directory", &self.output_dir)?;

        let plan = plan_sheets(bucket);
        let sheets: Vec<(String, &Table)> = plan
            .iter()
            .zip(bucket.iter_tables())
            .map(|(entry, (_, _, table))| (entry.sheet.clone(), table.as_ref()))
            .collect();

        let path = self.snapshot_path(step);
        let tmp = path.with_extension("xlsx.tmp");
        workbook::write_workbook(&tmp, &sheets)?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| fs::io_error("publishing snapshot", &path, e))?;

        let manifest = SnapshotManifest {
            step,
            created_at: Utc::now(),
            sheets: plan,
        };
        let manifest_path = self.manifest_path(step);
        let manifest_tmp = manifest_path.with_extension("json.tmp");
        std::fs::write(&manifest_tmp, serde_json::to_vec_pretty(&manifest)?)
            .map_err(|e| fs::io_error("writing snapshot manifest", &manifest_tmp, e))?;
        std::fs::rename(&manifest_tmp, &manifest_path)
            .map_err(|e| fs::io_error("publishing snapshot manifest", &manifest_path, e))?;

        info!(
            step = %step,
            path = %path.display(),
            sheets = manifest.sheets.len(),
            "Exported snapshot"
        );
        Ok(vec![path])
    }

    /// Delete the snapshot and manifest for `step`, if present.
    pub fn remove(&self, step: StepId) -> Result<()> {
        let removed = fs::remove_file_if_exists(&self.snapshot_path(step))?;
        fs::remove_file_if_exists(&self.manifest_path(step))?;
        if removed {
            debug!(step = %step, "Removed stale snapshot");
        }
        Ok(())
    }

    /// Snapshot files currently on disk for `step`.
    pub fn existing(&self, step: StepId) -> Vec<PathBuf> {
        let path = self.snapshot_path(step);
        if path.is_file() { vec![path] } else { Vec::new() }
    }

    /// Rebuild the bucket for `step` from its snapshot, if one exists.
    ///
    /// Without a manifest every sheet is restored under a source named after
    /// the snapshot.
    pub fn restore(&self, step: StepId) -> Result<Option<Bucket>> {
        let path = self.snapshot_path(step);
        if !path.is_file() {
            return Ok(None);
        }

        let manifest_path = self.manifest_path(step);
        let manifest: Option<SnapshotManifest> = if manifest_path.is_file() {
            let raw = std::fs::read(&manifest_path)
                .map_err(|e| fs::io_error("reading snapshot manifest", &manifest_path, e))?;
            Some(serde_json::from_slice(&raw)?)
        } else {
            None
        };

        let sheets = workbook::read_workbook(&path)?;
        let mut bucket = Bucket::new();
        match manifest {
            Some(manifest) => {
                for entry in manifest.sheets {
                    let table = sheets
                        .iter()
                        .find(|(name, _)| *name == entry.sheet)
                        .map(|(_, t)| t.clone())
                        .ok_or_else(|| {
                            Error::validation(format!(
                                "snapshot {} is missing sheet '{}'",
                                path.display(),
                                entry.sheet
                            ))
                        })?;
                    bucket.insert(&entry.source, &entry.table, Arc::new(table));
                }
            }
            None => {
                for (name, table) in sheets {
                    bucket.insert(step.snapshot_name(), &name, Arc::new(table));
                }
            }
        }

        info!(step = %step, tables = bucket.table_count(), "Restored snapshot");
        Ok(Some(bucket))
    }
}
