//! Pipeline flag database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Flag key set once a dataset archive has been staged and validated.
pub const DATASET_UPLOADED: &str = "dataset_uploaded";

/// Flag key set once the consolidated workbook is available.
pub const FINAL_FILE_READY: &str = "final_file_ready";

/// Durable key/value flag.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FlagDbModel {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

/// Values stored for per-stage flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FlagValue {
    Completed,
    Failed,
    True,
    False,
}

impl FlagValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::True => "true",
            Self::False => "false",
        }
    }
}
