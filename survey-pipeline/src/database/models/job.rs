//! Job database models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Pipeline job database model.
/// Represents one triggered run of a single pipeline step.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JobDbModel {
    pub id: String,
    /// Requested step, e.g. `performance-3`
    pub step_name: String,
    /// Status: PENDING, RUNNING, COMPLETED, FAILED
    pub status: String,
    /// JSON array of produced artifact paths
    pub output_files: String,
    pub error_message: Option<String>,
    /// JSON array of [`JobLogEntry`], written on the terminal transition
    pub logs: String,
    /// ISO 8601 timestamp when the job was created
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl JobDbModel {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            step_name: step_name.into(),
            status: JobStatus::Pending.as_str().to_string(),
            output_files: "[]".to_string(),
            error_message: None,
            logs: "[]".to_string(),
            created_at: Utc::now().to_rfc3339(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status)
    }

    /// Decode the output file list. Malformed JSON reads as empty.
    pub fn output_files(&self) -> Vec<String> {
        serde_json::from_str(&self.output_files).unwrap_or_default()
    }

    /// Decode the persisted log entries. Malformed JSON reads as empty.
    pub fn logs(&self) -> Vec<JobLogEntry> {
        serde_json::from_str(&self.logs).unwrap_or_default()
    }
}

/// Job status values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Job is recorded and its background task has not started yet.
    Pending,
    /// Job is currently being executed.
    Running,
    /// Job finished successfully.
    Completed,
    /// Job failed; see `error_message`.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Log level for job execution logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// A single log entry captured during a job run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl JobLogEntry {
    /// Create a new log entry with the current timestamp.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}
