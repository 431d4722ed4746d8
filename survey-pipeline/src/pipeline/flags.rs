//! Coarse per-stage completion flags.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Result;
use crate::database::models::{DATASET_UPLOADED, FINAL_FILE_READY, FlagValue};
use crate::database::repositories::FlagRepository;
use crate::domain::step::{Stage, StepId};

/// Snapshot of the flag table grouped by stage.
///
/// Stage maps are keyed by `stepN`, e.g. `performance["step3"] = "completed"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStateView {
    pub participation: BTreeMap<String, String>,
    pub performance: BTreeMap<String, String>,
    pub final_file_ready: bool,
    pub dataset_uploaded: bool,
}

pub struct PipelineFlags {
    repo: Arc<dyn FlagRepository>,
}

impl PipelineFlags {
    pub fn new(repo: Arc<dyn FlagRepository>) -> Self {
        Self { repo }
    }

    pub async fn set(&self, key: &str, value: FlagValue) -> Result<()> {
        self.repo.set_flag(key, value.as_str()).await
    }

    /// Record a step's outcome under its stage key.
    pub async fn set_step(&self, step: StepId, value: FlagValue) -> Result<()> {
        self.set(&step.flag_key(), value).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.repo.get_flag(key).await?.map(|f| f.value))
    }

    pub async fn is_true(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.as_deref() == Some(FlagValue::True.as_str()))
    }

    pub async fn clear(&self) -> Result<u64> {
        self.repo.clear_flags().await
    }

    /// Grouped view of every flag. Storage errors yield an empty view.
    pub async fn state_view(&self) -> PipelineStateView {
        let flags = match self.repo.list_flags().await {
            Ok(flags) => flags,
            Err(e) => {
                warn!(error = %e, "Failed to read pipeline flags");
                return PipelineStateView::default();
            }
        };

        let mut view = PipelineStateView::default();
        let participation = format!("{}.", Stage::Participation);
        let performance = format!("{}.", Stage::Performance);
        for flag in flags {
            if let Some(step) = flag.key.strip_prefix(&participation) {
                view.participation.insert(step.to_string(), flag.value);
            } else if let Some(step) = flag.key.strip_prefix(&performance) {
                view.performance.insert(step.to_string(), flag.value);
            } else if flag.key == FINAL_FILE_READY {
                view.final_file_ready = flag.value == FlagValue::True.as_str();
            } else if flag.key == DATASET_UPLOADED {
                view.dataset_uploaded = flag.value == FlagValue::True.as_str();
            }
        }
        view
    }
}
