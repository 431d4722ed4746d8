//! Process-wide pipeline context and the shared step runner.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::Result;
use crate::config::PipelineSettings;
use crate::domain::step::{BucketKey, StepId};
use crate::logging::correlator::{self, LogCorrelator};
use crate::pipeline::step::{StepContext, StepRegistry};
use crate::state::{PreviewRegistry, SharedStore, SnapshotExporter, shared_store};
use crate::upload;

/// Shared resources owned once per process: state store, previews, log
/// buffers, step registry and settings.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: SharedStore,
    pub previews: Arc<PreviewRegistry>,
    pub correlator: Arc<LogCorrelator>,
    pub registry: Arc<StepRegistry>,
    pub snapshots: SnapshotExporter,
    settings: Arc<RwLock<PipelineSettings>>,
    data_dir: PathBuf,
}

impl PipelineContext {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        settings: PipelineSettings,
    ) -> Self {
        Self::with_registry(data_dir, output_dir, settings, StepRegistry::default())
    }

    pub fn with_registry(
        data_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        settings: PipelineSettings,
        registry: StepRegistry,
    ) -> Self {
        Self {
            store: shared_store(),
            previews: Arc::new(PreviewRegistry::new()),
            correlator: Arc::new(LogCorrelator::new()),
            registry: Arc::new(registry),
            snapshots: SnapshotExporter::new(output_dir),
            settings: Arc::new(RwLock::new(settings)),
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn settings(&self) -> PipelineSettings {
        self.settings.read().clone()
    }

    pub fn set_settings(&self, settings: PipelineSettings) {
        *self.settings.write() = settings;
    }

    /// Drop every bucket and preview.
    pub fn clear_state(&self) {
        self.store.lock().reset();
        self.previews.clear();
    }

    /// Run one step to completion on the calling thread.
    ///
    /// The step's bucket is emptied first and refilled with whatever the step
    /// produced, even when it fails. Only a successful run exports a snapshot
    /// and refreshes the preview; an empty result removes both.
    pub fn run_step(&self, step: StepId) -> Result<Vec<PathBuf>> {
        let function = self.registry.get(step)?;
        let deps = function.dependencies();
        let own = BucketKey::Step(step);
        let settings = Arc::new(self.settings());

        let mut store = self.store.lock();

        if deps.contains(&BucketKey::Raw) && store.is_empty(BucketKey::Raw) {
            correlator::info(format!(
                "Loading raw inputs from {}",
                self.data_dir.display()
            ));
            let raw = upload::load_raw_inputs(&self.data_dir)?;
            store.replace(BucketKey::Raw, raw);
        }

        store.clear_bucket(own);
        let inputs = deps
            .iter()
            .map(|key| (*key, store.bucket(*key).clone()))
            .collect();

        let mut ctx = StepContext::new(step, inputs, settings);
        correlator::info(format!("Running {}", step));
        let result = function.run(&mut ctx);
        store.replace(own, ctx.into_output());
        result?;

        let bucket = store.bucket(own);
        if bucket.is_empty() {
            correlator::info(format!("{} produced no output", step));
            self.previews.remove(step);
            self.snapshots.remove(step)?;
            return Ok(Vec::new());
        }

        let files = self.snapshots.export(step, bucket)?;
        self.previews.register(step, bucket);
        correlator::info(format!(
            "{} wrote {} table(s) to {} file(s)",
            step,
            bucket.table_count(),
            files.len()
        ));
        Ok(files)
    }

    /// Load a step's snapshot back into its bucket and preview.
    ///
    /// Returns false when the step has no snapshot on disk.
    pub fn restore_step(&self, step: StepId) -> Result<bool> {
        let Some(bucket) = self.snapshots.restore(step)? else {
            return Ok(false);
        };
        self.previews.register(step, &bucket);
        self.store.lock().replace(BucketKey::Step(step), bucket);
        Ok(true)
    }
}
