//! Step function trait, per-run context and the step registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::PipelineSettings;
use crate::domain::step::{BucketKey, StepId};
use crate::state::store::Bucket;
use crate::steps;
use crate::{Error, Result};

/// Everything one step run may touch.
///
/// Dependency buckets are read-only copies taken when the run starts (tables
/// are shared, not duplicated). The step writes only to its own output bucket.
pub struct StepContext {
    step: StepId,
    inputs: Vec<(BucketKey, Bucket)>,
    output: Bucket,
    settings: Arc<PipelineSettings>,
}

impl StepContext {
    pub fn new(
        step: StepId,
        inputs: Vec<(BucketKey, Bucket)>,
        settings: Arc<PipelineSettings>,
    ) -> Self {
        Self {
            step,
            inputs,
            output: Bucket::new(),
            settings,
        }
    }

    pub fn step(&self) -> StepId {
        self.step
    }

    /// A declared dependency bucket. Reading an undeclared bucket is an error.
    pub fn input(&self, key: impl Into<BucketKey>) -> Result<&Bucket> {
        let key = key.into();
        self.inputs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, b)| b)
            .ok_or_else(|| {
                Error::step(format!(
                    "{} did not declare a dependency on bucket '{}'",
                    self.step, key
                ))
            })
    }

    pub fn output(&mut self) -> &mut Bucket {
        &mut self.output
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn into_output(self) -> Bucket {
        self.output
    }
}

/// One numbered pipeline step.
///
/// Implementations are synchronous and run on a blocking thread. Logging goes
/// through [`crate::logging::correlator`] so lines land in the job's record.
pub trait StepFunction: Send + Sync {
    fn id(&self) -> StepId;

    /// Buckets this step reads. The first entry is the primary dependency.
    fn dependencies(&self) -> &'static [BucketKey];

    fn run(&self, ctx: &mut StepContext) -> Result<()>;
}

/// Resolves step identifiers to step functions.
pub struct StepRegistry {
    steps: HashMap<StepId, Arc<dyn StepFunction>>,
}

impl StepRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            steps: HashMap::new(),
        }
    }

    /// Register a step, replacing any existing one with the same id.
    pub fn register(&mut self, step: Arc<dyn StepFunction>) {
        self.steps.insert(step.id(), step);
    }

    pub fn get(&self, step: StepId) -> Result<Arc<dyn StepFunction>> {
        self.steps
            .get(&step)
            .cloned()
            .ok_or_else(|| Error::validation(format!("No step function registered for {}", step)))
    }

    pub fn contains(&self, step: StepId) -> bool {
        self.steps.contains_key(&step)
    }
}

impl Default for StepRegistry {
    /// Registry with every built-in step.
    fn default() -> Self {
        let mut registry = Self::empty();
        for step in steps::builtin_steps() {
            registry.register(step);
        }
        registry
    }
}
