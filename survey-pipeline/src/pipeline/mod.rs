//! Pipeline execution: step contract, runner, job ledger, flags and the orchestrator.

pub mod context;
pub mod flags;
pub mod ledger;
pub mod orchestrator;
pub mod step;

pub use context::PipelineContext;
pub use flags::{PipelineFlags, PipelineStateView};
pub use ledger::{JobLedger, JobView, Transition};
pub use orchestrator::{DataFilesView, INTERRUPTED_REASON, Orchestrator};
pub use step::{StepContext, StepFunction, StepRegistry};
