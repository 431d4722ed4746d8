//! Domain types shared by the state store, the steps and the orchestrator.

pub mod filter;
pub mod step;
pub mod table;

pub use filter::{FilterConfig, SchoolRange, apply_filter};
pub use step::{BucketKey, Stage, StepId};
pub use table::{Cell, Row, Table};
