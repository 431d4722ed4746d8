//! Database models.
//!
//! These map directly to the schema; JSON columns are decoded on demand.

pub mod flag;
pub mod job;

pub use flag::*;
pub use job::*;
