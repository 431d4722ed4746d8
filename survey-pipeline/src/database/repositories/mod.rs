//! Repository layer for database access.

pub mod flag;
pub mod job;

pub use flag::*;
pub use job::*;
