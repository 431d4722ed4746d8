//! survey-pipeline library crate.
//!
//! Orchestration core for the survey/exam spreadsheet pipeline: the in-memory
//! state store, step functions, the job ledger and the single-flight
//! orchestrator. Exposed as a library for the CLI and for integration tests.

pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod state;
pub mod steps;
pub mod upload;
pub mod utils;
pub mod workbook;

pub use error::{Error, Result};
