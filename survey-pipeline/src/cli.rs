use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Survey/exam spreadsheet pipeline.
#[derive(Parser, Debug)]
#[command(name = "survey-pipeline", version, about)]
pub struct Args {
    /// JSON file with pipeline settings (exam grades, schools, filter)
    #[arg(long, global = true, env = "PIPELINE_SETTINGS")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replace the dataset with a zip archive and reset the session
    Upload { archive: PathBuf },

    /// List the files in the data directory
    Files,

    /// Run steps in order, waiting for each; stops at the first failure
    Run {
        /// Restore earlier steps from their snapshots first
        #[arg(long)]
        resume: bool,

        /// Step identifiers, e.g. participation-0 performance-2
        #[arg(required = true)]
        steps: Vec<String>,
    },

    /// Run participation-0 and performance-0 through performance-5
    All,

    /// Show a job
    Status { job_id: String },

    /// Show per-stage completion flags
    State,

    /// Show the latest preview of a step's output
    Preview { step: String },

    /// List a step's snapshot files
    Output { step: String },

    /// List recent jobs
    Jobs {
        #[arg(long, default_value_t = 20)]
        limit: i32,
    },
}

impl Commands {
    /// Whether the command may start jobs or replace the dataset.
    pub fn admits_work(&self) -> bool {
        matches!(self, Self::Upload { .. } | Self::Run { .. } | Self::All)
    }
}
