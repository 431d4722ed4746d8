mod cli;

use anyhow::{Context, bail};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use survey_pipeline::config::AppConfig;
use survey_pipeline::database::{self, models::JobStatus};
use survey_pipeline::domain::StepId;
use survey_pipeline::logging;
use survey_pipeline::pipeline::{Orchestrator, PipelineContext};

use crate::cli::{Args, Commands};

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut config = AppConfig::from_env();
    if let Some(path) = args.settings {
        config.settings_path = Some(path);
    }

    let _log_guard = logging::init_logging(&config.log_dir)?;
    match logging::cleanup_old_logs(&config.log_dir).await {
        Ok(0) => {}
        Ok(removed) => info!(removed, "Removed expired log files"),
        Err(e) => warn!(error = %e, "Log cleanup failed"),
    }

    let settings = config
        .load_settings()
        .context("loading pipeline settings")?;

    // Initialize database
    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let ctx = PipelineContext::new(&config.data_dir, &config.output_dir, settings);
    let orchestrator = Orchestrator::new(ctx, pool);
    if args.command.admits_work() {
        let recovered = orchestrator.recover().await?;
        if recovered > 0 {
            warn!(recovered, "Marked jobs from an earlier process as failed");
        }
    }

    execute(&orchestrator, args.command).await
}

async fn execute(orchestrator: &Orchestrator, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Upload { archive } => {
            let files = orchestrator.upload(&archive).await?;
            info!(files = files.all.len(), "Dataset uploaded");
            print_json(&files.file_names())
        }
        Commands::Files => print_json(&orchestrator.data_files().await?),
        Commands::Run { resume, steps } => run_steps(orchestrator, &steps, resume).await,
        Commands::All => {
            let steps: Vec<String> = StepId::ALL.iter().map(|s| s.to_string()).collect();
            run_steps(orchestrator, &steps, false).await
        }
        Commands::Status { job_id } => match orchestrator.status(&job_id).await? {
            Some(job) => print_json(&job),
            None => bail!("job {} not found", job_id),
        },
        Commands::State => print_json(&orchestrator.state().await),
        Commands::Preview { step } => {
            // Previews live in memory; a fresh process rebuilds them from the snapshot.
            if orchestrator.preview(&step)?.is_none() {
                orchestrator.restore(&step).await?;
            }
            match orchestrator.preview(&step)? {
                Some(preview) => print_json(&preview),
                None => bail!("{} has not produced output yet", step),
            }
        }
        Commands::Output { step } => print_json(&orchestrator.output(&step)?),
        Commands::Jobs { limit } => print_json(&orchestrator.jobs(limit).await?),
    }
}

async fn run_steps(orchestrator: &Orchestrator, steps: &[String], resume: bool) -> anyhow::Result<()> {
    if resume && let Some(first) = steps.first() {
        let restored = orchestrator.resume_before(first).await?;
        info!(restored = ?restored, "Restored earlier steps from snapshots");
    }

    for step in steps {
        let job = orchestrator.run(step).await?;
        print_json(&job)?;
        if job.status == JobStatus::Failed {
            bail!(
                "{} failed: {}",
                step,
                job.error_message.as_deref().unwrap_or("unknown error")
            );
        }
    }
    Ok(())
}
