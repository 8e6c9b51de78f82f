//! Background job scheduling

pub mod runner;

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

pub use runner::{JobCommand, JobRun, JobRunner, JobStatus};

/// Initialize and start the job scheduler.
///
/// `schedule` is a six-field cron expression (seconds first). Each tick hands
/// the cycle to `runner`, which skips the tick if the previous cycle is still
/// running.
pub async fn start_scheduler(runner: Arc<JobRunner>, schedule: &str) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let upgrade_job = Job::new_async(schedule, move |_uuid, _l| {
        let runner = runner.clone();
        Box::pin(async move {
            info!("Running upgrade cycle");
            let run = runner.run_job().await;
            if !run.status.is_success() && run.status != JobStatus::Skipped {
                error!(job_id = %run.id, status = ?run.status, "Upgrade cycle did not complete");
            }
        })
    })?;
    scheduler.add(upgrade_job).await?;

    scheduler.start().await?;

    info!(schedule = %schedule, "Job scheduler started");
    Ok(scheduler)
}

/// Run a single cycle immediately
pub async fn run_once(runner: &JobRunner) -> JobRun {
    info!("Running single upgrade cycle");
    runner.run_job().await
}
