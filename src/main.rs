//! Upgradarr - scheduled quality-upgrade searches
//!
//! The long-running process only schedules. Every cycle runs in a child
//! process (`upgradarr cycle`) under the job runner's timeout.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use upgradarr::app_mode::RunMode;
use upgradarr::cli::{Cli, Command};
use upgradarr::config::Config;
use upgradarr::db::Database;
use upgradarr::jobs::{self, JobCommand, JobRunner};
use upgradarr::logging::{self, LogFormat};
use upgradarr::services::UpgradeService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Cycle) => run_cycle().await,
        Some(Command::Status) => show_status().await,
        None => {
            serve(cli.run_mode_override()).await;
            Ok(())
        }
    }
}

/// Schedule cycles (or run one) until done. Failures are logged, never
/// returned, so the process exits cleanly.
async fn serve(run_mode_override: Option<RunMode>) {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            logging::init(LogFormat::Json);
            error!(error = ?e, "Failed to load configuration");
            return;
        }
    };
    logging::init(config.log_format);

    let run_mode = run_mode_override.unwrap_or(config.run_mode);
    info!(
        run_mode = ?run_mode,
        providers = config.providers.len(),
        enabled = config.enabled_providers().count(),
        database = %config.database_url,
        "Starting Upgradarr"
    );

    let command = match JobCommand::current_exe_cycle() {
        Ok(command) => command,
        Err(e) => {
            error!(error = %e, "Failed to resolve executable path");
            return;
        }
    };
    let runner = Arc::new(
        JobRunner::new(command, config.job_timeout).with_limits(config.resource_limits),
    );

    match run_mode {
        RunMode::Once => {
            let run = jobs::run_once(&runner).await;
            info!(job_id = %run.id, status = ?run.status, "Single cycle done");
        }
        RunMode::Scheduled => {
            let mut scheduler = match jobs::start_scheduler(runner, &config.schedule).await {
                Ok(scheduler) => scheduler,
                Err(e) => {
                    error!(schedule = %config.schedule, error = %e, "Failed to start job scheduler");
                    return;
                }
            };

            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");

            if let Err(e) = scheduler.shutdown().await {
                error!(error = %e, "Job scheduler shutdown failed");
            }
        }
    }
}

/// Body of the `cycle` child process. A storage failure makes it exit non-zero.
async fn run_cycle() -> anyhow::Result<()> {
    logging::init_child();

    let config = Config::from_env().context("Failed to load configuration")?;
    let db = Database::connect(&config.database_url, config.database_max_connections).await?;
    let service = UpgradeService::new(db.clone(), config.http_timeout)?;

    let result = service.run_cycle(&config.providers).await;
    db.close().await;

    let summary = result.context("Upgrade cycle aborted")?;
    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        dispatched = summary.dispatched,
        "Cycle child exiting"
    );
    Ok(())
}

/// Print the queue size of every configured provider
async fn show_status() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let db = Database::connect(&config.database_url, config.database_max_connections).await?;
    let service = UpgradeService::new(db.clone(), config.http_timeout)?;

    let statuses = service.queue_status(&config.providers).await?;
    db.close().await;

    if statuses.is_empty() {
        println!("No providers configured (set PROVIDERS)");
    }
    for status in statuses {
        println!(
            "{:<20} {:>8} queued{}",
            status.provider,
            status.queued,
            if status.enabled { "" } else { " (disabled)" }
        );
    }

    Ok(())
}
