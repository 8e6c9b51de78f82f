//! Command line parsing.

use clap::{Parser, Subcommand};

use crate::app_mode::RunMode;

#[derive(Debug, Parser)]
#[command(name = "upgradarr", version, about = "Queue and dispatch quality upgrade searches")]
pub struct Cli {
    /// Run a single cycle and exit instead of following the schedule
    #[arg(long, global = true)]
    pub once: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the queue size of every configured provider
    Status,

    /// Run one upgrade cycle in this process (spawned by the job runner)
    #[command(hide = true)]
    Cycle,
}

impl Cli {
    /// Run mode requested on the command line, if any
    pub fn run_mode_override(&self) -> Option<RunMode> {
        self.once.then_some(RunMode::Once)
    }
}
