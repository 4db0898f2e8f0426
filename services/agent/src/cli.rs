//! Command-line surface of the agent binary.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Which component this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum Task {
    /// Create the store schema.
    InitDatabase,
    /// Requests and planned-events pipelines.
    Calendar,
    /// Per-table retention enforcement.
    Cleaner,
    /// UDP liveness responder.
    Responder,
    /// HTTP control plane.
    Server,
    /// Hourly table-census snapshots.
    Stats,
    /// Run lifecycle manager.
    TestsManager,
    /// Internal: probe child process entry point.
    #[value(hide = true)]
    Probe,
}

#[derive(Debug, Parser)]
#[command(name = "netmon-agent", version, about = "Monitoring agent")]
pub struct Cli {
    /// Task to run in this process.
    #[arg(long, value_enum)]
    pub task: Task,

    /// Directory holding the config file, store, and log files.
    #[arg(long)]
    pub persistent: PathBuf,

    /// Probe name (probe task only).
    #[arg(long, hide = true)]
    pub probe_name: Option<String>,

    /// Run id (probe task only).
    #[arg(long, hide = true)]
    pub run_id: Option<i64>,
}
