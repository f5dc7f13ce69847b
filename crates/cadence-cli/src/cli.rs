use cadence_scheduler::{Frequency, ProjectId};
use clap::{Args, Parser, Subcommand};

/// Cadence: run periodic batch work over every period that is still due.
#[derive(Debug, Parser)]
#[command(name = "cadence", version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to $CADENCE_CONFIG, then ~/.cadence/cadence.toml).
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// SQLite database path; overrides `database.path`.
    #[arg(long, global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage registered tasks.
    #[command(subcommand)]
    Task(TaskCommand),
    /// Manage dependencies between tasks.
    #[command(subcommand)]
    Dep(DepCommand),
    /// Show the execution ledger of a task.
    Ledger(LedgerArgs),
    /// Run a command for every due period of a task.
    Run(RunArgs),
}

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// Register a new task.
    Register(RegisterArgs),
    /// List registered tasks.
    List,
}

#[derive(Debug, Args)]
pub struct RegisterArgs {
    pub name: String,

    /// hourly, daily, weekly, monthly or quarterly.
    #[arg(long, short = 'f', value_parser = parse_frequency)]
    pub frequency: Frequency,

    /// Period length in units of the frequency.
    #[arg(long, default_value_t = 1)]
    pub interval: u32,

    /// Track progress separately per project.
    #[arg(long)]
    pub project_scoped: bool,

    /// First active slot: hour of day (hourly) or weekday, Sunday = 0 (daily).
    #[arg(long, default_value_t = 0)]
    pub skip_start: u32,

    /// Last active slot; defaults to the end of the range.
    #[arg(long)]
    pub skip_end: Option<u32>,

    /// Run only in the first active slot.
    #[arg(long)]
    pub no_recurrence: bool,

    /// Minutes to wait after a period starts before it becomes due.
    #[arg(long, default_value_t = 0)]
    pub offset_minutes: i64,
}

#[derive(Debug, Subcommand)]
pub enum DepCommand {
    /// Make TASK wait for UPSTREAM.
    Add(DepArgs),
    /// Remove the dependency of TASK on UPSTREAM.
    Remove(DepArgs),
}

#[derive(Debug, Args)]
pub struct DepArgs {
    pub task: String,
    pub upstream: String,

    /// Periods of TASK's frequency to shift the checked period by.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub offset: i32,
}

#[derive(Debug, Args)]
pub struct LedgerArgs {
    pub task: String,

    /// Project to inspect; ignored for global tasks.
    #[arg(long, default_value_t = 0)]
    pub project: ProjectId,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    pub task: String,

    /// Periods to look back; defaults to `scheduler.default_lookback`.
    #[arg(long)]
    pub lookback: Option<u32>,

    /// Project ids to run (comma-separated). Required for project-scoped tasks.
    #[arg(long, value_delimiter = ',')]
    pub projects: Vec<ProjectId>,

    /// Extra KEY=VALUE parameter, exported as CADENCE_PARAM_<KEY>.
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Work timeout in seconds; defaults to `scheduler.work_timeout_secs`.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Command executed once per due period.
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

fn parse_frequency(s: &str) -> Result<Frequency, String> {
    s.parse().map_err(|e: cadence_scheduler::SchedulerError| e.to_string())
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    if key.is_empty() {
        return Err(format!("empty key in {s:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}
