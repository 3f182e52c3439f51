use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tn", about = concat!("tasknet v", env!("CARGO_PKG_VERSION"), " - one task network, four views"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Run against a different project directory
    #[arg(short = 'C', long = "project-dir", global = true)]
    pub project_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new tasknet project in the current directory
    Init(InitArgs),
    /// Show the hierarchical grid
    Grid(GridArgs),
    /// Collapse or expand a hierarchy code in the grid
    Collapse(CollapseArgs),
    /// Show the status board
    Board,
    /// Show timeline bars and links
    Timeline(TimelineArgs),
    /// Show the dependency network with schedule figures
    Network,
    /// Validate the task network
    Check,
    /// Create a task
    Add(AddArgs),
    /// Change task status
    Status(StatusArgs),
    /// Set one field of a task
    Edit(EditArgs),
    /// Add or remove dependencies
    Dep(DepCmd),
    /// Delete a task (dependents keep dangling edges)
    Rm(RmArgs),
    /// Run the scheduling pass and replace all tasks with its result
    Schedule,
    /// Replace the project's tasks with a JSON import batch
    Import(ImportArgs),
    /// Risk register
    Risk(RiskCmd),
}

// ---------------------------------------------------------------------------
// Init args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct InitArgs {
    /// Project name (default: inferred from directory name)
    #[arg(long)]
    pub name: Option<String>,
    /// Project id on the task service
    #[arg(long, default_value = "1")]
    pub id: i64,
}

// ---------------------------------------------------------------------------
// Read command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct GridArgs {
    /// Ignore collapse state and show every row
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct CollapseArgs {
    /// Hierarchy code to toggle, e.g. 1.2
    pub code: String,
}

#[derive(Args)]
pub struct TimelineArgs {
    /// Instant used for tasks without a planned start (RFC 3339, default: now)
    #[arg(long)]
    pub now: Option<String>,
}

// ---------------------------------------------------------------------------
// Write command args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct AddArgs {
    /// Hierarchy code, e.g. 1.2
    pub code: String,
    /// Task title
    pub title: String,
    /// task, milestone or summary
    #[arg(long)]
    pub kind: Option<String>,
    /// low, medium, high or critical
    #[arg(long)]
    pub priority: Option<String>,
    /// Initial status
    #[arg(long)]
    pub status: Option<String>,
    /// Duration in hours, or `PT#H#M#S`
    #[arg(long)]
    pub duration: Option<String>,
    /// Planned start (date or RFC 3339)
    #[arg(long)]
    pub start: Option<String>,
    /// Planned end (date or RFC 3339)
    #[arg(long)]
    pub end: Option<String>,
    /// Longer description
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Task ID
    pub id: i64,
    /// New status (not_started, in_progress, stalled, completed, cancelled)
    pub status: String,
}

#[derive(Args)]
pub struct EditArgs {
    /// Task ID
    pub id: i64,
    /// Field: title, description, kind, status, priority, code, start, end,
    /// actual_start, actual_end, duration
    pub field: String,
    /// New value; "-" clears a date
    #[arg(allow_hyphen_values = true)]
    pub value: String,
}

#[derive(Args)]
pub struct DepCmd {
    #[command(subcommand)]
    pub action: DepAction,
}

#[derive(Subcommand)]
pub enum DepAction {
    /// Make <owner> depend on <target>
    Add(DepAddArgs),
    /// Remove the edge from <owner> to <target>
    Rm(DepRmArgs),
}

#[derive(Args)]
pub struct DepAddArgs {
    /// Successor task ID
    pub owner: i64,
    /// Predecessor task ID
    pub target: i64,
    /// FS, SS, FF or SF
    #[arg(long, default_value = "FS")]
    pub relation: String,
    /// Lag in hours (may be negative)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub lag: f64,
}

#[derive(Args)]
pub struct DepRmArgs {
    /// Successor task ID
    pub owner: i64,
    /// Predecessor task ID
    pub target: i64,
}

#[derive(Args)]
pub struct RmArgs {
    /// Task ID
    pub id: i64,
}

#[derive(Args)]
pub struct ImportArgs {
    /// JSON file with {"title": ..., "rows": [...]}
    pub file: String,
}

// ---------------------------------------------------------------------------
// Risk args
// ---------------------------------------------------------------------------

#[derive(Args)]
pub struct RiskCmd {
    #[command(subcommand)]
    pub action: RiskAction,
}

#[derive(Subcommand)]
pub enum RiskAction {
    /// List the risk register
    List,
    /// Record a new risk
    Add(RiskAddArgs),
    /// Delete a risk
    Rm(RiskRmArgs),
}

#[derive(Args)]
pub struct RiskAddArgs {
    /// Risk title
    pub title: String,
    /// Likelihood (0-1 or 1-5)
    #[arg(long, default_value = "0")]
    pub probability: f64,
    /// Impact (1-5)
    #[arg(long, default_value = "0")]
    pub impact: f64,
    /// Related task ID
    #[arg(long)]
    pub task: Option<i64>,
    /// Mitigation plan
    #[arg(long)]
    pub mitigation: Option<String>,
    /// Longer description
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args)]
pub struct RiskRmArgs {
    /// Risk ID
    pub id: i64,
}
