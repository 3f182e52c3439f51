mod init;
pub use init::cmd_init;

use std::error::Error;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::cli::commands::*;
use crate::cli::init_logging;
use crate::cli::output::*;
use crate::gateway::{MutationGateway, MutationOutcome};
use crate::io::lock::FileLock;
use crate::io::project_io;
use crate::io::state::{self, UiState};
use crate::model::dependency::{Dependency, Relation};
use crate::model::project::Project;
use crate::model::risk::{RiskDraft, RiskId};
use crate::model::task::{Priority, TaskDraft, TaskField, TaskId, TaskKind, TaskPatch, TaskStatus};
use crate::model::wbs::HierarchyCode;
use crate::ops::check::check_tasks;
use crate::ops::import::{self, ImportBatch};
use crate::service::LocalService;
use crate::session::{Intent, Session};

type CmdResult = Result<(), Box<dyn Error>>;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let json = cli.json;
    let start = resolve_start(cli.project_dir.as_deref())?;

    match cli.command {
        // Init is handled before project discovery
        Commands::Init(args) => cmd_init(args, &start),
        command => {
            let root = project_io::discover_project(&start)?;
            let project = project_io::load_project(&root)?;
            init_logging(&project.config.log.level);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run(command, project, json))
        }
    }
}

async fn run(command: Commands, project: Project, json: bool) -> CmdResult {
    // Write commands hold the project lock for their whole run
    let _lock = if is_write(&command) {
        Some(FileLock::acquire_default(&project.dir)?)
    } else {
        None
    };
    let session = open_session(&project).await?;
    let width = project.config.ui.title_width;

    match command {
        Commands::Init(_) => Ok(()),

        // Read commands
        Commands::Grid(args) => cmd_grid(&session, args, width, json),
        Commands::Board => cmd_board(&session, width, json),
        Commands::Timeline(args) => cmd_timeline(&session, args, width, json),
        Commands::Network => cmd_network(&session, json),
        Commands::Check => cmd_check(&session, json),

        // Write commands
        Commands::Collapse(args) => cmd_collapse(&session, &project, args).await,
        Commands::Add(args) => cmd_add(&session, args, json).await,
        Commands::Status(args) => cmd_status(&session, args).await,
        Commands::Edit(args) => cmd_edit(&session, args).await,
        Commands::Dep(args) => cmd_dep(&session, args).await,
        Commands::Rm(args) => cmd_rm(&session, args).await,
        Commands::Schedule => cmd_schedule(&session, json).await,
        Commands::Import(args) => cmd_import(&session, args, json).await,
        Commands::Risk(args) => cmd_risk(&session, args, width, json).await,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_start(project_dir: Option<&str>) -> Result<PathBuf, Box<dyn Error>> {
    match project_dir {
        Some(dir) => Ok(std::fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?),
        None => Ok(std::env::current_dir()?),
    }
}

fn is_write(command: &Commands) -> bool {
    !matches!(
        command,
        Commands::Grid(_) | Commands::Board | Commands::Timeline(_) | Commands::Network | Commands::Check
    ) && !matches!(
        command,
        Commands::Risk(RiskCmd {
            action: RiskAction::List
        })
    )
}

async fn open_session(project: &Project) -> Result<Session<LocalService>, Box<dyn Error>> {
    let service = LocalService::open(project.id(), &project.snapshot_path())?;
    let gateway = MutationGateway::new(project.id(), service);
    gateway.open().await?;
    let collapsed = state::read_ui_state(&project.dir)
        .map(|s| s.collapsed)
        .unwrap_or_default();
    debug!(collapsed = collapsed.len(), "session opened");
    Ok(Session::new(gateway, collapsed))
}

fn print_json<T: serde::Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

fn parse_status(s: &str) -> Result<TaskStatus, String> {
    TaskStatus::parse_loose(s).ok_or_else(|| {
        format!(
            "unknown status '{}' (expected: not_started, in_progress, stalled, completed, cancelled)",
            s
        )
    })
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    Priority::parse_loose(s)
        .ok_or_else(|| format!("unknown priority '{}' (expected: low, medium, high, critical)", s))
}

fn parse_instant(field: &str, s: &str) -> Result<chrono::DateTime<Utc>, String> {
    import::parse_date(s).ok_or_else(|| format!("could not parse {} date '{}'", field, s))
}

/// A clearable date: "-" or an empty value clears it.
fn parse_optional_instant(field: &str, s: &str) -> Result<Option<chrono::DateTime<Utc>>, String> {
    let s = s.trim();
    if s.is_empty() || s == "-" {
        Ok(None)
    } else {
        parse_instant(field, s).map(Some)
    }
}

/// Build a single-field patch from command-line text.
fn patch_for(field: TaskField, value: &str) -> Result<TaskPatch, String> {
    let mut patch = TaskPatch::default();
    match field {
        TaskField::Title => patch.title = Some(value.to_string()),
        TaskField::Description => patch.description = Some(value.to_string()),
        TaskField::Kind => patch.kind = Some(TaskKind::parse_loose(value)),
        TaskField::Status => patch.status = Some(parse_status(value)?),
        TaskField::Priority => patch.priority = Some(parse_priority(value)?),
        TaskField::HierarchyCode => {
            patch.hierarchy_code = Some(HierarchyCode::parse(value).map_err(|e| e.to_string())?)
        }
        TaskField::PlannedStart => patch.planned_start = Some(parse_optional_instant("start", value)?),
        TaskField::PlannedEnd => patch.planned_end = Some(parse_optional_instant("end", value)?),
        TaskField::ActualStart => {
            patch.actual_start = Some(parse_optional_instant("actual_start", value)?)
        }
        TaskField::ActualEnd => patch.actual_end = Some(parse_optional_instant("actual_end", value)?),
        TaskField::Duration => {
            let hours = import::parse_duration(value)
                .ok_or_else(|| format!("could not parse duration '{}'", value))?;
            patch.duration = Some(hours);
        }
        TaskField::Dependencies => {
            return Err("dependencies are edited with `tn dep add|rm`".to_string());
        }
    }
    Ok(patch)
}

fn describe(outcome: MutationOutcome, id: TaskId, done: &str) -> String {
    match outcome {
        MutationOutcome::RemovedRemotely => format!("{} no longer exists on the server; removed", id),
        MutationOutcome::Superseded => format!("{}: superseded by a newer change", id),
        MutationOutcome::Local => format!("{}: nothing to change", id),
        _ => format!("{} {}", id, done),
    }
}

// ---------------------------------------------------------------------------
// Read command handlers
// ---------------------------------------------------------------------------

fn cmd_grid(session: &Session<LocalService>, args: GridArgs, width: usize, json: bool) -> CmdResult {
    let rows = session.grid(args.all);
    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("no tasks");
    }
    print_lines(format_grid(&rows, width));
    Ok(())
}

fn cmd_board(session: &Session<LocalService>, width: usize, json: bool) -> CmdResult {
    let lanes = session.board();
    if json {
        return print_json(&lanes);
    }
    print_lines(format_board(&lanes, width));
    Ok(())
}

fn cmd_timeline(
    session: &Session<LocalService>,
    args: TimelineArgs,
    width: usize,
    json: bool,
) -> CmdResult {
    let now = match args.now.as_deref() {
        Some(s) => parse_instant("--now", s)?,
        None => Utc::now(),
    };
    let timeline = session.timeline(now);
    if json {
        return print_json(&timeline);
    }
    print_lines(format_timeline(&timeline, width));
    Ok(())
}

fn cmd_network(session: &Session<LocalService>, json: bool) -> CmdResult {
    let network = session.network();
    if json {
        return print_json(&network);
    }
    print_lines(format_network(&network));
    Ok(())
}

fn cmd_check(session: &Session<LocalService>, json: bool) -> CmdResult {
    let result = check_tasks(&session.gateway().tasks());
    if json {
        return print_json(&result);
    }
    print_lines(format_check(&result));
    if result.valid {
        println!("✓ task network is valid");
    } else {
        println!("✗ task network has errors");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Write command handlers
// ---------------------------------------------------------------------------

async fn cmd_collapse(session: &Session<LocalService>, project: &Project, args: CollapseArgs) -> CmdResult {
    let code = HierarchyCode::parse(&args.code)?;
    session
        .dispatch(Intent::ToggleCollapse { code: code.clone() })
        .await?;
    let collapsed = session.collapsed();
    let now_collapsed = collapsed.contains(&code);
    state::write_ui_state(&project.dir, &UiState { collapsed })?;
    if now_collapsed {
        println!("collapsed {}", code);
    } else {
        println!("expanded {}", code);
    }
    Ok(())
}

async fn cmd_add(session: &Session<LocalService>, args: AddArgs, json: bool) -> CmdResult {
    let mut draft = TaskDraft::new(HierarchyCode::parse(&args.code)?, args.title);
    if let Some(kind) = &args.kind {
        draft.kind = TaskKind::parse_loose(kind);
    }
    if let Some(priority) = &args.priority {
        draft.priority = parse_priority(priority)?;
    }
    if let Some(status) = &args.status {
        draft.status = parse_status(status)?;
    }
    if let Some(duration) = &args.duration {
        draft.duration = import::parse_duration(duration)
            .ok_or_else(|| format!("could not parse duration '{}'", duration))?;
    }
    if let Some(start) = &args.start {
        draft.planned_start = Some(parse_instant("start", start)?);
    }
    if let Some(end) = &args.end {
        draft.planned_end = Some(parse_instant("end", end)?);
    }
    if let Some(description) = args.description {
        draft.description = description;
    }

    let outcome = session.dispatch(Intent::CreateTask { draft }).await?;
    let MutationOutcome::Created(id) = outcome else {
        return Err(format!("unexpected outcome: {:?}", outcome).into());
    };
    if json && let Some(task) = session.gateway().task(id) {
        return print_json(&task);
    }
    println!("created {}", id);
    Ok(())
}

async fn cmd_status(session: &Session<LocalService>, args: StatusArgs) -> CmdResult {
    let id = TaskId(args.id);
    let status = parse_status(&args.status)?;
    let label = status.to_string();
    let outcome = session.dispatch(Intent::SetStatus { id, status }).await?;
    println!("{}", describe(outcome, id, &format!("→ {}", label)));
    Ok(())
}

async fn cmd_edit(session: &Session<LocalService>, args: EditArgs) -> CmdResult {
    let id = TaskId(args.id);
    let field: TaskField = args.field.parse()?;
    let patch = patch_for(field, &args.value)?;
    let outcome = session.dispatch(Intent::EditField { id, patch }).await?;
    println!("{}", describe(outcome, id, &format!("{} updated", field)));
    Ok(())
}

async fn cmd_dep(session: &Session<LocalService>, args: DepCmd) -> CmdResult {
    match args.action {
        DepAction::Add(a) => {
            let relation = Relation::from_code(&a.relation)
                .ok_or_else(|| format!("unknown relation '{}' (expected: FS, SS, FF, SF)", a.relation))?;
            let owner = TaskId(a.owner);
            let edge = Dependency::on(TaskId(a.target))
                .with_relation(relation)
                .with_lag(a.lag);
            let outcome = session.dispatch(Intent::AddDependency { owner, edge }).await?;
            println!("{}", describe(outcome, owner, &format!("depends on {}", a.target)));
        }
        DepAction::Rm(a) => {
            let owner = TaskId(a.owner);
            let target = TaskId(a.target);
            let outcome = session
                .dispatch(Intent::RemoveDependency { owner, target })
                .await?;
            println!("{}", describe(outcome, owner, &format!("no longer depends on {}", target)));
        }
    }
    Ok(())
}

async fn cmd_rm(session: &Session<LocalService>, args: RmArgs) -> CmdResult {
    let id = TaskId(args.id);
    let dependents: Vec<TaskId> = session.gateway().with_store(|store| {
        store
            .all()
            .filter(|t| t.dependency_on(id).is_some())
            .map(|t| t.id)
            .collect()
    });
    let outcome = session.dispatch(Intent::DeleteTask { id }).await?;
    println!("{}", describe(outcome, id, "deleted"));
    if !dependents.is_empty() {
        let ids: Vec<String> = dependents.iter().map(|d| d.to_string()).collect();
        eprintln!("note: tasks {} still depend on {} (dangling)", ids.join(", "), id);
    }
    Ok(())
}

async fn cmd_schedule(session: &Session<LocalService>, json: bool) -> CmdResult {
    let outcome = session.dispatch(Intent::RequestRecompute).await?;
    if json {
        return print_json(&session.gateway().tasks());
    }
    match outcome {
        MutationOutcome::Replaced(n) => println!("scheduled {} tasks", n),
        other => println!("scheduling pass: {:?}", other),
    }
    Ok(())
}

async fn cmd_import(session: &Session<LocalService>, args: ImportArgs, json: bool) -> CmdResult {
    let path = Path::new(&args.file);
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read {}: {}", path.display(), e))?;
    let batch: ImportBatch = serde_json::from_str(&text)
        .map_err(|e| format!("could not parse {}: {}", path.display(), e))?;

    let imported = session.gateway().import(&batch).await?;
    if json {
        return print_json(&imported);
    }
    println!("imported {} tasks", imported.tasks.len());
    for line in format_import_warnings(&imported.warnings) {
        eprintln!("{}", line);
    }
    Ok(())
}

async fn cmd_risk(session: &Session<LocalService>, args: RiskCmd, width: usize, json: bool) -> CmdResult {
    let gateway = session.gateway();
    match args.action {
        RiskAction::List => {
            let risks = gateway.load_risks().await?;
            if json {
                return print_json(&risks);
            }
            print_lines(format_risks(&risks, width));
        }
        RiskAction::Add(a) => {
            let draft = RiskDraft {
                title: a.title,
                description: a.description.unwrap_or_default(),
                probability: a.probability,
                impact: a.impact,
                mitigation_plan: a.mitigation,
                task_id: a.task.map(TaskId),
            };
            let risk = gateway.create_risk(&draft).await?;
            if json {
                return print_json(&risk);
            }
            println!("created risk {}", risk.id);
        }
        RiskAction::Rm(a) => {
            gateway.delete_risk(RiskId(a.id)).await?;
            println!("deleted risk {}", a.id);
        }
    }
    Ok(())
}
