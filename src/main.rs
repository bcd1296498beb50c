use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskctl::guard::HookPayload;
use taskctl::models::*;
use taskctl::{mcp, render, Workspace};

#[derive(Parser)]
#[command(name = "taskctl")]
#[command(about = "Dependency-aware epic and task tracking with review-gated completion")]
#[command(version)]
struct Cli {
    /// Project directory containing the .tasks workspace (default: current directory)
    #[arg(long, global = true, env = "TASKCTL_ROOT")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the .tasks workspace (idempotent)
    Init,
    /// Report whether a workspace exists here
    Detect {
        #[arg(long)]
        json: bool,
    },
    /// Counts of epics and tasks by status
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Manage epics
    #[command(subcommand)]
    Epic(EpicCommand),
    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommand),
    /// Dependency graph checks
    #[command(subcommand)]
    Graph(GraphCommand),
    /// What to work on next
    Next {
        #[arg(long)]
        json: bool,
    },
    /// Show an epic (with its task tree) or a task
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Print the spec body of an epic or task
    Cat { id: String },
    /// Review receipts and gating
    #[command(subcommand)]
    Review(ReviewCommand),
    /// Pitfalls, conventions and decisions
    #[command(subcommand)]
    Memory(MemoryCommand),
    /// Workspace configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Check whether a file mutation is allowed for the current task
    Guard {
        /// Current task (default: $TASKCTL_TASK)
        #[arg(long, env = "TASKCTL_TASK")]
        task: Option<String>,
        /// Read a PreToolUse hook payload from stdin; non-mutating tools pass
        #[arg(long)]
        hook: bool,
        #[arg(long)]
        json: bool,
    },
    /// Start MCP server via stdio
    Mcp,
}

#[derive(Subcommand)]
enum EpicCommand {
    /// Create an epic, printing its id
    Create {
        #[arg(required = true)]
        title: Vec<String>,
    },
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        json: bool,
    },
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    Cat { id: String },
    /// Replace the spec body from a file or stdin
    SetSpec {
        id: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    SetStatus { id: String, status: String },
}

#[derive(Subcommand)]
enum TaskCommand {
    /// Create a task in an epic, printing its id
    Create {
        epic: String,
        #[arg(required = true)]
        title: Vec<String>,
        /// Comma-separated ids of tasks this one depends on
        #[arg(long, value_delimiter = ',')]
        deps: Vec<String>,
    },
    List {
        #[arg(long)]
        epic: Option<String>,
        /// pending, blocked, in_progress, done or cancelled
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        json: bool,
    },
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    Cat { id: String },
    SetSpec {
        id: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    Start { id: String },
    Done {
        id: String,
        #[arg(long)]
        summary: String,
    },
    Cancel { id: String },
    SetStatus {
        id: String,
        status: String,
        #[arg(long)]
        summary: Option<String>,
    },
    /// Replace the dependency set; no ids clears it
    SetDepends { id: String, deps: Vec<String> },
    AddDep { id: String, on: String },
    RmDep { id: String, on: String },
    /// Ready task ids, one per line
    Ready {
        #[arg(long)]
        epic: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum GraphCommand {
    /// Verify the dependency graph has no cycles
    Check,
}

#[derive(Subcommand)]
enum ReviewCommand {
    /// Enable review gating
    Init,
    Log {
        task: String,
        #[arg(long)]
        verdict: String,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long)]
        reviewer: Option<String>,
    },
    Show {
        task: String,
        #[arg(long)]
        iteration: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    List {
        task: String,
        #[arg(long)]
        json: bool,
    },
    Count { task: String },
}

#[derive(Subcommand)]
enum MemoryCommand {
    /// Enable the memory ledger
    Init,
    Add {
        #[arg(long = "type")]
        category: String,
        #[arg(required = true)]
        text: Vec<String>,
    },
    List {
        #[arg(long = "type")]
        category: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    Get { key: String },
    Set { key: String, value: String },
    List,
}

/// Logs always go to stderr; stdout carries data (and the MCP protocol).
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "taskctl=warn".into()),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_body(file: Option<PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut body = String::new();
            std::io::stdin().read_to_string(&mut body)?;
            Ok(body)
        }
    }
}

fn title(words: Vec<String>) -> String {
    words.join(" ")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<taskctl::Error>()
                .map_or(1, taskctl::Error::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let project = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Commands::Init => {
            let (ws, created) = Workspace::init(&project)?;
            let dir = ws.store().dir().display().to_string();
            if created {
                eprintln!("initialized {dir}");
            } else {
                eprintln!("{dir} already initialized");
            }
        }
        Commands::Detect { json } => {
            let detection = Workspace::detect(&project);
            if json {
                print_json(&detection)?;
            } else if detection.found {
                println!("{}", detection.path.display());
            } else {
                eprintln!("no workspace at {}", detection.path.display());
            }
        }
        command => {
            let ws = Workspace::open(&project)?;
            run_in_workspace(ws, command).await?;
        }
    }
    Ok(())
}

async fn run_in_workspace(ws: Workspace, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init | Commands::Detect { .. } => {}
        Commands::Status { json } => {
            let report = ws.status()?;
            if json {
                print_json(&report)?;
            } else {
                print!("{}", render::status(&report));
            }
        }
        Commands::Epic(cmd) => run_epic(&ws, cmd)?,
        Commands::Task(cmd) => run_task(&ws, cmd)?,
        Commands::Graph(GraphCommand::Check) => {
            let nodes = ws.check_graph()?;
            eprintln!("ok: {nodes} tasks, no cycles");
        }
        Commands::Next { json } => {
            let action = ws.next()?;
            if json {
                print_json(&action)?;
            } else {
                println!("{}", render::next_action(&action));
            }
        }
        Commands::Show { id, json } => match id.parse::<EntityId>()? {
            EntityId::Epic(id) => run_epic(&ws, EpicCommand::Show { id: id.to_string(), json })?,
            EntityId::Task(id) => run_task(&ws, TaskCommand::Show { id: id.to_string(), json })?,
        },
        Commands::Cat { id } => print!("{}", ws.read_spec(&id.parse()?)?),
        Commands::Review(cmd) => run_review(&ws, cmd)?,
        Commands::Memory(cmd) => run_memory(&ws, cmd)?,
        Commands::Config(cmd) => run_config(&ws, cmd)?,
        Commands::Guard { task, hook, json } => run_guard(&ws, task, hook, json)?,
        Commands::Mcp => mcp::run_stdio_server(ws).await?,
    }
    Ok(())
}

fn run_epic(ws: &Workspace, cmd: EpicCommand) -> anyhow::Result<()> {
    match cmd {
        EpicCommand::Create { title: words } => {
            let epic = ws.create_epic(&title(words))?;
            println!("{}", epic.id);
        }
        EpicCommand::List { status, json } => {
            let status = status.map(|s| s.parse::<EpicStatus>()).transpose()?;
            let epics = ws.list_epics(status)?;
            if json {
                print_json(&epics)?;
            } else {
                for summary in &epics {
                    println!("{}", render::epic_line(summary));
                }
            }
        }
        EpicCommand::Show { id, json } => {
            let detail = ws.show_epic(&id.parse()?)?;
            if json {
                print_json(&detail)?;
            } else {
                print!("{}", render::epic_tree(&detail));
            }
        }
        EpicCommand::Cat { id } => {
            print!("{}", ws.read_spec(&EntityId::Epic(id.parse()?))?);
        }
        EpicCommand::SetSpec { id, file } => {
            let id = EntityId::Epic(id.parse()?);
            ws.write_spec(&id, &read_body(file)?)?;
            eprintln!("updated spec of {id}");
        }
        EpicCommand::SetStatus { id, status } => {
            let epic = ws.set_epic_status(&id.parse()?, status.parse()?)?;
            eprintln!("{} is now {}", epic.id, epic.status);
        }
    }
    Ok(())
}

fn run_task(ws: &Workspace, cmd: TaskCommand) -> anyhow::Result<()> {
    match cmd {
        TaskCommand::Create {
            epic,
            title: words,
            deps,
        } => {
            let deps = parse_task_ids(&deps)?;
            let task = ws.create_task(&epic.parse()?, &title(words), &deps)?;
            println!("{}", task.id);
        }
        TaskCommand::List { epic, status, json } => {
            let filter = TaskFilter {
                epic: epic.map(|e| e.parse()).transpose()?,
                status: status.map(|s| s.parse()).transpose()?,
            };
            let tasks = ws.list_tasks(&filter)?;
            if json {
                print_json(&tasks)?;
            } else {
                for view in &tasks {
                    println!("{}", render::task_line(view));
                }
            }
        }
        TaskCommand::Show { id, json } => {
            let view = ws.task(&id.parse()?)?;
            if json {
                print_json(&view)?;
            } else {
                print!("{}", render::task_detail(&view));
            }
        }
        TaskCommand::Cat { id } => {
            print!("{}", ws.read_spec(&EntityId::Task(id.parse()?))?);
        }
        TaskCommand::SetSpec { id, file } => {
            let id = EntityId::Task(id.parse()?);
            ws.write_spec(&id, &read_body(file)?)?;
            eprintln!("updated spec of {id}");
        }
        TaskCommand::Start { id } => {
            let task = ws.start_task(&id.parse()?)?;
            eprintln!("{} started", task.id);
        }
        TaskCommand::Done { id, summary } => {
            let task = ws.complete_task(&id.parse()?, &summary)?;
            eprintln!("{} done", task.id);
        }
        TaskCommand::Cancel { id } => {
            let task = ws.cancel_task(&id.parse()?)?;
            eprintln!("{} cancelled", task.id);
        }
        TaskCommand::SetStatus {
            id,
            status,
            summary,
        } => {
            let task = ws.set_task_status(&id.parse()?, &status, summary.as_deref())?;
            eprintln!("{} is now {}", task.id, task.status);
        }
        TaskCommand::SetDepends { id, deps } => {
            let deps = parse_task_ids(&deps)?;
            let task = ws.set_dependencies(&id.parse()?, &deps)?;
            eprintln!("{} depends on {} task(s)", task.id, task.depends_on.len());
        }
        TaskCommand::AddDep { id, on } => {
            let task = ws.add_dependency(&id.parse()?, &on.parse()?)?;
            eprintln!("{} depends on {} task(s)", task.id, task.depends_on.len());
        }
        TaskCommand::RmDep { id, on } => {
            let task = ws.remove_dependency(&id.parse()?, &on.parse()?)?;
            eprintln!("{} depends on {} task(s)", task.id, task.depends_on.len());
        }
        TaskCommand::Ready { epic, json } => {
            let epic: Option<EpicId> = epic.map(|e| e.parse()).transpose()?;
            let ready = ws.ready(epic.as_ref())?;
            if json {
                print_json(&ready)?;
            } else {
                for view in &ready {
                    println!("{}", view.task.id);
                }
            }
        }
    }
    Ok(())
}

fn run_review(ws: &Workspace, cmd: ReviewCommand) -> anyhow::Result<()> {
    match cmd {
        ReviewCommand::Init => {
            let config = ws.review_init()?;
            eprintln!(
                "review gating enabled (maxIterations {})",
                config.review.max_iterations
            );
        }
        ReviewCommand::Log {
            task,
            verdict,
            notes,
            reviewer,
        } => {
            let input = ReviewInput {
                verdict: verdict.parse()?,
                reviewer,
                notes,
            };
            let receipt = ws.log_review(&task.parse()?, input)?;
            print!("{}", render::receipt(&receipt));
            if receipt.forced {
                eprintln!(
                    "review iterations exhausted: recorded as MAJOR_RETHINK; rethink the approach"
                );
            }
            if receipt.verdict == Verdict::Ship && ws.config()?.memory.enabled {
                eprintln!("hint: capture learnings with `taskctl memory add --type <pitfall|convention|decision> ...`");
            }
        }
        ReviewCommand::Show {
            task,
            iteration,
            json,
        } => {
            let receipt = ws.review(&task.parse()?, iteration)?;
            if json {
                print_json(&receipt)?;
            } else {
                print!("{}", render::receipt(&receipt));
            }
        }
        ReviewCommand::List { task, json } => {
            let receipts = ws.reviews(&task.parse()?)?;
            if json {
                print_json(&receipts)?;
            } else {
                for receipt in &receipts {
                    print!("{}", render::receipt(receipt));
                }
            }
        }
        ReviewCommand::Count { task } => println!("{}", ws.review_count(&task.parse()?)?),
    }
    Ok(())
}

fn run_memory(ws: &Workspace, cmd: MemoryCommand) -> anyhow::Result<()> {
    match cmd {
        MemoryCommand::Init => {
            ws.memory_init()?;
            eprintln!("memory enabled");
        }
        MemoryCommand::Add { category, text } => {
            let entry = ws.add_memory(category.parse()?, &text.join(" "))?;
            eprintln!("remembered {}", entry.category);
        }
        MemoryCommand::List { category, json } => {
            let category = category.map(|c| c.parse()).transpose()?;
            let entries = ws.list_memory(category)?;
            if json {
                print_json(&entries)?;
            } else {
                for entry in &entries {
                    println!("{}", render::memory_line(entry));
                }
            }
        }
    }
    Ok(())
}

fn run_config(ws: &Workspace, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Get { key } => println!("{}", ws.config_get(&key)?),
        ConfigCommand::Set { key, value } => {
            ws.config_set(&key, &value)?;
            eprintln!("{key} = {value}");
        }
        ConfigCommand::List => {
            for (key, value) in ws.config()?.entries() {
                println!("{key} = {value}");
            }
        }
    }
    Ok(())
}

fn run_guard(ws: &Workspace, task: Option<String>, hook: bool, json: bool) -> anyhow::Result<()> {
    if hook {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        let payload: HookPayload =
            serde_json::from_str(&input).context("parsing hook payload from stdin")?;
        if !payload.is_mutating() {
            return Ok(());
        }
        tracing::debug!(tool = %payload.tool_name, file = ?payload.file_path(), "guarding mutation");
    }
    let current: Option<TaskId> = task
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.parse())
        .transpose()?;
    let decision = ws.check_mutation_allowed(current.as_ref())?;
    if json {
        print_json(&decision)?;
    }
    match decision {
        taskctl::guard::Decision::Allow => Ok(()),
        taskctl::guard::Decision::Deny { reason } => Err(taskctl::Error::Denied(reason).into()),
    }
}
