//! Taskweave CLI - dependency-aware task planning and chain execution

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use taskweave_core::adjust::{InsertRequest, TaskAdjuster};
use taskweave_core::chains::{
    ActionRegistry, ChainDefinition, ChainEngine, ChainEvent, ExecutionSettings,
};
use taskweave_core::config::Config;
use taskweave_core::graph;
use taskweave_core::memory::{KnowledgeEntry, KnowledgeQuery, MemoryStore};
use taskweave_core::provider::{HttpProvider, ReasoningProvider};
use taskweave_core::storage::{DocumentStore, EventLog};
use taskweave_core::tasks::{CreateTask, Task, TaskPatch, TaskStatus, TaskStore, Urgency};

#[derive(Parser)]
#[command(name = "taskweave")]
#[command(author, version, about = "Dependency-aware task planning and chain execution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Analyze the dependency graph
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },

    /// Insert a task into the running plan
    Insert {
        title: String,
        description: String,
        /// Insert after this task id
        #[arg(long, conflicts_with = "before")]
        after: Option<String>,
        /// Insert before this task id
        #[arg(long)]
        before: Option<String>,
        #[arg(short, long)]
        priority: Option<u8>,
        #[arg(short, long)]
        urgency: Option<String>,
        /// Free-text context recorded with the insertion decision
        #[arg(long)]
        context: Option<String>,
    },

    /// Run and inspect execution chains
    Chain {
        #[command(subcommand)]
        action: ChainAction,
    },

    /// Record and query reusable knowledge
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeAction,
    },

    /// Inspect execution memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Create a task
    Add {
        name: String,
        description: String,
        /// Existing task ids this task depends on
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
        #[arg(short, long)]
        priority: Option<u8>,
        #[arg(short, long)]
        urgency: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show task details
    Show { id: String },
    /// List tasks
    List {
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Search tasks by id or keyword
    Search { query: String },
    /// Update a task
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(short, long)]
        priority: Option<u8>,
        #[arg(short, long)]
        urgency: Option<String>,
        #[arg(long)]
        summary: Option<String>,
        /// Replace the dependency set
        #[arg(long = "depends-on")]
        depends_on: Option<Vec<String>>,
    },
    /// Delete a task (completed tasks are never deleted)
    Delete { id: String },
}

#[derive(Subcommand)]
enum GraphAction {
    /// Check whether a task is ready to execute
    CanExec { id: String },
    /// Detect dependency cycles
    Cycles,
    /// Validate cross-task references
    Validate,
}

#[derive(Subcommand)]
enum ChainAction {
    /// Run a chain definition file to completion
    Run {
        /// Path to a chain definition (JSON)
        file: PathBuf,
    },
    /// Print the persisted event log of a chain
    Events { chain_id: String },
}

#[derive(Subcommand)]
enum KnowledgeAction {
    /// Record a knowledge entry
    Record {
        title: String,
        content: String,
        /// Entry kind (solution, pattern, pitfall, ...)
        #[arg(long, default_value = "solution")]
        kind: String,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long = "tech")]
        technologies: Vec<String>,
        #[arg(long)]
        confidence: Option<f64>,
    },
    /// Query the knowledge base
    Query {
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        project_type: Option<String>,
        #[arg(long = "tech")]
        technologies: Vec<String>,
    },
    /// Show a knowledge entry
    Show { id: String },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// List execution runs recorded for a task
    Executions { task_id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show config file path
    Path,
    /// Show the effective configuration
    Show,
}

/// Shared handles over the persisted stores
struct App {
    config: Config,
    data_dir: PathBuf,
    tasks: Arc<TaskStore>,
    memory: Arc<MemoryStore>,
}

impl App {
    fn open(data_dir_override: Option<PathBuf>) -> anyhow::Result<Self> {
        let config = Config::load()?;
        let data_dir = match data_dir_override {
            Some(dir) => dir,
            None => config.data_dir()?,
        };
        let docs = DocumentStore::new(&data_dir)?;
        let tasks = Arc::new(TaskStore::open(docs.clone())?);
        let memory = Arc::new(MemoryStore::open(docs.namespace("memory")?)?);
        Ok(Self {
            config,
            data_dir,
            tasks,
            memory,
        })
    }

    fn provider(&self) -> anyhow::Result<ReasoningProvider> {
        match self.config.provider.kind.as_str() {
            "current_execution" => Ok(ReasoningProvider::CurrentExecution),
            "http" => {
                let api_key = self.config.provider.resolved_api_key()?.ok_or_else(|| {
                    anyhow!(
                        "Provider kind is 'http' but no API key is set. \
                         Set TASKWEAVE_API_KEY or OPENROUTER_API_KEY."
                    )
                })?;
                Ok(ReasoningProvider::Http(HttpProvider::new(
                    self.config.provider.clone(),
                    api_key,
                )?))
            }
            other => Err(anyhow!("Unknown provider kind '{other}'")),
        }
    }

    fn chain_logs(&self) -> anyhow::Result<EventLog> {
        Ok(EventLog::new(self.data_dir.join("chains"))?)
    }

    fn engine(&self) -> anyhow::Result<ChainEngine> {
        let provider = Arc::new(self.provider()?);
        let actions = ActionRegistry::with_builtins(provider);
        Ok(ChainEngine::new(
            self.tasks.clone(),
            self.memory.clone(),
            actions,
            self.chain_logs()?,
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("taskweave=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let format = cli.format;

    match cli.command {
        Commands::Task { action } => {
            let app = App::open(cli.data_dir)?;
            cmd_task(&app, action, format).await
        }
        Commands::Graph { action } => {
            let app = App::open(cli.data_dir)?;
            cmd_graph(&app, action, format).await
        }
        Commands::Insert {
            title,
            description,
            after,
            before,
            priority,
            urgency,
            context,
        } => {
            let app = App::open(cli.data_dir)?;
            let request = InsertRequest {
                title,
                description,
                priority,
                urgency: urgency.as_deref().map(parse_urgency).transpose()?,
                insert_after: after,
                insert_before: before,
                related_task_ids: Vec::new(),
                context,
            };
            cmd_insert(&app, request, format).await
        }
        Commands::Chain { action } => {
            let app = App::open(cli.data_dir)?;
            cmd_chain(&app, action, format).await
        }
        Commands::Knowledge { action } => {
            let app = App::open(cli.data_dir)?;
            cmd_knowledge(&app, action, format).await
        }
        Commands::Memory { action } => {
            let app = App::open(cli.data_dir)?;
            cmd_memory(&app, action, format).await
        }
        Commands::Config { action } => cmd_config(action, format),
    }
}

async fn cmd_task(app: &App, action: TaskAction, format: OutputFormat) -> anyhow::Result<()> {
    match action {
        TaskAction::Add {
            name,
            description,
            depends_on,
            priority,
            urgency,
            notes,
        } => {
            let task = app
                .tasks
                .create(CreateTask {
                    name,
                    description,
                    notes,
                    dependencies: depends_on,
                    related_files: Vec::new(),
                    priority,
                    urgency: urgency.as_deref().map(parse_urgency).transpose()?,
                })
                .await?;
            emit(format, &task, |t| {
                println!("Task created: {}", t.id);
                print_task(t);
            })
        }
        TaskAction::Show { id } => {
            let task = app.tasks.get(&id).await?;
            emit(format, &task, print_task)
        }
        TaskAction::List { status } => {
            let status = status.as_deref().map(parse_status).transpose()?;
            let tasks = app.tasks.list(status).await;
            emit(format, &tasks, |tasks| {
                if tasks.is_empty() {
                    println!("No tasks found.");
                } else {
                    for task in tasks {
                        print_task_line(task);
                    }
                }
            })
        }
        TaskAction::Search { query } => {
            let tasks = app.tasks.search(&query).await;
            emit(format, &tasks, |tasks| {
                if tasks.is_empty() {
                    println!("No tasks matched '{query}'.");
                } else {
                    for task in tasks {
                        print_task_line(task);
                    }
                }
            })
        }
        TaskAction::Update {
            id,
            name,
            description,
            notes,
            status,
            priority,
            urgency,
            summary,
            depends_on,
        } => {
            let patch = TaskPatch {
                name,
                description,
                notes,
                status: status.as_deref().map(parse_status).transpose()?,
                dependencies: depends_on,
                priority,
                urgency: urgency.as_deref().map(parse_urgency).transpose()?,
                summary,
                ..Default::default()
            };
            let task = app.tasks.update(&id, patch).await?;
            emit(format, &task, |t| {
                println!("Task updated: {}", t.id);
                print_task(t);
            })
        }
        TaskAction::Delete { id } => {
            app.tasks.delete(&id).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::json!({ "deleted": id })),
                OutputFormat::Text => println!("Task '{id}' deleted."),
            }
            Ok(())
        }
    }
}

async fn cmd_graph(app: &App, action: GraphAction, format: OutputFormat) -> anyhow::Result<()> {
    let snapshot = app.tasks.snapshot().await;
    match action {
        GraphAction::CanExec { id } => {
            let readiness = graph::can_execute(&snapshot, &id);
            emit(format, &readiness, |r| {
                if r.can_execute {
                    println!("Task '{id}' is ready to execute.");
                } else if r.blocked_by.is_empty() {
                    println!("Task '{id}' cannot execute (missing or already completed).");
                } else {
                    println!("Task '{id}' is blocked by:");
                    for blocker in &r.blocked_by {
                        println!("  - {blocker}");
                    }
                }
            })
        }
        GraphAction::Cycles => {
            let cycle = graph::detect_cycle(&snapshot);
            emit(format, &cycle, |cycle| {
                if cycle.is_empty() {
                    println!("No dependency cycles.");
                } else {
                    println!("Cycle detected: {}", cycle.join(" -> "));
                }
            })
        }
        GraphAction::Validate => {
            let issues = graph::validate_references(&snapshot);
            emit(format, &issues, |issues| {
                if issues.is_empty() {
                    println!("All references resolve.");
                } else {
                    for issue in issues {
                        println!(
                            "[{:?}] task '{}' references unknown '{}' in {}",
                            issue.severity, issue.task_id, issue.reference, issue.field
                        );
                    }
                }
            })
        }
    }
}

async fn cmd_insert(
    app: &App,
    request: InsertRequest,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let adjuster = TaskAdjuster::new(app.tasks.clone(), app.memory.clone());
    let outcome = adjuster.insert(request).await?;
    emit(format, &outcome, |outcome| {
        println!("{}", outcome.summary);
        if let Some(task) = &outcome.inserted_task {
            println!("  Inserted: {}", task.id);
        }
        for suggestion in &outcome.suggestions {
            println!(
                "  Adjusted {} ({:.0}% confidence): {}",
                suggestion.task_id,
                suggestion.confidence * 100.0,
                suggestion.reasoning
            );
        }
        for warning in &outcome.warnings {
            println!("  Warning: {warning}");
        }
    })
}

async fn cmd_chain(app: &App, action: ChainAction, format: OutputFormat) -> anyhow::Result<()> {
    match action {
        ChainAction::Run { file } => {
            let contents = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read chain definition: {}", file.display()))?;
            let mut definition: ChainDefinition = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse chain definition: {}", file.display()))?;
            if definition.settings.is_none() {
                definition.settings = Some(ExecutionSettings::from_config(&app.config.chains)?);
            }

            let engine = app.engine()?;
            let chain_id = engine.start(definition).await?;
            if format == OutputFormat::Text {
                println!("Chain started: {chain_id}");
            }

            // Ctrl-C requests cooperative cancellation; the run still
            // settles into a terminal state before we report.
            let mut cancel_requested = false;
            let report = loop {
                tokio::select! {
                    signal = tokio::signal::ctrl_c(), if !cancel_requested => {
                        signal?;
                        engine.cancel(&chain_id).await?;
                        cancel_requested = true;
                        if format == OutputFormat::Text {
                            println!("Cancellation requested...");
                        }
                    }
                    _ = tokio::time::sleep(Duration::from_millis(200)) => {
                        let report = engine.status(&chain_id).await?;
                        if report.state.is_terminal() {
                            break report;
                        }
                    }
                }
            };

            emit(format, &report, |report| {
                println!("Chain {} finished: {:?}", report.chain_id, report.state);
                for step in &report.steps {
                    println!(
                        "  [{}] {} - {} ({} attempt{})",
                        step.step_index,
                        step.name,
                        step.state,
                        step.attempts,
                        if step.attempts == 1 { "" } else { "s" }
                    );
                }
                for warning in &report.warnings {
                    println!("  Warning: {warning}");
                }
            })
        }
        ChainAction::Events { chain_id } => {
            let events: Vec<ChainEvent> = app.chain_logs()?.read_all(&chain_id)?;
            emit(format, &events, |events| {
                if events.is_empty() {
                    println!("No events recorded for chain '{chain_id}'.");
                } else {
                    for event in events {
                        let step = event
                            .step_index
                            .map(|i| format!(" step {i}"))
                            .unwrap_or_default();
                        println!("{} {:?}{}", event.timestamp.format("%H:%M:%S"), event.kind, step);
                    }
                }
            })
        }
    }
}

async fn cmd_knowledge(
    app: &App,
    action: KnowledgeAction,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match action {
        KnowledgeAction::Record {
            title,
            content,
            kind,
            domain,
            technologies,
            confidence,
        } => {
            let mut entry = KnowledgeEntry::new(kind, title, content);
            if let Some(domain) = domain {
                entry = entry.with_domain(domain);
            }
            if !technologies.is_empty() {
                entry = entry.with_technologies(technologies);
            }
            if let Some(confidence) = confidence {
                entry = entry.with_confidence(confidence);
            }
            let id = app.memory.record_knowledge(entry).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::json!({ "id": id })),
                OutputFormat::Text => println!("Knowledge recorded: {id}"),
            }
            Ok(())
        }
        KnowledgeAction::Query {
            domain,
            project_type,
            technologies,
        } => {
            let entries = app
                .memory
                .query_knowledge(&KnowledgeQuery {
                    domain,
                    project_type,
                    technologies,
                })
                .await;
            emit(format, &entries, |entries| {
                if entries.is_empty() {
                    println!("No matching knowledge.");
                } else {
                    for entry in entries {
                        println!(
                            "  {:.2}  [{}] {} - {}",
                            entry.confidence,
                            entry.kind,
                            entry.title,
                            &entry.id[..8]
                        );
                    }
                }
            })
        }
        KnowledgeAction::Show { id } => {
            let entry = app.memory.get_knowledge(&id).await?;
            emit(format, &entry, |entry| {
                println!("[{}] {}", entry.kind, entry.title);
                println!("  Confidence: {:.2}", entry.confidence);
                if let Some(domain) = &entry.context.domain {
                    println!("  Domain: {domain}");
                }
                if !entry.context.technologies.is_empty() {
                    println!("  Technologies: {}", entry.context.technologies.join(", "));
                }
                println!("\n{}", entry.content);
            })
        }
    }
}

async fn cmd_memory(app: &App, action: MemoryAction, format: OutputFormat) -> anyhow::Result<()> {
    match action {
        MemoryAction::Executions { task_id } => {
            let executions = app.memory.executions_for_task(&task_id).await;
            emit(format, &executions, |executions| {
                if executions.is_empty() {
                    println!("No executions recorded for task '{task_id}'.");
                } else {
                    for context in executions {
                        println!(
                            "  {} - {:?} ({} steps, {} decisions, {} discoveries)",
                            context.execution_id,
                            context.status,
                            context.steps.len(),
                            context.decisions.len(),
                            context.discoveries.len()
                        );
                    }
                }
            })
        }
    }
}

fn cmd_config(action: ConfigAction, format: OutputFormat) -> anyhow::Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", Config::config_path()?.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = Config::load()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                OutputFormat::Text => print!("{}", toml::to_string_pretty(&config)?),
            }
            Ok(())
        }
    }
}

/// Print `value` as JSON, or run the text renderer
fn emit<T: serde::Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce(&T),
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(value),
    }
    Ok(())
}

fn print_task(task: &Task) {
    println!("Task: {}", task.name);
    println!("  ID: {}", task.id);
    println!("  Status: {}", task.status);
    if let Some(priority) = task.priority {
        println!("  Priority: {priority}");
    }
    if let Some(urgency) = task.urgency {
        println!("  Urgency: {urgency}");
    }
    if !task.dependencies.is_empty() {
        println!("  Depends on: {}", task.dependencies.join(", "));
    }
    if let Some(chain_id) = &task.chain_id {
        println!("  Chain: {chain_id} (step {})", task.step_index.unwrap_or(0));
    }
    if let Some(summary) = &task.summary {
        println!("  Summary: {summary}");
    }
    println!("  Description: {}", task.description);
}

fn print_task_line(task: &Task) {
    println!("  {} [{}] {}", &task.id[..8], task.status, task.name);
}

fn parse_status(s: &str) -> anyhow::Result<TaskStatus> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "in_progress" => Ok(TaskStatus::InProgress),
        "completed" => Ok(TaskStatus::Completed),
        "blocked" => Ok(TaskStatus::Blocked),
        other => Err(anyhow!(
            "Unknown status '{other}'. Expected pending, in_progress, completed or blocked."
        )),
    }
}

fn parse_urgency(s: &str) -> anyhow::Result<Urgency> {
    match s {
        "low" => Ok(Urgency::Low),
        "medium" => Ok(Urgency::Medium),
        "high" => Ok(Urgency::High),
        "critical" => Ok(Urgency::Critical),
        other => Err(anyhow!(
            "Unknown urgency '{other}'. Expected low, medium, high or critical."
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_task_add() {
        let cli = Cli::try_parse_from([
            "taskweave",
            "task",
            "add",
            "Write docs",
            "Document the insert command",
            "--priority",
            "7",
            "--urgency",
            "high",
        ])
        .unwrap();
        match cli.command {
            Commands::Task {
                action:
                    TaskAction::Add {
                        name,
                        priority,
                        urgency,
                        ..
                    },
            } => {
                assert_eq!(name, "Write docs");
                assert_eq!(priority, Some(7));
                assert_eq!(urgency.as_deref(), Some("high"));
            }
            _ => panic!("parsed into the wrong command"),
        }
    }

    #[test]
    fn test_cli_rejects_conflicting_anchors() {
        let result = Cli::try_parse_from([
            "taskweave",
            "insert",
            "Hotfix",
            "Fix the thing before deploy",
            "--after",
            "a",
            "--before",
            "b",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_status_and_urgency() {
        assert_eq!(parse_status("completed").unwrap(), TaskStatus::Completed);
        assert!(parse_status("done").is_err());
        assert_eq!(parse_urgency("critical").unwrap(), Urgency::Critical);
        assert!(parse_urgency("urgent").is_err());
    }
}
