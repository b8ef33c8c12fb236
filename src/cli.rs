use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::backup::BackupEntry;
use crate::commands::{self, CommandResult, NewTask, StatePayload};
use crate::filter::{CategoryFilter, DueWindow, SortKey, StatusFilter, TaskQuery};
use crate::models::{Priority, RepeatRule, Task, TaskPatch};
use crate::scheduler::start_backup_scheduler;
use crate::services::Services;
use crate::state::Toggled;
use crate::stats::TaskStatistics;

#[derive(Debug, Parser)]
#[command(name = "todo-app", version)]
#[command(about = "Personal todo list with categories, recurring tasks and JSON backups")]
pub struct Cli {
    /// Directory holding task data, backups and logs
    #[arg(long, env = "TODO_APP_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,
    /// Print the raw command result as JSON
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add a task
    Add {
        title: String,
        /// YYYY-MM-DD, YYYY-MM-DD HH:MM or RFC 3339; defaults to now
        #[arg(short, long, value_parser = commands::parse_due)]
        due: Option<DateTime<Utc>>,
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long)]
        notes: Option<String>,
        /// none, daily, weekly, monthly or yearly
        #[arg(short, long)]
        repeat: Option<RepeatRule>,
    },
    /// List tasks matching every given filter
    List(ListArgs),
    /// Change fields of a task
    Edit {
        /// Task id or a unique prefix of it
        id: String,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long, value_parser = commands::parse_due)]
        due: Option<DateTime<Utc>>,
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short, long)]
        notes: Option<String>,
        #[arg(short, long)]
        repeat: Option<RepeatRule>,
    },
    /// Flip completion; completing a recurring task schedules the next one
    Toggle { id: String },
    /// Delete a task
    Rm { id: String },
    /// Reorder the stored list
    Sort {
        /// title, due, priority or status
        key: SortKey,
    },
    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Show completion and workload statistics
    Stats,
    /// Manage backups in the data directory
    #[command(subcommand)]
    Backup(BackupCommand),
    /// Write all tasks and categories to a JSON file
    Export {
        /// Target file; defaults to a dated name in the current directory
        path: Option<PathBuf>,
        /// Write to the system temp directory instead
        #[arg(long, conflicts_with = "path")]
        temp: bool,
    },
    /// Replace all tasks and categories with the contents of an export file
    Import { path: PathBuf },
    /// Run the periodic backup loop until interrupted
    Daemon {
        /// Seconds between backups; defaults to the configured interval
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[derive(Debug, Default, Args)]
pub struct ListArgs {
    /// Category name or "all"
    #[arg(short, long)]
    pub category: Option<String>,
    /// Case-insensitive substring of the title
    #[arg(short, long)]
    pub search: Option<String>,
    /// all, completed, incomplete or overdue
    #[arg(long, default_value = "all")]
    pub status: StatusFilter,
    #[arg(short, long)]
    pub priority: Option<Priority>,
    /// today, tomorrow, this-week, next-week or this-month
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub due: Option<DueWindow>,
    /// First day of a custom due range
    #[arg(long, requires = "to")]
    pub from: Option<NaiveDate>,
    /// Last day of a custom due range
    #[arg(long, requires = "from")]
    pub to: Option<NaiveDate>,
}

impl ListArgs {
    pub fn query(&self) -> TaskQuery {
        let due = match (self.due, self.from, self.to) {
            (Some(window), _, _) => window,
            (None, Some(from), Some(to)) => DueWindow::Custom { from, to },
            _ => DueWindow::All,
        };
        TaskQuery {
            category: self
                .category
                .as_deref()
                .map(CategoryFilter::parse)
                .unwrap_or_default(),
            search: self.search.clone().unwrap_or_default(),
            status: self.status,
            priority: self.priority,
            due,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum CategoryCommand {
    List,
    Add { name: String },
    /// Remove a category; its tasks move to "default"
    Rm { name: String },
}

#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Snapshot the current state now
    Create,
    List,
    /// Replace the current state with a backup
    Restore { name: String },
    Delete { name: String },
}

pub fn execute(services: &Services, command: Command, json: bool) -> ExitCode {
    match command {
        Command::Add {
            title,
            due,
            priority,
            category,
            notes,
            repeat,
        } => {
            let input = NewTask {
                title,
                due_date: due,
                priority,
                category,
                notes,
                repeat_option: repeat,
            };
            emit(json, commands::create_task_impl(services, input), |task| {
                format!("added {}", task_line(task))
            })
        }
        Command::List(args) => emit(
            json,
            commands::list_tasks_impl(services, &args.query()),
            |tasks| render_tasks(tasks),
        ),
        Command::Edit {
            id,
            title,
            due,
            priority,
            category,
            notes,
            repeat,
        } => {
            let patch = TaskPatch {
                title,
                due_date: due,
                priority,
                category,
                notes,
                repeat_option: repeat,
            };
            emit(json, commands::update_task_impl(services, &id, patch), |task| {
                format!("updated {}", task_line(task))
            })
        }
        Command::Toggle { id } => emit(json, commands::toggle_task_impl(services, &id), render_toggled),
        Command::Rm { id } => emit(json, commands::delete_task_impl(services, &id), |task| {
            format!("deleted {}", task_line(task))
        }),
        Command::Sort { key } => emit(json, commands::sort_tasks_impl(services, key), |_| {
            "sorted".to_string()
        }),
        Command::Category(CategoryCommand::List) => emit(
            json,
            commands::load_state_impl(services),
            |state: &StatePayload| state.categories.join("\n"),
        ),
        Command::Category(CategoryCommand::Add { name }) => {
            emit(json, commands::add_category_impl(services, &name), |added| {
                changed(*added, "added", "unchanged")
            })
        }
        Command::Category(CategoryCommand::Rm { name }) => {
            emit(json, commands::remove_category_impl(services, &name), |removed| {
                changed(*removed, "removed", "unchanged")
            })
        }
        Command::Stats => emit(json, commands::statistics_impl(services), render_stats),
        Command::Backup(BackupCommand::Create) => {
            emit(json, commands::create_backup_impl(services), |path| {
                format!("backup written to {}", path.display())
            })
        }
        Command::Backup(BackupCommand::List) => {
            emit(json, commands::list_backups_impl(services), |list| render_backups(list))
        }
        Command::Backup(BackupCommand::Restore { name }) => {
            let result = match current_thread_runtime() {
                Ok(runtime) => runtime
                    .block_on(commands::restore_backup_background_impl(services, &name)),
                Err(err) => failure(format!("failed to start runtime: {err}")),
            };
            emit(json, result, |state| {
                format!("restored {} tasks", state.tasks.len())
            })
        }
        Command::Backup(BackupCommand::Delete { name }) => {
            emit(json, commands::delete_backup_impl(services, &name), |_| {
                format!("deleted {name}")
            })
        }
        Command::Export { path, temp } => {
            let result = if temp {
                commands::export_temp_impl(services)
            } else {
                commands::export_impl(services, path.as_deref())
            };
            emit(json, result, |path| format!("exported to {}", path.display()))
        }
        Command::Import { path } => emit(json, commands::import_impl(services, &path), |state| {
            format!("imported {} tasks", state.tasks.len())
        }),
        Command::Daemon { interval } => {
            let period = interval.unwrap_or(services.settings().backup_interval_secs).max(1);
            match run_daemon(services.clone(), Duration::from_secs(period)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("error: {err}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn run_daemon(services: Services, period: Duration) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let handle = start_backup_scheduler(services, period);
        let signal = tokio::signal::ctrl_c().await;
        handle.abort();
        log::info!("backup scheduler stopped");
        signal
    })
}

fn current_thread_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

fn failure<T>(message: String) -> CommandResult<T> {
    CommandResult {
        ok: false,
        data: None,
        error: Some(message),
    }
}

fn emit<T: Serialize>(
    json: bool,
    result: CommandResult<T>,
    render: impl FnOnce(&T) -> String,
) -> ExitCode {
    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(text) => println!("{text}"),
            Err(err) => eprintln!("error: {err}"),
        }
    } else if let Some(data) = &result.data {
        let text = render(data);
        if !text.is_empty() {
            println!("{text}");
        }
    }
    match (result.ok, result.error) {
        (true, _) => ExitCode::SUCCESS,
        (false, error) => {
            if !json {
                eprintln!("error: {}", error.unwrap_or_else(|| "unknown error".into()));
            }
            ExitCode::FAILURE
        }
    }
}

fn changed(flag: bool, yes: &str, no: &str) -> String {
    (if flag { yes } else { no }).to_string()
}

fn task_line(task: &Task) -> String {
    let mark = if task.is_completed { "x" } else { " " };
    let id: String = task.id.to_string().chars().take(8).collect();
    let due = task.due_date.with_timezone(&Local).format("%Y-%m-%d %H:%M");
    let mut line = format!(
        "[{mark}] {id}  {due}  {:<6}  {:<8}  {}",
        task.priority.as_str(),
        task.category,
        task.title
    );
    if task.repeat_option.is_recurring() {
        line.push_str(&format!(" ({})", task.repeat_option.as_str()));
    }
    line
}

fn render_tasks(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "no tasks".to_string();
    }
    tasks.iter().map(task_line).collect::<Vec<_>>().join("\n")
}

fn render_toggled(toggled: &Toggled) -> String {
    let mut out = task_line(&toggled.task);
    if let Some(next) = &toggled.spawned {
        out.push_str(&format!("\nnext: {}", task_line(next)));
    }
    out
}

fn render_backups(list: &[BackupEntry]) -> String {
    if list.is_empty() {
        return "no backups".to_string();
    }
    list.iter()
        .map(|entry| match entry.modified_at {
            Some(at) => format!(
                "{}  {}",
                entry.name,
                at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            ),
            None => entry.name.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_stats(stats: &TaskStatistics) -> String {
    let mut lines = vec![
        format!(
            "total {}  completed {}  pending {}  overdue {}",
            stats.total, stats.completed, stats.pending, stats.overdue
        ),
        format!("completion {:.0}%", stats.completion_rate * 100.0),
    ];
    for c in &stats.by_category {
        lines.push(format!("category {:<10} {}", c.category, c.count));
    }
    for p in &stats.by_priority {
        lines.push(format!("priority {:<10} {}", p.priority.as_str(), p.count));
    }
    for d in &stats.upcoming {
        lines.push(format!("due {}  {}", d.date.format("%a %m-%d"), d.count));
    }
    lines.join("\n")
}
