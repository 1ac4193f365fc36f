//! Tasks command - manage project tasks.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use console::{Style, style};

use cairn_memory::validation::parse_id;
use cairn_types::{NewTask, Task, TaskStatus};

use super::{Context, header, truncate};

/// Arguments for the tasks command.
#[derive(Args, Debug)]
pub struct TasksArgs {
    #[command(subcommand)]
    pub command: Option<TasksCommand>,
}

#[derive(Subcommand, Debug)]
pub enum TasksCommand {
    /// List tasks (default)
    List {
        /// Only tasks with this status
        #[arg(short, long)]
        status: Option<TaskStatus>,
    },

    /// Add a task
    Add {
        /// Task title
        title: String,

        /// Longer description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Complexity estimate (free text)
        #[arg(short, long)]
        complexity: Option<String>,

        /// Parent task id
        #[arg(long)]
        parent: Option<String>,
    },

    /// Set a task's status, by id or by title
    Status {
        /// Task id or exact title
        task: String,

        /// New status
        status: TaskStatus,
    },

    /// Mark a task completed and remember the completion
    Done {
        /// Task id
        id: String,
    },
}

/// Run the tasks command.
pub async fn run(args: TasksArgs, ctx: &Context) -> Result<()> {
    let engine = ctx.open_engine()?;
    let store = engine.store();

    match args.command.unwrap_or(TasksCommand::List { status: None }) {
        TasksCommand::List { status } => {
            let tasks = store.get_tasks(status);
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if tasks.is_empty() {
                println!("{}", Style::new().dim().apply_to("No tasks"));
            } else {
                header("Tasks");
                for task in &tasks {
                    print_task(task);
                }
            }
        }
        TasksCommand::Add {
            title,
            description,
            complexity,
            parent,
        } => {
            let mut new = NewTask::new(title).with_description(description);
            if let Some(complexity) = complexity {
                new = new.with_complexity(complexity);
            }
            if let Some(parent) = parent {
                new = new.with_parent(parse_id("parent", &parent)?);
            }
            let task = store.add_task(new)?;
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                println!("{} {}", style("Added task").green(), style(task.id).dim());
            }
        }
        TasksCommand::Status { task, status } => {
            let updated = match parse_id("task", &task) {
                Ok(id) => store.update_task_status(id, status)?,
                Err(_) => store.update_task_status_by_name(&task, status)?,
            };
            if !updated {
                bail!("no task matching '{task}' in this project");
            }
            println!("{} {} → {}", style("Updated").green(), task, status.as_str());
        }
        TasksCommand::Done { id } => {
            let id = parse_id("task", &id)?;
            if !engine.complete_task(id).await? {
                bail!("no task {id} in this project");
            }
            println!("{} {}", style("Completed").green(), style(id).dim());
        }
    }
    Ok(())
}

fn print_task(task: &Task) {
    let dim = Style::new().dim();
    let status = match task.status {
        TaskStatus::Completed => style(task.status.as_str()).green(),
        TaskStatus::Failed | TaskStatus::Blocked => style(task.status.as_str()).red(),
        TaskStatus::InProgress => style(task.status.as_str()).yellow(),
        TaskStatus::Pending => style(task.status.as_str()).dim(),
    };
    println!("  [{status}] {}", truncate(&task.title, 60));
    println!("     {}", dim.apply_to(task.id));
}
