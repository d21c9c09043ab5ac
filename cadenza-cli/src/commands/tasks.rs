//! `cadenza track`, `cadenza remove`, `cadenza tasks`.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use cadenza_core::{GenerationTask, TaskStatus};
use cadenza_daemon::{request_remove, request_tasks, request_track};

use super::{format_age, home_dir};

#[derive(Args, Debug)]
pub struct TrackArgs {
    /// Provider task id returned at submission.
    pub task_id: String,

    /// Prompt the task was submitted with.
    #[arg(long)]
    pub prompt: String,

    /// Model id the task was submitted with.
    #[arg(long)]
    pub model: String,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    pub task_id: String,
}

#[derive(Args, Debug)]
pub struct TasksArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "task")]
    task: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "progress")]
    progress: String,
    #[tabled(rename = "message")]
    message: String,
    #[tabled(rename = "tracks")]
    tracks: usize,
    #[tabled(rename = "started")]
    started: String,
}

impl TrackArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        request_track(&home, &self.task_id, &self.prompt, &self.model)
            .with_context(|| format!("failed to track task '{}'", self.task_id))?;
        println!("tracking {}", self.task_id);
        Ok(())
    }
}

impl RemoveArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        request_remove(&home, &self.task_id)
            .with_context(|| format!("failed to remove task '{}'", self.task_id))?;
        println!("removed {}", self.task_id);
        Ok(())
    }
}

impl TasksArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let data = request_tasks(&home).context("failed to list tasks")?;
        let tasks: Vec<GenerationTask> =
            serde_json::from_value(data).context("daemon returned malformed task list")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&tasks).context("failed to serialize tasks JSON")?
            );
            return Ok(());
        }

        print_table(&tasks);
        Ok(())
    }
}

fn print_table(tasks: &[GenerationTask]) {
    if tasks.is_empty() {
        println!("No tasks in flight.");
        return;
    }

    let now = Utc::now();
    let rows: Vec<TaskRow> = tasks
        .iter()
        .map(|task| TaskRow {
            task: task.task_id.to_string(),
            status: status_label(&task.status),
            progress: format!("{}%", task.progress),
            message: task.status_message.clone(),
            tracks: task.provisional_artifacts.len(),
            started: format_age(task.started_at, now),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn status_label(status: &TaskStatus) -> String {
    let label = status.as_str();
    match status {
        TaskStatus::Success => label.green().bold().to_string(),
        TaskStatus::Other(_) => label.yellow().to_string(),
        s if s.is_failure() => label.red().bold().to_string(),
        _ => label.cyan().to_string(),
    }
}
