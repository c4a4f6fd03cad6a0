//! Completion commands against the configured remote store.

use std::sync::Arc;

use clap::Subcommand;
use holdfast_core::{CompletionSyncEngine, Config, RestClient, TaskId, ToggleOutcome};

#[derive(Subcommand)]
pub enum TaskAction {
    /// List today's tasks
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Flip "done today" for a task
    Toggle {
        /// Task ID
        id: String,
    },
    /// Record a completion for today, as a finished hold does
    Done {
        /// Task ID
        id: String,
    },
}

pub fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let remote = Config::load()?.resolved_remote();
    let client = RestClient::new(&remote)?;
    let engine = CompletionSyncEngine::new(Arc::new(client));

    super::runtime()?.block_on(async move {
        let tasks = engine.refresh().await?;
        match action {
            TaskAction::List { json } => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&tasks)?);
                } else if tasks.is_empty() {
                    println!("No tasks.");
                } else {
                    for task in &tasks {
                        let mark = if task.completed_today { "x" } else { " " };
                        println!("[{mark}] {}  {}  (streak {})", task.id, task.title, task.streak);
                    }
                }
                Ok(())
            }
            TaskAction::Toggle { id } => report(engine.toggle(&TaskId::new(id)).await),
            TaskAction::Done { id } => report(engine.mark_done(&TaskId::new(id)).await),
        }
    })
}

fn report(outcome: ToggleOutcome) -> Result<(), Box<dyn std::error::Error>> {
    match outcome {
        ToggleOutcome::Confirmed { task_id, done } => {
            let state = if done { "done" } else { "not done" };
            println!("{task_id}: {state}");
            Ok(())
        }
        ToggleOutcome::RolledBack { task_id, error, .. } => {
            tracing::warn!(task = %task_id, "completion change rolled back");
            Err(error.into())
        }
    }
}
