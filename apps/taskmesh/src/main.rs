use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use inquire::validator::Validation;
use inquire::{CustomType, Select, Text};
use tracing::Level;

use taskmesh::agents::{ManagerAgent, RunPlan, RunSummary};
use taskmesh::config::{OrchestratorConfig, Settings};
use taskmesh::infrastructure::repositories::SqliteRunRepository;
use taskmesh::llm::{OllamaClient, OllamaConfig};

const EXAMPLE_TASKS: [&str; 2] = [
    "Scrape techmeme.com and summarize the top headlines.",
    "Analyze image.jpg in your folder and describe the image.",
];
const CUSTOM_TASK: &str = "Enter my own task";

#[derive(Debug, Parser)]
#[command(name = "taskmesh", version, about = "Manager/worker LLM agent orchestration")]
struct Cli {
    /// Log model responses and inter-agent messages
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    // Load environment variables
    dotenv::dotenv().ok();
    let settings = Settings::from_env()?;

    let client = OllamaClient::new(OllamaConfig {
        base_url: settings.ollama_host.clone(),
        timeout: settings.request_timeout,
    })?;

    tracing::info!("Connecting to database...");
    let store = SqliteRunRepository::connect(&settings.database_url)
        .await
        .map_err(anyhow::Error::msg)
        .context("Failed to open the run store")?;
    tracing::info!("Database connected successfully");

    let task = prompt_task()?;

    let manager = ManagerAgent::new(
        Arc::new(client),
        Arc::new(store),
        OrchestratorConfig::new(settings.model_name.clone()),
    );

    let subtasks = manager.decompose_goal(&task).await?;
    println!("\nSubtasks:");
    for (i, subtask) in subtasks.iter().enumerate() {
        println!("  {}. {}", i + 1, subtask);
    }

    // Sized after the user has seen the decomposition
    let plan = RunPlan::new(
        prompt_count("Number of worker agents:")?,
        prompt_count("Iterations per subtask:")?,
    )?;

    let summary = manager.execute(&task, subtasks, plan).await?;
    print_summary(&summary);
    Ok(())
}

fn prompt_task() -> Result<String> {
    let mut options: Vec<&str> = EXAMPLE_TASKS.to_vec();
    options.push(CUSTOM_TASK);

    let choice = Select::new("Main task:", options).prompt()?;
    if choice != CUSTOM_TASK {
        return Ok(choice.to_string());
    }

    let task = Text::new("Describe the task:")
        .with_validator(|input: &str| {
            if input.trim().is_empty() {
                Ok(Validation::Invalid("The task cannot be empty".into()))
            } else {
                Ok(Validation::Valid)
            }
        })
        .prompt()?;
    Ok(task.trim().to_string())
}

/// Blank input means 1
fn prompt_count(message: &str) -> Result<usize> {
    let count = CustomType::<usize>::new(message)
        .with_default(1)
        .with_error_message("Please type a whole number")
        .with_validator(|n: &usize| {
            if *n >= 1 {
                Ok(Validation::Valid)
            } else {
                Ok(Validation::Invalid("Must be at least 1".into()))
            }
        })
        .prompt()?;
    Ok(count)
}

fn print_summary(summary: &RunSummary) {
    println!("\nAssignments:");
    for worker in &summary.workers {
        println!("  {}: {:?}", worker.worker, worker.subtasks);
    }

    println!("\nSummaries:");
    for worker in &summary.workers {
        for line in &worker.summaries {
            println!("  {}", line);
        }
    }

    println!("\nReview trace:");
    for worker in &summary.workers {
        for entry in &worker.trace {
            println!(
                "  {} task {} iteration {}: {}",
                worker.worker,
                entry.subtask_index + 1,
                entry.iteration + 1,
                entry.content
            );
        }
    }

    println!(
        "\nRun {} finished in {:.1}s (~{} tokens)",
        summary.run_id,
        summary.elapsed.as_secs_f64(),
        summary.total_tokens
    );
}
