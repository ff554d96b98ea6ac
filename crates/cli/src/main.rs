//! Cadence CLI - Inspect a running Cadence daemon

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9527";

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Cadence scheduler CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "CADENCE_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered tasks
    Tasks {
        /// Only tasks whose id starts with this prefix
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Show one task
    Task {
        /// Task id (e.g., lockStore.purgeExpired)
        task_id: String,
    },

    /// Show daemon health
    Health,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize)]
struct TaskInfo {
    id: String,
    schedule: String,
    exclusivity: String,
    last_start: Option<i64>,
    last_cost_ms: Option<i64>,
    next_start: Option<i64>,
    running: bool,
    owner: Option<String>,
}

#[derive(Deserialize)]
struct TaskList {
    instance: String,
    tasks: Vec<TaskInfo>,
}

#[derive(Deserialize)]
struct TaskDetail {
    instance: String,
    task: TaskInfo,
}

#[derive(Deserialize)]
struct Health {
    status: String,
    version: String,
    instance: String,
    uptime_seconds: u64,
    task_count: usize,
    running_count: usize,
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "SCHEDULE")]
    schedule: String,
    #[tabled(rename = "MODE")]
    mode: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "LAST START")]
    last_start: String,
    #[tabled(rename = "COST")]
    cost: String,
    #[tabled(rename = "NEXT START")]
    next_start: String,
    #[tabled(rename = "OWNER")]
    owner: String,
}

impl From<TaskInfo> for TaskRow {
    fn from(task: TaskInfo) -> Self {
        let mode = match task.exclusivity.as_str() {
            "CLUSTER_EXCLUSIVE" => "cluster",
            _ => "local",
        };
        Self {
            id: task.id,
            schedule: task.schedule,
            mode: mode.to_string(),
            state: if task.running { "running" } else { "idle" }.to_string(),
            last_start: format_millis(task.last_start),
            cost: task
                .last_cost_ms
                .map(|ms| format!("{} ms", ms))
                .unwrap_or_else(|| "-".to_string()),
            next_start: format_millis(task.next_start),
            owner: task.owner.unwrap_or_else(|| "-".to_string()),
        }
    }
}

fn format_millis(millis: Option<i64>) -> String {
    millis
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Tasks { prefix } => {
            let result = call_rpc(&cli.rpc_url, "scheduler.tasks.v1", json!({ "prefix": prefix })).await?;
            let list: TaskList = serde_json::from_value(result).context("Unexpected tasks response")?;

            println!("{} {}", "Tasks on".cyan().bold(), list.instance.bold());
            println!();

            if list.tasks.is_empty() {
                println!("{}", "No tasks registered".yellow());
            } else {
                let rows: Vec<TaskRow> = list.tasks.into_iter().map(TaskRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Task { task_id } => {
            let result = call_rpc(&cli.rpc_url, "scheduler.task.v1", json!({ "task_id": task_id })).await?;
            let detail: TaskDetail = serde_json::from_value(result).context("Unexpected task response")?;
            let row = TaskRow::from(detail.task);

            println!("{}", format!("Task {}", row.id).cyan().bold());
            println!();
            println!("  {} {}", "Instance:".bold(), detail.instance);
            println!("  {} {}", "Schedule:".bold(), row.schedule);
            println!("  {} {}", "Mode:".bold(), row.mode);
            let state = if row.state == "running" {
                row.state.green()
            } else {
                row.state.normal()
            };
            println!("  {} {}", "State:".bold(), state);
            println!("  {} {}", "Last start:".bold(), row.last_start);
            println!("  {} {}", "Last cost:".bold(), row.cost);
            println!("  {} {}", "Next start:".bold(), row.next_start);
            println!("  {} {}", "Owner:".bold(), row.owner);
        }

        Commands::Health => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.health.v1", json!({})).await {
                Ok(result) => {
                    let health: Health =
                        serde_json::from_value(result).context("Unexpected health response")?;
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), health.status.to_uppercase().green());
                    println!("  {} {}", "Version:".bold(), health.version);
                    println!("  {} {}", "Instance:".bold(), health.instance);
                    println!();
                    println!("  {} {}", "Tasks:".bold(), health.task_count);
                    println!("  {} {}", "Running:".bold(), health.running_count);
                    println!("  {} {} seconds", "Uptime:".bold(), health.uptime_seconds);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}
