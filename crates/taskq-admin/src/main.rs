use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use taskq_client::{AsyncResult, TaskQueueAsyncClient};
use taskq_core::{InvocationId, TaskResult};

#[derive(Parser, Debug)]
#[command(name = "taskq")]
#[command(about = "Task queue command line", long_about = None)]
struct Args {
    /// Broker address
    #[arg(short, long, default_value = "127.0.0.1:6379", env = "TASKQ_BROKER")]
    broker: String,

    /// REST API address
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    api: String,

    /// Output format (json, table, yaml)
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Enqueue an invocation of any registered task
    Submit {
        /// Task name
        task_name: String,

        /// Positional arguments as a JSON array
        #[arg(default_value = "[]")]
        args: String,

        /// Retries on retryable failures
        #[arg(long, default_value = "0")]
        max_retries: u32,

        /// Execution timeout in seconds (worker default when 0)
        #[arg(long, default_value = "0")]
        timeout: u32,

        /// Wait this many seconds for the result
        #[arg(short, long)]
        wait: Option<u64>,
    },

    /// Enqueue add(x, y)
    Add {
        x: f64,
        y: f64,

        #[arg(short, long)]
        wait: Option<u64>,
    },

    /// Enqueue run_violin(path)
    Violin {
        /// Data directory holding the plotting script
        path: PathBuf,

        #[arg(short, long)]
        wait: Option<u64>,
    },

    /// Show the state of an invocation
    Status { invocation_id: String },

    /// Show the result of an invocation
    Result {
        invocation_id: String,

        /// Wait this many seconds for the result
        #[arg(short, long)]
        wait: Option<u64>,
    },

    /// List workers
    Workers,

    /// Show broker statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let format = args.format.as_str();

    match args.command {
        Commands::Submit {
            task_name,
            args: raw,
            max_retries,
            timeout,
            wait,
        } => {
            let values: serde_json::Value = serde_json::from_str(&raw)?;
            let invocation = taskq_core::Invocation::builder(task_name, &values)?
                .max_retries(max_retries)
                .timeout_seconds(timeout)
                .build()?;
            let client = TaskQueueAsyncClient::connect(&args.broker).await?;
            let handle = client.send_invocation(invocation).await?;
            submitted(format, handle, wait).await?;
        }

        Commands::Add { x, y, wait } => {
            let client = TaskQueueAsyncClient::connect(&args.broker).await?;
            let handle = client.add(integral(x), integral(y)).await?;
            submitted(format, handle, wait).await?;
        }

        Commands::Violin { path, wait } => {
            let client = TaskQueueAsyncClient::connect(&args.broker).await?;
            let handle = client.run_violin(&path).await?;
            submitted(format, handle, wait).await?;
        }

        Commands::Status { invocation_id } => {
            let id = InvocationId::parse_str(&invocation_id)?;
            let client = TaskQueueAsyncClient::connect(&args.broker).await?;
            let ack = client.query(id).await?;

            let state = ack.state.map(|s| s.as_str()).unwrap_or("unknown");
            match format {
                "json" | "yaml" => {
                    let body = serde_json::json!({
                        "invocation_id": id,
                        "state": state,
                        "invocation": ack.invocation.as_ref().map(|inv| serde_json::json!({
                            "task_name": inv.task_name,
                            "args": inv.decode_args::<serde_json::Value>().ok(),
                            "attempt": inv.attempt,
                            "worker_id": inv.worker_id,
                        })),
                    });
                    print_structured(format, &body)?;
                }
                _ => {
                    let mut table = Table::new();
                    table.load_preset(UTF8_FULL);
                    table.set_header(vec!["Field", "Value"]);
                    table.add_row(vec!["ID".to_string(), id.to_string()]);
                    table.add_row(vec!["State".to_string(), state.to_string()]);
                    if let Some(inv) = &ack.invocation {
                        table.add_row(vec!["Task".to_string(), inv.task_name.clone()]);
                        table.add_row(vec!["Attempt".to_string(), inv.attempt.to_string()]);
                        table.add_row(vec!["Submitted".to_string(), inv.submitted_at.to_rfc3339()]);
                        if let Some(worker) = &inv.worker_id {
                            table.add_row(vec!["Worker".to_string(), worker.clone()]);
                        }
                    }
                    if let Some(result) = &ack.result {
                        table.add_row(vec!["Task".to_string(), result.task_name.clone()]);
                        table.add_row(vec!["Attempts".to_string(), result.attempts.to_string()]);
                    }
                    println!("{table}");
                }
            }
        }

        Commands::Result {
            invocation_id,
            wait,
        } => {
            let id = InvocationId::parse_str(&invocation_id)?;
            let client = TaskQueueAsyncClient::connect(&args.broker).await?;

            let result = match wait {
                Some(secs) => Some(client.wait_for_result(id, Duration::from_secs(secs)).await?),
                None => client.get_result(id).await?,
            };

            match result {
                Some(result) => print_result(format, &result)?,
                None => eprintln!("Result not ready"),
            }
        }

        Commands::Workers => {
            let client = reqwest::Client::new();
            let url = format!("{}/api/v1/workers", args.api);

            let response: Vec<serde_json::Value> = client.get(&url).send().await?.json().await?;

            match format {
                "json" | "yaml" => print_structured(format, &response)?,
                _ => {
                    let mut table = Table::new();
                    table.load_preset(UTF8_FULL);
                    table.set_header(vec!["Worker ID", "Tasks", "CPU %", "Memory MB", "Last Heartbeat"]);
                    for worker in &response {
                        table.add_row(worker_row(worker));
                    }
                    println!("{table}");
                }
            }
        }

        Commands::Stats => {
            let client = reqwest::Client::new();
            let url = format!("{}/api/v1/stats", args.api);

            let response: serde_json::Value = client.get(&url).send().await?.json().await?;

            match format {
                "json" | "yaml" => print_structured(format, &response)?,
                _ => {
                    let mut table = Table::new();
                    table.load_preset(UTF8_FULL);
                    table.set_header(vec!["Metric", "Value"]);
                    for (label, key) in [
                        ("Queued", "queued"),
                        ("Running", "running"),
                        ("Succeeded", "succeeded"),
                        ("Failed", "failed"),
                        ("Queue Depth", "queue_depth"),
                        ("Workers", "workers_alive"),
                    ] {
                        table.add_row(vec![label.to_string(), response[key].to_string()]);
                    }
                    println!("{table}");
                }
            }
        }
    }

    Ok(())
}

/// One `workers` table row from a `/api/v1/workers` entry
fn worker_row(worker: &serde_json::Value) -> Vec<String> {
    vec![
        worker["worker_id"].as_str().unwrap_or("").to_string(),
        worker["current_invocations"].as_u64().unwrap_or(0).to_string(),
        format!("{:.1}", worker["cpu_usage_percent"].as_f64().unwrap_or(0.0)),
        worker["memory_usage_mb"].as_u64().unwrap_or(0).to_string(),
        worker["last_heartbeat"].as_str().unwrap_or("").to_string(),
    ]
}

/// Whole numbers go over the wire as integers so `add 2 3` yields `5`, not `5.0`
fn integral(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Value::from(n)
    }
}

async fn submitted(format: &str, handle: AsyncResult, wait: Option<u64>) -> anyhow::Result<()> {
    match wait {
        Some(secs) => {
            let result = handle.get(Duration::from_secs(secs)).await?;
            print_result(format, &result)
        }
        None => {
            match format {
                "json" | "yaml" => {
                    print_structured(format, &serde_json::json!({ "invocation_id": handle.id() }))?
                }
                _ => println!("Invocation submitted: {}", handle.id()),
            }
            Ok(())
        }
    }
}

fn print_result(format: &str, result: &TaskResult) -> anyhow::Result<()> {
    let value = result.value_json();

    match format {
        "json" | "yaml" => {
            let body = serde_json::json!({
                "invocation_id": result.invocation_id,
                "task_name": result.task_name,
                "status": result.status.as_str(),
                "value": value,
                "error": result.error,
                "attempts": result.attempts,
                "worker_id": result.worker_id,
                "completed_at": result.completed_at,
            });
            print_structured(format, &body)?;
        }
        _ => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Field", "Value"]);
            table.add_row(vec!["ID".to_string(), result.invocation_id.to_string()]);
            table.add_row(vec!["Task".to_string(), result.task_name.clone()]);
            table.add_row(vec!["Status".to_string(), result.status.as_str().to_string()]);
            if let Some(value) = value {
                table.add_row(vec!["Value".to_string(), value.to_string()]);
            }
            if let Some(error) = &result.error {
                table.add_row(vec!["Error".to_string(), error.to_string()]);
                if let Some(code) = error.exit_code {
                    table.add_row(vec!["Exit Code".to_string(), code.to_string()]);
                }
                if let Some(stderr) = &error.stderr {
                    table.add_row(vec!["Stderr".to_string(), stderr.clone()]);
                }
            }
            table.add_row(vec!["Attempts".to_string(), result.attempts.to_string()]);
            if let Some(worker) = &result.worker_id {
                table.add_row(vec!["Worker".to_string(), worker.clone()]);
            }
            table.add_row(vec!["Completed".to_string(), result.completed_at.to_rfc3339()]);
            println!("{table}");
        }
    }
    Ok(())
}

fn print_structured<T: Serialize + ?Sized>(format: &str, body: &T) -> anyhow::Result<()> {
    if format == "yaml" {
        print!("{}", serde_yaml::to_string(body)?);
    } else {
        println!("{}", serde_json::to_string_pretty(body)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_row_shows_task_count() {
        let worker = serde_json::json!({
            "worker_id": "host-1-abcd1234",
            "registered_at": "2026-01-01T00:00:00Z",
            "last_heartbeat": "2026-01-01T00:00:10Z",
            "current_invocations": 3,
            "cpu_usage_percent": 12.5,
            "memory_usage_mb": 64,
        });

        assert_eq!(
            worker_row(&worker),
            vec!["host-1-abcd1234", "3", "12.5", "64", "2026-01-01T00:00:10Z"]
        );
    }

    #[test]
    fn test_integral_operands() {
        assert_eq!(integral(2.0), serde_json::json!(2));
        assert_eq!(integral(2.5), serde_json::json!(2.5));
    }
}
