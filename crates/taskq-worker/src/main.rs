use clap::Parser;
use taskq_worker::{builtin_registry, Worker, WorkerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "taskq-worker")]
#[command(about = "Task queue worker", long_about = None)]
struct Args {
    /// Broker address
    #[arg(short, long)]
    broker: Option<String>,

    /// Worker ID (auto-generated if not provided)
    #[arg(long)]
    worker_id: Option<String>,

    /// Number of concurrent tasks
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Interpreter used by run_violin
    #[arg(long, env = "TASKQ_VIOLIN_COMMAND")]
    violin_command: Option<String>,

    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => WorkerConfig::from_file(path)?,
        None => WorkerConfig::default(),
    };

    // Override with CLI args
    if let Some(broker) = args.broker {
        config.broker_address = broker;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(worker_id) = args.worker_id {
        config.worker_id = Some(worker_id);
    }
    if let Some(command) = args.violin_command {
        config.violin.command = command;
    }

    // Register built-in tasks
    let registry = builtin_registry(config.violin.clone())?;
    tracing::info!("Registered tasks: {:?}", registry.task_names());

    let worker = Worker::new(config, registry);

    let shutdown = worker.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            shutdown.cancel();
        }
    });

    // Run worker
    worker.run().await?;

    Ok(())
}
